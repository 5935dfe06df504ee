use crate::segments::{Commit, SegmentStore};

/// What a single block did to the recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureEvent {
    #[default]
    None,
    Started,
    /// Transport stopped and the capture became the selected segment at this index.
    Committed(usize),
    /// Transport stopped before the minimum duration was reached.
    Discarded,
    /// Transport stopped but nothing was reserved to hold the capture.
    Dropped,
}

/// Transport-driven recorder, owned by the audio thread.
///
/// Play starts a capture, stop commits it. Only the edge state lives here;
/// the samples go straight into the [`SegmentStore`].
#[derive(Debug)]
pub struct TransportCapture {
    store: SegmentStore,
    was_playing: bool,
    capturing: bool,
}

impl TransportCapture {
    pub fn new(store: SegmentStore) -> Self {
        Self {
            store,
            was_playing: false,
            capturing: false,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// Observe one block of host input.
    pub fn process_block<S: AsRef<[f32]>>(
        &mut self,
        input: &[S],
        is_playing: bool,
        sample_rate: f32,
    ) -> CaptureEvent {
        let mut event = CaptureEvent::None;

        if is_playing && !self.was_playing {
            self.store.begin_capture();
            self.capturing = true;
            event = CaptureEvent::Started;
        } else if !is_playing && self.was_playing {
            event = match self.store.commit_capture(sample_rate) {
                Commit::Stored(index) => CaptureEvent::Committed(index),
                Commit::TooShort => CaptureEvent::Discarded,
                Commit::Unreserved => CaptureEvent::Dropped,
            };
            self.capturing = false;
        }
        self.was_playing = is_playing;

        if self.capturing && input.len() >= 2 {
            self.store
                .append_capture(input[0].as_ref(), input[1].as_ref());
        }

        event
    }
}
