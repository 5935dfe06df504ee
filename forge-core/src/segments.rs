//! Recorded segments captured from host transport.
//!
//! The audio thread appends into the in-progress capture buffer and commits it
//! on transport stop; everything else (trim, removal, snapshots for upload)
//! happens on other threads. All of it sits behind one mutex whose critical
//! sections are bounded: O(block size) appends, O(1) commits and snapshots.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Minimum capture length in frames, about one second at 44.1 kHz.
pub const MIN_SEGMENT_FRAMES: usize = 44_100;

/// Recorded segments are always interleaved stereo.
pub const SEGMENT_CHANNELS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSegment {
    samples: Arc<Vec<f32>>,
    sample_rate: f32,
    trim_start: usize,
    /// Exclusive end frame; 0 means the full length.
    trim_end: usize,
}

impl RecordedSegment {
    pub fn new(samples: Vec<f32>, sample_rate: f32) -> Self {
        Self::from_shared(Arc::new(samples), sample_rate)
    }

    fn from_shared(samples: Arc<Vec<f32>>, sample_rate: f32) -> Self {
        Self {
            samples,
            sample_rate,
            trim_start: 0,
            trim_end: 0,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn total_frames(&self) -> usize {
        self.samples.len() / SEGMENT_CHANNELS
    }

    pub fn trim_start(&self) -> usize {
        self.trim_start
    }

    /// Raw trim end as stored, where 0 stands for "full length".
    pub fn trim_end(&self) -> usize {
        self.trim_end
    }

    pub fn effective_end(&self) -> usize {
        if self.trim_end == 0 {
            self.total_frames()
        } else {
            self.trim_end
        }
    }

    pub fn trimmed_frames(&self) -> usize {
        self.effective_end().saturating_sub(self.trim_start)
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate <= 0.0 {
            return 0.0;
        }
        self.trimmed_frames() as f64 / self.sample_rate as f64
    }

    /// Interleaved samples inside the trim window.
    pub fn trimmed_samples(&self) -> &[f32] {
        let start = self.trim_start * SEGMENT_CHANNELS;
        let end = self.effective_end() * SEGMENT_CHANNELS;
        &self.samples[start..end]
    }

    /// Clamp and apply trim bounds. An end of 0 (or below) restores the full length.
    pub fn set_trim(&mut self, start: i64, end: i64) {
        let total = self.total_frames();
        self.trim_start = start.clamp(0, total as i64) as usize;
        self.trim_end = if end <= 0 {
            0
        } else {
            (end as usize).clamp(self.trim_start, total)
        };
    }

    /// Long enough, after trimming, to be sent as source material.
    pub fn is_usable_source(&self) -> bool {
        self.total_frames() >= MIN_SEGMENT_FRAMES && self.trimmed_frames() >= MIN_SEGMENT_FRAMES
    }
}

/// Outcome of finishing a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Commit {
    /// Stored and selected at this index.
    Stored(usize),
    TooShort,
    /// No segment slot or spare storage was reserved; the capture was dropped.
    Unreserved,
}

#[derive(Debug, Default)]
struct StoreInner {
    segments: Vec<RecordedSegment>,
    selected: Option<usize>,
    capture: Vec<f32>,
    /// Preallocated storage the next commit swaps in, already wrapped for sharing.
    spare: Option<Arc<Vec<f32>>>,
    capture_capacity: usize,
    max_segments: usize,
}

impl StoreInner {
    fn reserve(&mut self) {
        let wanted = self.capture_capacity;
        if self.capture.is_empty() && self.capture.capacity() < wanted {
            self.capture = Vec::with_capacity(wanted);
        }
        if self.spare.as_ref().map_or(true, |s| s.capacity() < wanted) {
            self.spare = Some(Arc::new(Vec::with_capacity(wanted)));
        }
        // Always leave a free slot so the next commit never grows the list.
        let len = self.segments.len();
        self.segments
            .reserve(self.max_segments.saturating_sub(len).max(1));
    }
}

/// Shared segment store. Cloning shares the same underlying segments.
#[derive(Debug, Clone, Default)]
pub struct SegmentStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve the capture buffers and segment slots. Not for the audio thread.
    pub fn prepare(&self, capture_frames: usize, max_segments: usize) {
        let mut inner = self.lock();
        inner.capture_capacity = capture_frames * SEGMENT_CHANNELS;
        inner.max_segments = max_segments;
        if inner.capture.capacity() < inner.capture_capacity {
            inner.capture = Vec::with_capacity(inner.capture_capacity);
        }
        inner.reserve();
    }

    /// Restore the buffers a commit consumed. Call from the message thread
    /// after every commit.
    pub fn replenish(&self) {
        self.lock().reserve();
    }

    /// Audio thread: start a fresh capture.
    pub(crate) fn begin_capture(&self) {
        self.lock().capture.clear();
    }

    /// Audio thread: append one block of stereo input, interleaved.
    ///
    /// Never grows the buffer; frames past the reserved capacity are dropped.
    /// Returns the number of frames appended.
    pub(crate) fn append_capture(&self, left: &[f32], right: &[f32]) -> usize {
        let mut inner = self.lock();
        let room = (inner.capture.capacity() - inner.capture.len()) / SEGMENT_CHANNELS;
        let frames = left.len().min(right.len()).min(room);
        for (&l, &r) in left[..frames].iter().zip(&right[..frames]) {
            inner.capture.push(l);
            inner.capture.push(r);
        }
        frames
    }

    /// Audio thread: finish the capture, committing it if it is long enough.
    ///
    /// Never allocates: if [`replenish`](Self::replenish) has not restored a
    /// free slot and spare storage since the last commit, the capture is dropped.
    pub(crate) fn commit_capture(&self, sample_rate: f32) -> Commit {
        let mut inner = self.lock();
        let inner = &mut *inner;
        if inner.capture.len() / SEGMENT_CHANNELS < MIN_SEGMENT_FRAMES {
            inner.capture.clear();
            return Commit::TooShort;
        }
        if inner.segments.len() == inner.segments.capacity() {
            inner.capture.clear();
            return Commit::Unreserved;
        }
        let Some(mut samples) = inner.spare.take() else {
            inner.capture.clear();
            return Commit::Unreserved;
        };
        let Some(storage) = Arc::get_mut(&mut samples) else {
            inner.capture.clear();
            return Commit::Unreserved;
        };
        std::mem::swap(storage, &mut inner.capture);
        inner
            .segments
            .push(RecordedSegment::from_shared(samples, sample_rate));
        let index = inner.segments.len() - 1;
        inner.selected = Some(index);
        Commit::Stored(index)
    }

    pub fn len(&self) -> usize {
        self.lock().segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().segments.is_empty()
    }

    /// Frames in the in-progress capture.
    pub fn capture_frames(&self) -> usize {
        self.lock().capture.len() / SEGMENT_CHANNELS
    }

    /// Cheap snapshot; the sample data is shared, not copied.
    pub fn get(&self, index: usize) -> Option<RecordedSegment> {
        self.lock().segments.get(index).cloned()
    }

    pub fn duration_seconds(&self, index: usize) -> f64 {
        self.get(index).map_or(0.0, |seg| seg.duration_seconds())
    }

    pub fn selected(&self) -> Option<usize> {
        self.lock().selected
    }

    pub fn select(&self, index: Option<usize>) {
        let mut inner = self.lock();
        let len = inner.segments.len();
        inner.selected = index.filter(|&i| i < len);
    }

    /// The selected segment if it qualifies as source material.
    pub fn selected_source(&self) -> Option<(usize, RecordedSegment)> {
        let inner = self.lock();
        let index = inner.selected?;
        let seg = inner.segments.get(index)?;
        seg.is_usable_source().then(|| (index, seg.clone()))
    }

    pub fn has_selected_source(&self) -> bool {
        self.selected_source().is_some()
    }

    pub fn set_trim(&self, index: usize, start: i64, end: i64) {
        if let Some(seg) = self.lock().segments.get_mut(index) {
            seg.set_trim(start, end);
        }
    }

    pub fn remove(&self, index: usize) {
        let mut inner = self.lock();
        if index >= inner.segments.len() {
            return;
        }
        inner.segments.remove(index);
        inner.selected = match inner.selected {
            Some(sel) if sel == index => None,
            Some(sel) if sel > index => Some(sel - 1),
            other => other,
        };
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.segments.clear();
        inner.capture.clear();
        inner.selected = None;
    }
}
