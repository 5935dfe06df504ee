//! Message-thread to audio-thread handoff for decoded results.
//!
//! Two staging buffers circulate between the halves over a pair of SPSC
//! queues. The stager resamples into whichever buffer it currently owns and
//! publishes it; the audio side copies the newest publication into its ring
//! buffer and hands the buffer straight back. A buffer is only ever touched by
//! the side that currently owns it, so the audio thread never sees a partial
//! write, never allocates and never waits.

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::audio_buffer::RingBuffer;
use crate::error::{ForgeError, Result};

const STAGING_BUFFERS: usize = 2;

#[derive(Debug, Default)]
struct StagedBuffer {
    samples: Vec<f32>,
    frames: usize,
}

/// Frames produced when converting `frames` at `source_rate` to `host_rate`.
pub fn output_frames(frames: usize, source_rate: f32, host_rate: f32) -> usize {
    (frames as f64 * rate_ratio(source_rate, host_rate)).round() as usize
}

fn rate_ratio(source_rate: f32, host_rate: f32) -> f64 {
    if source_rate > 0.0 && host_rate > 0.0 {
        host_rate as f64 / source_rate as f64
    } else {
        1.0
    }
}

/// Linear-interpolation resampler producing interleaved stereo.
///
/// Mono input is duplicated to both channels; channels past the second are
/// ignored. `out` is cleared and refilled with exactly `out_frames` frames.
pub fn resample_into(
    interleaved: &[f32],
    channels: usize,
    source_rate: f32,
    host_rate: f32,
    out_frames: usize,
    out: &mut Vec<f32>,
) {
    out.clear();
    let frames = if channels == 0 { 0 } else { interleaved.len() / channels };
    if frames == 0 {
        out.resize(out_frames * 2, 0.0);
        return;
    }

    let ratio = rate_ratio(source_rate, host_rate);
    let last = frames - 1;
    out.reserve(out_frames * 2);
    for i in 0..out_frames {
        let src = i as f64 / ratio;
        let i0 = (src.floor() as usize).min(last);
        let i1 = (i0 + 1).min(last);
        let t = (src - src.floor()) as f32;

        let sample = |frame: usize, ch: usize| interleaved[frame * channels + ch];
        let left = sample(i0, 0) * (1.0 - t) + sample(i1, 0) * t;
        let right = if channels >= 2 {
            sample(i0, 1) * (1.0 - t) + sample(i1, 1) * t
        } else {
            left
        };
        out.push(left);
        out.push(right);
    }
}

/// Create the two halves of the playback bridge.
pub fn playback_channel(capacity_frames: usize) -> (PlaybackStager, PlaybackOutput) {
    let (to_audio, incoming) = HeapRb::<StagedBuffer>::new(STAGING_BUFFERS).split();
    let (returned, from_audio) = HeapRb::<StagedBuffer>::new(STAGING_BUFFERS).split();

    let stager = PlaybackStager {
        to_audio,
        from_audio,
        free: (0..STAGING_BUFFERS).map(|_| StagedBuffer::default()).collect(),
        capacity_frames,
        staged_frames: 0,
    };
    let output = PlaybackOutput {
        incoming,
        returned,
        ring: RingBuffer::new(capacity_frames),
    };
    (stager, output)
}

/// Producer half, used from the message thread.
pub struct PlaybackStager {
    to_audio: HeapProd<StagedBuffer>,
    from_audio: HeapCons<StagedBuffer>,
    free: Vec<StagedBuffer>,
    capacity_frames: usize,
    staged_frames: usize,
}

impl PlaybackStager {
    /// Frame count of the most recent successful publication.
    pub fn staged_frames(&self) -> usize {
        self.staged_frames
    }

    /// Resample decoded audio to the host rate and publish it for playback.
    ///
    /// Returns the number of frames published. Rejected requests leave
    /// anything already playing untouched.
    pub fn stage(
        &mut self,
        interleaved: &[f32],
        channels: usize,
        source_rate: f32,
        host_rate: f32,
    ) -> Result<usize> {
        if channels == 0 || interleaved.len() < channels {
            return Err(ForgeError::Staging("no audio frames".into()));
        }
        let frames = interleaved.len() / channels;
        let out_frames = output_frames(frames, source_rate, host_rate);
        if out_frames == 0 {
            return Err(ForgeError::Staging("no audio frames".into()));
        }
        if out_frames > self.capacity_frames {
            return Err(ForgeError::Staging(format!(
                "{} frames exceeds playback capacity of {}",
                out_frames, self.capacity_frames
            )));
        }

        while let Some(buffer) = self.from_audio.try_pop() {
            self.free.push(buffer);
        }
        let Some(mut buffer) = self.free.pop() else {
            return Err(ForgeError::Staging(
                "previous results have not reached the audio thread yet".into(),
            ));
        };

        resample_into(
            interleaved,
            channels,
            source_rate,
            host_rate,
            out_frames,
            &mut buffer.samples,
        );
        buffer.frames = out_frames;

        if let Err(buffer) = self.to_audio.try_push(buffer) {
            self.free.push(buffer);
            return Err(ForgeError::Staging("playback queue is full".into()));
        }
        self.staged_frames = out_frames;
        Ok(out_frames)
    }
}

/// Consumer half, owned by the audio thread.
pub struct PlaybackOutput {
    incoming: HeapCons<StagedBuffer>,
    returned: HeapProd<StagedBuffer>,
    ring: RingBuffer,
}

impl PlaybackOutput {
    /// Frames left to play.
    pub fn pending_frames(&self) -> usize {
        self.ring.len()
    }

    /// Pick up a new publication, if any, replacing whatever was playing.
    fn drain_staged(&mut self) {
        let mut newest: Option<StagedBuffer> = None;
        while let Some(buffer) = self.incoming.try_pop() {
            if let Some(older) = newest.replace(buffer) {
                // Both queues hold every buffer in existence, so this cannot fail.
                let _ = self.returned.try_push(older);
            }
        }
        if let Some(buffer) = newest {
            self.ring.clear();
            self.ring.write(&buffer.samples[..buffer.frames * 2]);
            let _ = self.returned.try_push(buffer);
        }
    }

    /// Fill the output channels from the ring buffer, padding with silence.
    pub fn render<S: AsMut<[f32]>>(&mut self, outputs: &mut [S]) {
        self.drain_staged();

        match outputs {
            [] => {}
            [mono] => {
                let mono = mono.as_mut();
                let n = self.ring.read_mixed_into(mono);
                mono[n..].fill(0.0);
            }
            [left, right, rest @ ..] => {
                let (left, right) = (left.as_mut(), right.as_mut());
                let n = self.ring.read_into(left, right);
                left[n..].fill(0.0);
                right[n..].fill(0.0);
                for extra in rest {
                    extra.as_mut().fill(0.0);
                }
            }
        }
    }
}
