//! Per-block audio-thread entry point.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::capture::{CaptureEvent, TransportCapture};
use crate::mailbox::Notify;
use crate::playback::PlaybackOutput;
use crate::segments::SegmentStore;

pub const DEFAULT_SAMPLE_RATE: f32 = 44_100.0;
pub const DEFAULT_BPM: f64 = 120.0;

/// Wake signal the audio thread can poll without blocking.
#[derive(Debug, Default)]
pub struct WakeFlag(AtomicBool);

impl WakeFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a pending wake.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

impl Notify for WakeFlag {
    fn notify(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Latest host sample rate and tempo, published by the audio thread.
#[derive(Debug, Clone)]
pub struct HostInfo {
    sample_rate: Arc<AtomicU32>,
    bpm: Arc<AtomicU64>,
}

impl Default for HostInfo {
    fn default() -> Self {
        Self {
            sample_rate: Arc::new(AtomicU32::new(DEFAULT_SAMPLE_RATE.to_bits())),
            bpm: Arc::new(AtomicU64::new(DEFAULT_BPM.to_bits())),
        }
    }
}

impl HostInfo {
    pub fn sample_rate(&self) -> f32 {
        f32::from_bits(self.sample_rate.load(Ordering::Relaxed))
    }

    pub fn set_sample_rate(&self, rate: f32) {
        if rate > 0.0 {
            self.sample_rate.store(rate.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn bpm(&self) -> f64 {
        f64::from_bits(self.bpm.load(Ordering::Relaxed))
    }

    pub fn set_bpm(&self, bpm: f64) {
        if bpm > 0.0 {
            self.bpm.store(bpm.to_bits(), Ordering::Relaxed);
        }
    }
}

/// Transport and timing the host reports for one callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostBlock {
    pub is_playing: bool,
    pub bpm: Option<f64>,
    pub sample_rate: f32,
}

/// Work the message thread should pick up after this block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockEvents {
    /// A capture was committed; the spare buffer needs replenishing.
    pub committed: Option<usize>,
    /// A capture was dropped for want of a reserved segment slot.
    pub capture_dropped: bool,
    /// A job deposited a result in the mailbox.
    pub result_ready: bool,
}

impl BlockEvents {
    /// Whether the segment store should be replenished off the audio thread.
    pub fn needs_replenish(&self) -> bool {
        self.committed.is_some() || self.capture_dropped
    }
}

pub struct RealtimeProcessor {
    capture: TransportCapture,
    output: PlaybackOutput,
    wake: Arc<WakeFlag>,
    host: HostInfo,
}

impl RealtimeProcessor {
    pub fn new(
        segments: SegmentStore,
        output: PlaybackOutput,
        wake: Arc<WakeFlag>,
        host: HostInfo,
    ) -> Self {
        Self {
            capture: TransportCapture::new(segments),
            output,
            wake,
            host,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_capturing()
    }

    /// Capture the input, then overwrite the same channels with playback.
    pub fn process<S>(&mut self, channels: &mut [S], block: HostBlock) -> BlockEvents
    where
        S: AsRef<[f32]> + AsMut<[f32]>,
    {
        self.host.set_sample_rate(block.sample_rate);
        if let Some(bpm) = block.bpm {
            self.host.set_bpm(bpm);
        }

        let event = self
            .capture
            .process_block(channels, block.is_playing, block.sample_rate);

        self.output.render(channels);

        BlockEvents {
            committed: match event {
                CaptureEvent::Committed(index) => Some(index),
                _ => None,
            },
            capture_dropped: event == CaptureEvent::Dropped,
            result_ready: self.wake.take(),
        }
    }
}
