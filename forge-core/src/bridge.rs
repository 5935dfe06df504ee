//! The shared handle the plugin, its message-thread tasks and any control
//! surface hold onto.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crate::client::{GenerateParams, GenerationClient, JobKind};
use crate::codec;
use crate::config::ForgeConfig;
use crate::error::Result;
use crate::job::{JobContext, JobRequest, JobState, PollPolicy, SharedJobState};
use crate::library;
use crate::mailbox::{Mailbox, Notify, ResultPayload};
use crate::playback::{playback_channel, PlaybackStager};
use crate::processor::{HostInfo, RealtimeProcessor, WakeFlag};
use crate::segments::SegmentStore;
use crate::status::StatusBoard;

pub const READY_TEXT: &str = "Ready";
pub const GENERATED_TEXT: &str = "Generated - playing.";
pub const TEST_PASSED_TEXT: &str = "API test passed - audio received and playing.";

#[derive(Clone)]
pub struct Bridge {
    jobs: JobContext,
    stager: Arc<Mutex<PlaybackStager>>,
    host: HostInfo,
    credential_epoch: Arc<AtomicU64>,
    library_dir: Option<PathBuf>,
    config: Arc<ForgeConfig>,
}

impl Bridge {
    /// Build a bridge and the audio-thread processor that feeds it.
    ///
    /// Results are woken through `wake`, which the processor polls once per
    /// block.
    pub fn new(
        client: Arc<dyn GenerationClient>,
        config: ForgeConfig,
        wake: Arc<WakeFlag>,
    ) -> (Self, RealtimeProcessor) {
        let segments = SegmentStore::new();
        let host = HostInfo::default();
        let (stager, output) = playback_channel(config.playback_capacity_frames);
        let processor = RealtimeProcessor::new(segments.clone(), output, wake.clone(), host.clone());
        let bridge = Self::with_parts(client, config, wake, segments, host, stager);
        (bridge, processor)
    }

    /// Assemble a bridge for a caller that owns the playback output itself.
    pub fn with_parts(
        client: Arc<dyn GenerationClient>,
        config: ForgeConfig,
        notifier: Arc<dyn Notify>,
        segments: SegmentStore,
        host: HostInfo,
        stager: PlaybackStager,
    ) -> Self {
        let jobs = JobContext {
            client,
            state: SharedJobState::new(),
            status: StatusBoard::new(READY_TEXT),
            mailbox: Mailbox::new(),
            segments,
            connected: Arc::new(AtomicBool::new(false)),
            notifier,
            poll: PollPolicy {
                interval: config.poll_interval(),
                max_attempts: config.max_poll_attempts,
            },
        };
        Self {
            jobs,
            stager: Arc::new(Mutex::new(stager)),
            host,
            credential_epoch: Arc::new(AtomicU64::new(0)),
            library_dir: Some(config.library_dir()),
            config: Arc::new(config),
        }
    }

    /// Stop saving results to disk.
    pub fn without_library(mut self) -> Self {
        self.library_dir = None;
        self
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    pub fn segments(&self) -> &SegmentStore {
        &self.jobs.segments
    }

    pub fn host(&self) -> &HostInfo {
        &self.host
    }

    /// Reserve capture storage for the given host rate.
    pub fn prepare(&self, sample_rate: f32) {
        self.host.set_sample_rate(sample_rate);
        self.jobs.segments.prepare(
            self.config.capture_capacity_frames(sample_rate),
            self.config.max_segments,
        );
    }

    /// Install a new credential and re-probe connectivity in the background.
    pub fn set_credential(&self, credential: &str) {
        let credential = credential.trim();
        self.jobs.client.set_credential(credential);
        self.jobs.connected.store(false, Ordering::Release);
        let epoch = self.credential_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        if credential.is_empty() {
            return;
        }

        let client = self.jobs.client.clone();
        let connected = self.jobs.connected.clone();
        let current = self.credential_epoch.clone();
        let spawned = thread::Builder::new()
            .name("forge-probe".into())
            .spawn(move || {
                let result = client.check_connectivity();
                // A newer credential owns the flag now.
                if current.load(Ordering::Acquire) != epoch {
                    return;
                }
                match result {
                    Ok(()) => {
                        log::info!("credential accepted");
                        connected.store(true, Ordering::Release);
                    }
                    Err(e) => log::warn!("credential check failed: {e}"),
                }
            });
        if let Err(e) = spawned {
            log::warn!("could not start connectivity probe: {e}");
        }
    }

    pub fn has_credential(&self) -> bool {
        self.jobs.client.has_credential()
    }

    pub fn is_connected(&self) -> bool {
        self.jobs.connected.load(Ordering::Acquire)
    }

    pub fn start_generate(&self, params: GenerateParams) -> bool {
        self.jobs.start(JobRequest::new(JobKind::Generate, params))
    }

    /// Cover the selected segment.
    pub fn start_upload_cover(&self, params: GenerateParams) -> bool {
        self.jobs.start(JobRequest::new(JobKind::UploadCover, params))
    }

    /// Add vocals over the selected segment.
    pub fn start_add_vocals(&self, params: GenerateParams) -> bool {
        self.jobs.start(JobRequest::new(JobKind::AddVocals, params))
    }

    pub fn start_connectivity_test(&self) -> bool {
        self.jobs.start(JobRequest::connectivity_test())
    }

    /// Message thread: decode and stage a waiting result, if there is one.
    ///
    /// Returns whether a payload was taken.
    pub fn handle_result(&self) -> bool {
        let Some(payload) = self.jobs.mailbox.take() else {
            return false;
        };
        match self.consume(&payload) {
            Ok(frames) => {
                log::info!("staged {frames} frames for playback");
                self.jobs.status.set_text(if payload.is_test {
                    TEST_PASSED_TEXT
                } else {
                    GENERATED_TEXT
                });
                self.jobs.state.set(JobState::Succeeded);
            }
            Err(e) => {
                log::warn!("result could not be played: {e}");
                self.jobs.status.set_error(&e.to_string());
                self.jobs.state.set(JobState::Failed);
            }
        }
        true
    }

    fn consume(&self, payload: &ResultPayload) -> Result<usize> {
        let audio = codec::decode(&payload.bytes)?;
        let frames = self
            .stager
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stage(
                &audio.samples,
                audio.channels as usize,
                audio.sample_rate as f32,
                self.host.sample_rate(),
            )?;

        if !payload.is_test {
            if let Some(dir) = &self.library_dir {
                if let Err(e) = library::save_generation(dir, &audio, &payload.prompt) {
                    log::warn!("could not save generation to {}: {e}", dir.display());
                }
            }
        }
        Ok(frames)
    }

    /// Frames published by the most recent successful staging.
    pub fn staged_frames(&self) -> usize {
        self.stager
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .staged_frames()
    }

    pub fn state(&self) -> JobState {
        self.jobs.state.get()
    }

    pub fn status_text(&self) -> String {
        self.jobs.status.text()
    }

    pub fn last_error(&self) -> String {
        self.jobs.status.last_error()
    }

    pub fn host_bpm(&self) -> f64 {
        self.host.bpm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::TaskStatus;
    use crate::error::ForgeError;

    struct Offline;

    impl GenerationClient for Offline {
        fn set_credential(&self, _: &str) {}
        fn has_credential(&self) -> bool {
            false
        }
        fn check_connectivity(&self) -> Result<()> {
            Err(ForgeError::Connectivity(String::new()))
        }
        fn submit(&self, _: JobKind, _: &GenerateParams, _: Option<&str>) -> Result<String> {
            unreachable!("offline client never submits")
        }
        fn poll(&self, _: &str) -> Result<TaskStatus> {
            unreachable!("offline client never polls")
        }
        fn upload(&self, _: &[u8], _: &str) -> Result<String> {
            unreachable!("offline client never uploads")
        }
        fn fetch(&self, _: &str) -> Result<Vec<u8>> {
            unreachable!("offline client never fetches")
        }
    }

    fn bridge() -> Bridge {
        let (bridge, _processor) =
            Bridge::new(Arc::new(Offline), ForgeConfig::default(), Arc::new(WakeFlag::new()));
        bridge.without_library()
    }

    #[test]
    fn test_initial_state() {
        let bridge = bridge();
        assert_eq!(bridge.state(), JobState::Idle);
        assert_eq!(bridge.status_text(), READY_TEXT);
        assert!(!bridge.is_connected());
        assert_eq!(bridge.host_bpm(), 120.0);
        assert!(!bridge.handle_result());
    }

    #[test]
    fn test_undecodable_result_fails_and_keeps_previous_audio() {
        let bridge = bridge();
        bridge.jobs.state.set(JobState::Running);
        bridge.jobs.mailbox.deposit(ResultPayload {
            bytes: b"not audio".to_vec(),
            prompt: String::new(),
            is_test: false,
        });
        assert!(bridge.handle_result());
        assert_eq!(bridge.state(), JobState::Failed);
        assert!(bridge.last_error().starts_with("Failed to decode audio"));
        assert_eq!(bridge.staged_frames(), 0);
    }

    #[test]
    fn test_test_result_reports_pass() {
        let bridge = bridge();
        bridge.jobs.state.set(JobState::Running);
        bridge.jobs.mailbox.deposit(ResultPayload {
            bytes: codec::encode_wav(&[0.1; 200], 44_100, 2).unwrap(),
            prompt: "test".into(),
            is_test: true,
        });
        assert!(bridge.handle_result());
        assert_eq!(bridge.state(), JobState::Succeeded);
        assert_eq!(bridge.status_text(), TEST_PASSED_TEXT);
        assert_eq!(bridge.staged_frames(), 100);
    }

    #[test]
    fn test_empty_credential_clears_connection_without_probe() {
        let bridge = bridge();
        bridge.jobs.connected.store(true, Ordering::Release);
        bridge.set_credential("   ");
        assert!(!bridge.is_connected());
    }
}
