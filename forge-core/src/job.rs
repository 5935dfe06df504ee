//! One generation workflow at a time, run on its own worker thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::client::{GenerateParams, GenerationClient, JobKind, Outcome};
use crate::codec;
use crate::error::{ForgeError, Result};
use crate::mailbox::{Mailbox, Notify, ResultPayload};
use crate::segments::{SegmentStore, SEGMENT_CHANNELS};
use crate::status::StatusBoard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobState {
    Idle = 0,
    Submitting = 1,
    Running = 2,
    Succeeded = 3,
    Failed = 4,
}

impl JobState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => JobState::Submitting,
            2 => JobState::Running,
            3 => JobState::Succeeded,
            4 => JobState::Failed,
            _ => JobState::Idle,
        }
    }

    /// Whether a new trigger is accepted in this state.
    pub fn accepts_trigger(self) -> bool {
        matches!(self, JobState::Idle | JobState::Succeeded | JobState::Failed)
    }
}

/// The job state as one atomic, shared by every clone.
#[derive(Debug, Clone, Default)]
pub struct SharedJobState(Arc<AtomicU8>);

impl SharedJobState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> JobState {
        JobState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: JobState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Claim the job slot. Only one caller wins while a job is in flight.
    pub fn try_begin(&self) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if !JobState::from_u8(current).accepts_trigger() {
                return false;
            }
            match self.0.compare_exchange_weak(
                current,
                JobState::Submitting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

/// How often, and how many times, to ask the backend about a task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` keeps polling until the backend reports a terminal status.
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(800),
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub kind: JobKind,
    pub params: GenerateParams,
}

impl JobRequest {
    pub fn new(kind: JobKind, mut params: GenerateParams) -> Self {
        if params.title.trim().is_empty() {
            params.title = kind.default_title().to_string();
        }
        Self { kind, params }
    }

    pub fn connectivity_test() -> Self {
        Self::new(JobKind::ConnectivityTest, GenerateParams::connectivity_test())
    }

    fn progress_text(&self) -> &'static str {
        match self.kind {
            JobKind::Generate => "Generating…",
            JobKind::UploadCover => "Generating cover…",
            JobKind::AddVocals => "Adding vocals…",
            JobKind::ConnectivityTest => "Testing API…",
        }
    }
}

/// Everything a worker needs, cloned into each job thread.
#[derive(Clone)]
pub struct JobContext {
    pub client: Arc<dyn GenerationClient>,
    pub state: SharedJobState,
    pub status: StatusBoard,
    pub mailbox: Mailbox,
    pub segments: SegmentStore,
    pub connected: Arc<AtomicBool>,
    pub notifier: Arc<dyn Notify>,
    pub poll: PollPolicy,
}

impl JobContext {
    /// Trigger a job. Returns `false` if another job is in flight or the
    /// worker could not be started.
    pub fn start(&self, request: JobRequest) -> bool {
        if !self.state.try_begin() {
            log::debug!("ignoring {:?} trigger, a job is already running", request.kind);
            return false;
        }

        let ctx = self.clone();
        let spawned = thread::Builder::new()
            .name("forge-job".into())
            .spawn(move || ctx.execute(request));
        match spawned {
            Ok(_) => true,
            Err(e) => {
                self.fail(&format!("Failed to start worker: {e}"));
                false
            }
        }
    }

    /// Run a job on the current thread, turning errors and panics into Failed.
    pub fn execute(&self, request: JobRequest) {
        let kind = request.kind;
        match catch_unwind(AssertUnwindSafe(|| self.run(request))) {
            Ok(Ok(())) => log::info!("{kind:?} job delivered its result"),
            Ok(Err(e)) => self.fail(&e.to_string()),
            Err(panic) => {
                let msg = if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else {
                    "Unknown panic".to_string()
                };
                log::error!("{kind:?} job panicked: {msg}");
                self.fail(&format!("Internal error: {msg}"));
            }
        }
    }

    fn fail(&self, message: &str) {
        log::warn!("job failed: {message}");
        self.status.set_error(message);
        self.state.set(JobState::Failed);
    }

    fn run(&self, request: JobRequest) -> Result<()> {
        if !self.client.has_credential() {
            return Err(ForgeError::Precondition("No API key".into()));
        }
        let source = if request.kind.needs_source() {
            let (_, segment) = self.segments.selected_source().ok_or_else(|| {
                ForgeError::Precondition(
                    "Select a recorded segment of at least one second".into(),
                )
            })?;
            Some(segment)
        } else {
            None
        };

        self.status.set_text("Checking connection…");
        if let Err(e) = self.client.check_connectivity() {
            self.connected.store(false, Ordering::Release);
            return Err(match e {
                ForgeError::Connectivity(_) | ForgeError::Precondition(_) => e,
                other => ForgeError::Connectivity(other.to_string()),
            });
        }
        self.connected.store(true, Ordering::Release);

        let upload_url = match source {
            Some(segment) => {
                self.status.set_text("Uploading…");
                let wav = codec::encode_wav(
                    segment.trimmed_samples(),
                    segment.sample_rate().round() as u32,
                    SEGMENT_CHANNELS as u16,
                )?;
                let url = self.client.upload(&wav, request.kind.upload_name())?;
                log::debug!("uploaded {} bytes to {url}", wav.len());
                Some(url)
            }
            None => None,
        };

        self.status.set_text(request.progress_text());
        let task_id = self
            .client
            .submit(request.kind, &request.params, upload_url.as_deref())?;
        if task_id.trim().is_empty() {
            return Err(ForgeError::Transport("No taskId in response".into()));
        }
        log::info!("{:?} submitted as task {task_id}", request.kind);
        self.state.set(JobState::Running);

        let urls = self.poll_until_done(&task_id)?;
        let url = urls
            .first()
            .ok_or_else(|| ForgeError::Backend("No audio URL in result".into()))?;

        self.status.set_text("Downloading…");
        let bytes = self.client.fetch(url)?;
        if bytes.is_empty() {
            return Err(ForgeError::Transport("Downloaded result is empty".into()));
        }

        let payload = ResultPayload {
            bytes,
            prompt: request.params.prompt,
            is_test: request.kind == JobKind::ConnectivityTest,
        };
        if let Some(stale) = self.mailbox.deposit(payload) {
            log::warn!(
                "dropping undrained result ({} bytes) in favour of the new one",
                stale.bytes.len()
            );
        }
        self.notifier.notify();
        Ok(())
    }

    fn poll_until_done(&self, task_id: &str) -> Result<Vec<String>> {
        let mut attempts = 0u32;
        loop {
            if let Some(max) = self.poll.max_attempts {
                if attempts >= max {
                    return Err(ForgeError::TimedOut { attempts });
                }
            }
            attempts += 1;

            match self.client.poll(task_id) {
                Ok(status) => match status.phase().outcome() {
                    Outcome::Succeeded => return Ok(status.result_urls),
                    Outcome::Failed => {
                        return Err(ForgeError::Backend(status.failure_message()))
                    }
                    Outcome::InProgress => {
                        log::debug!("task {task_id} is {:?}", status.status);
                    }
                },
                Err(e) => log::warn!("status check {attempts} for {task_id} failed: {e}"),
            }
            thread::sleep(self.poll.interval);
        }
    }
}
