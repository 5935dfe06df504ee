//! The generation backend as seen by the job state machine.
//!
//! Every call blocks and is made from a job worker thread only.

use serde::Serialize;

use crate::error::{ForgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Model {
    V4,
    #[serde(rename = "V4_5")]
    V4_5,
    #[serde(rename = "V4_5PLUS")]
    V4_5Plus,
    #[default]
    #[serde(rename = "V4_5ALL")]
    V4_5All,
    V5,
}

impl Model {
    pub fn as_str(self) -> &'static str {
        match self {
            Model::V4 => "V4",
            Model::V4_5 => "V4_5",
            Model::V4_5Plus => "V4_5PLUS",
            Model::V4_5All => "V4_5ALL",
            Model::V5 => "V5",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Generate,
    UploadCover,
    AddVocals,
    ConnectivityTest,
}

impl JobKind {
    /// Whether the job needs a recorded segment as source material.
    pub fn needs_source(self) -> bool {
        matches!(self, JobKind::UploadCover | JobKind::AddVocals)
    }

    pub fn default_title(self) -> &'static str {
        match self {
            JobKind::Generate => "forge",
            JobKind::UploadCover => "forge_cover",
            JobKind::AddVocals => "forge_vocals",
            JobKind::ConnectivityTest => "api_test",
        }
    }

    /// File name the source segment is uploaded under.
    pub fn upload_name(self) -> &'static str {
        match self {
            JobKind::AddVocals => "instrumental.wav",
            _ => "recorded.wav",
        }
    }
}

/// Parameters for a single request. Empty strings are left out on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateParams {
    pub prompt: String,
    pub style: String,
    pub title: String,
    pub custom_mode: bool,
    pub instrumental: bool,
    pub model: Model,
    pub negative_tags: String,
    pub vocal_gender: String,
    pub style_weight: f64,
    pub weirdness_constraint: f64,
    pub audio_weight: f64,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            style: String::new(),
            title: String::new(),
            custom_mode: false,
            instrumental: true,
            model: Model::V4_5All,
            negative_tags: String::new(),
            vocal_gender: String::new(),
            style_weight: 0.65,
            weirdness_constraint: 0.65,
            audio_weight: 0.65,
        }
    }
}

impl GenerateParams {
    /// Defaults the add-vocals endpoint expects.
    pub fn add_vocals() -> Self {
        Self {
            model: Model::V4_5Plus,
            style_weight: 0.61,
            weirdness_constraint: 0.72,
            ..Self::default()
        }
    }

    /// The minimal request used to prove the credential end to end.
    pub fn connectivity_test() -> Self {
        Self {
            prompt: "test".into(),
            style: "instrumental".into(),
            title: "api_test".into(),
            ..Self::default()
        }
    }
}

/// Backend task status, as the closed set of strings the backend documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPhase {
    Pending,
    TextSuccess,
    FirstSuccess,
    Success,
    CreateTaskFailed,
    GenerateAudioFailed,
    CallbackException,
    SensitiveWordError,
    /// Anything else, classified by pattern.
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    InProgress,
    Succeeded,
    Failed,
}

impl TaskPhase {
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "PENDING" => TaskPhase::Pending,
            "TEXT_SUCCESS" => TaskPhase::TextSuccess,
            "FIRST_SUCCESS" => TaskPhase::FirstSuccess,
            "SUCCESS" => TaskPhase::Success,
            "CREATE_TASK_FAILED" => TaskPhase::CreateTaskFailed,
            "GENERATE_AUDIO_FAILED" => TaskPhase::GenerateAudioFailed,
            "CALLBACK_EXCEPTION" => TaskPhase::CallbackException,
            "SENSITIVE_WORD_ERROR" => TaskPhase::SensitiveWordError,
            _ => TaskPhase::Other(status.to_string()),
        }
    }

    /// Success is decided before failure, so a string matching both counts as success.
    pub fn outcome(&self) -> Outcome {
        match self {
            TaskPhase::Pending | TaskPhase::TextSuccess | TaskPhase::FirstSuccess => {
                Outcome::InProgress
            }
            TaskPhase::Success => Outcome::Succeeded,
            TaskPhase::CreateTaskFailed
            | TaskPhase::GenerateAudioFailed
            | TaskPhase::CallbackException
            | TaskPhase::SensitiveWordError => Outcome::Failed,
            TaskPhase::Other(raw) => {
                let lower = raw.trim().to_ascii_lowercase();
                if lower == "success" {
                    Outcome::Succeeded
                } else if lower.contains("fail") || lower.contains("error") {
                    Outcome::Failed
                } else {
                    Outcome::InProgress
                }
            }
        }
    }
}

/// One status check's answer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskStatus {
    pub status: String,
    pub error_message: String,
    pub result_urls: Vec<String>,
}

impl TaskStatus {
    pub fn phase(&self) -> TaskPhase {
        TaskPhase::parse(&self.status)
    }

    /// What to report when the backend says the task failed.
    pub fn failure_message(&self) -> String {
        if self.error_message.is_empty() {
            self.status.clone()
        } else {
            self.error_message.clone()
        }
    }
}

/// Synchronous generation backend.
pub trait GenerationClient: Send + Sync {
    fn set_credential(&self, credential: &str);

    fn has_credential(&self) -> bool;

    /// Check the credential and remaining quota.
    fn check_connectivity(&self) -> Result<()>;

    /// Start a task and return its opaque identifier.
    fn submit(&self, kind: JobKind, params: &GenerateParams, source_url: Option<&str>)
        -> Result<String>;

    fn poll(&self, task_id: &str) -> Result<TaskStatus>;

    /// Upload source audio and return a URL the backend can read it from.
    fn upload(&self, bytes: &[u8], file_name: &str) -> Result<String>;

    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Stands in when the real backend could not be constructed; every call
/// fails with the construction error.
#[derive(Debug, Clone)]
pub struct UnavailableClient {
    reason: String,
}

impl UnavailableClient {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn error(&self) -> ForgeError {
        ForgeError::Transport(format!("HTTP client unavailable: {}", self.reason))
    }
}

impl GenerationClient for UnavailableClient {
    fn set_credential(&self, _credential: &str) {}

    fn has_credential(&self) -> bool {
        true
    }

    fn check_connectivity(&self) -> Result<()> {
        Err(ForgeError::Connectivity(self.error().to_string()))
    }

    fn submit(&self, _: JobKind, _: &GenerateParams, _: Option<&str>) -> Result<String> {
        Err(self.error())
    }

    fn poll(&self, _task_id: &str) -> Result<TaskStatus> {
        Err(self.error())
    }

    fn upload(&self, _bytes: &[u8], _file_name: &str) -> Result<String> {
        Err(self.error())
    }

    fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
        Err(self.error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_client_reports_reason() {
        let client = UnavailableClient::new("no TLS backend");
        assert_eq!(
            client.check_connectivity().unwrap_err().to_string(),
            "API key invalid or no credits: HTTP client unavailable: no TLS backend"
        );
        assert!(client.fetch("x").is_err());
    }

    #[test]
    fn test_known_phases() {
        assert_eq!(TaskPhase::parse("SUCCESS").outcome(), Outcome::Succeeded);
        assert_eq!(TaskPhase::parse("success").outcome(), Outcome::Succeeded);
        assert_eq!(TaskPhase::parse("PENDING").outcome(), Outcome::InProgress);
        assert_eq!(TaskPhase::parse("TEXT_SUCCESS").outcome(), Outcome::InProgress);
        assert_eq!(TaskPhase::parse("FIRST_SUCCESS").outcome(), Outcome::InProgress);
        assert_eq!(TaskPhase::parse("CALLBACK_EXCEPTION").outcome(), Outcome::Failed);
        assert_eq!(TaskPhase::parse("SENSITIVE_WORD_ERROR").outcome(), Outcome::Failed);
        assert_eq!(TaskPhase::parse("GENERATE_AUDIO_FAILED").outcome(), Outcome::Failed);
    }

    #[test]
    fn test_unknown_strings_fall_back_to_patterns() {
        assert_eq!(TaskPhase::parse("").outcome(), Outcome::InProgress);
        assert_eq!(TaskPhase::parse("QUEUED").outcome(), Outcome::InProgress);
        assert_eq!(TaskPhase::parse("Upload Failure").outcome(), Outcome::Failed);
        assert_eq!(TaskPhase::parse("internal ERROR").outcome(), Outcome::Failed);
        assert_eq!(TaskPhase::parse("Success ").outcome(), Outcome::Succeeded);
    }

    #[test]
    fn test_failure_message_prefers_backend_detail() {
        let mut status = TaskStatus {
            status: "CREATE_TASK_FAILED".into(),
            ..TaskStatus::default()
        };
        assert_eq!(status.failure_message(), "CREATE_TASK_FAILED");
        status.error_message = "prompt rejected".into();
        assert_eq!(status.failure_message(), "prompt rejected");
    }

    #[test]
    fn test_model_names() {
        assert_eq!(Model::default(), Model::V4_5All);
        assert_eq!(Model::V4_5Plus.as_str(), "V4_5PLUS");
    }

    #[test]
    fn test_add_vocals_defaults() {
        let p = GenerateParams::add_vocals();
        assert_eq!(p.model, Model::V4_5Plus);
        assert_eq!(p.style_weight, 0.61);
        assert_eq!(p.weirdness_constraint, 0.72);
    }
}
