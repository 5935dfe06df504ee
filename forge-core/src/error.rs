use thiserror::Error;

/// Everything that can end a job, a decode, or a staging request.
///
/// The `Display` output is what lands in the status text, so messages are
/// written for the musician, not for a log file.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// Missing credential or no qualifying source segment. No network call was made.
    #[error("{0}")]
    Precondition(String),

    /// Invalid credential or no quota left.
    #[error("API key invalid or no credits{}", detail_suffix(.0))]
    Connectivity(String),

    /// Submit, upload, poll or fetch failed below the backend's own status reporting.
    #[error("{0}")]
    Transport(String),

    /// The backend reported the task as failed.
    #[error("{0}")]
    Backend(String),

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Failed to encode audio: {0}")]
    Encode(String),

    /// Resample request rejected: empty, over capacity, or both staging buffers in flight.
    #[error("Playback staging rejected: {0}")]
    Staging(String),

    #[error("Timed out after {attempts} status checks")]
    TimedOut { attempts: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {detail}")
    }
}

impl From<reqwest::Error> for ForgeError {
    fn from(err: reqwest::Error) -> Self {
        ForgeError::Transport(err.to_string())
    }
}

impl From<hound::Error> for ForgeError {
    fn from(err: hound::Error) -> Self {
        ForgeError::Decode(err.to_string())
    }
}

impl From<symphonia::core::errors::Error> for ForgeError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        ForgeError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ForgeError>;
