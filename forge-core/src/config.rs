use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;

pub const DEFAULT_BASE_URL: &str = "https://api.sunoapi.org";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForgeConfig {
    /// Used when the host has no persisted credential for this instance.
    pub api_key: Option<String>,
    pub base_url: String,
    pub poll_interval_ms: u64,
    /// `None` polls until the backend reports a terminal status.
    pub max_poll_attempts: Option<u32>,
    pub playback_capacity_frames: usize,
    pub max_capture_seconds: u32,
    pub max_segments: usize,
    pub library_dir: Option<PathBuf>,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval_ms: 800,
            max_poll_attempts: None,
            playback_capacity_frames: 1 << 22,
            max_capture_seconds: 120,
            max_segments: 64,
            library_dir: None,
        }
    }
}

impl ForgeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Where generated results are written.
    pub fn library_dir(&self) -> PathBuf {
        self.library_dir.clone().unwrap_or_else(|| {
            let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
            path.push("forge");
            path.push("generations");
            path
        })
    }

    /// Frames reserved for one in-progress capture at the given host rate.
    pub fn capture_capacity_frames(&self, sample_rate: f32) -> usize {
        (self.max_capture_seconds as f64 * sample_rate.max(1.0) as f64).ceil() as usize
    }
}

pub fn config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("forge");
    path.push("config.json");
    path
}

pub fn load_config() -> ForgeConfig {
    let path = config_path();
    match std::fs::read_to_string(&path) {
        Ok(contents) => parse_config(&contents).unwrap_or_else(|e| {
            log::warn!("ignoring {}: {}", path.display(), e);
            ForgeConfig::default()
        }),
        Err(_) => ForgeConfig::default(),
    }
}

pub fn parse_config(contents: &str) -> Result<ForgeConfig> {
    Ok(serde_json::from_str(contents)?)
}

pub fn save_config(config: &ForgeConfig) -> Result<()> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    Ok(())
}
