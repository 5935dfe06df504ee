//! On-disk archive of generated results: `<stamp>.wav` plus `<stamp>.json`.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::codec::{self, DecodedAudio};
use crate::error::Result;

/// Sidecar written next to each saved result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRecord {
    pub prompt: String,
    pub created_unix: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub frames: usize,
}

fn unix_now() -> (u64, u32) {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_secs(), d.subsec_millis()))
        .unwrap_or((0, 0))
}

/// Pick an unused stem inside `dir`, suffixing a counter on collision.
fn unique_stem(dir: &Path, base: &str) -> String {
    let mut stem = base.to_string();
    let mut n = 1;
    while dir.join(format!("{stem}.wav")).exists() {
        stem = format!("{base}-{n}");
        n += 1;
    }
    stem
}

/// Save decoded audio and its prompt. Returns the WAV path.
pub fn save_generation(dir: &Path, audio: &DecodedAudio, prompt: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let (secs, millis) = unix_now();
    let stem = unique_stem(dir, &format!("generation-{secs}-{millis:03}"));

    let wav_path = dir.join(format!("{stem}.wav"));
    codec::write_wav(&wav_path, &audio.samples, audio.sample_rate, audio.channels)?;

    let record = GenerationRecord {
        prompt: prompt.to_string(),
        created_unix: secs,
        sample_rate: audio.sample_rate,
        channels: audio.channels,
        frames: audio.frames(),
    };
    std::fs::write(
        dir.join(format!("{stem}.json")),
        serde_json::to_string_pretty(&record)?,
    )?;
    log::info!("saved generation to {}", wav_path.display());
    Ok(wav_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio() -> DecodedAudio {
        DecodedAudio {
            samples: vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3],
            sample_rate: 32_000,
            channels: 2,
        }
    }

    #[test]
    fn test_save_writes_wav_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("nested").join("generations");
        let path = save_generation(&lib, &audio(), "warm pads, 90 bpm").unwrap();

        assert!(path.starts_with(&lib));
        let decoded = codec::decode(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(decoded.frames(), 3);
        assert_eq!(decoded.sample_rate, 32_000);

        let sidecar = std::fs::read_to_string(path.with_extension("json")).unwrap();
        let record: GenerationRecord = serde_json::from_str(&sidecar).unwrap();
        assert_eq!(record.prompt, "warm pads, 90 bpm");
        assert_eq!(record.frames, 3);
        assert_eq!(record.channels, 2);
    }

    #[test]
    fn test_same_instant_saves_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("generation-1-000.wav"), b"").unwrap();
        assert_eq!(unique_stem(dir.path(), "generation-1-000"), "generation-1-000-1");
        assert_eq!(unique_stem(dir.path(), "generation-2-000"), "generation-2-000");
    }

    #[test]
    fn test_unwritable_library_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        let err = save_generation(&blocker.join("generations"), &audio(), "x").unwrap_err();
        assert!(matches!(err, crate::error::ForgeError::Io(_)));
    }
}
