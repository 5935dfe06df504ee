//! WAV encoding for uploads and the library; WAV/MP3 decoding for results.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{ForgeError, Result};

const PCM24_MAX: f32 = 8_388_607.0;

/// Interleaved f32 audio as produced by [`decode`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

fn pcm24_spec(sample_rate: u32, channels: u16) -> Result<WavSpec> {
    if channels == 0 || sample_rate == 0 {
        return Err(ForgeError::Encode(format!(
            "invalid format: {channels} channels at {sample_rate} Hz"
        )));
    }
    Ok(WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 24,
        sample_format: SampleFormat::Int,
    })
}

fn write_pcm24<W: std::io::Write + std::io::Seek>(
    writer: &mut WavWriter<W>,
    samples: &[f32],
) -> std::result::Result<(), hound::Error> {
    for &sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * PCM24_MAX).round() as i32)?;
    }
    Ok(())
}

/// Encode interleaved samples as a 24-bit PCM WAV held in memory.
pub fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = pcm24_spec(sample_rate, channels)?;
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            WavWriter::new(&mut cursor, spec).map_err(|e| ForgeError::Encode(e.to_string()))?;
        write_pcm24(&mut writer, samples).map_err(|e| ForgeError::Encode(e.to_string()))?;
        writer
            .finalize()
            .map_err(|e| ForgeError::Encode(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

/// Write interleaved samples to a 24-bit PCM WAV file.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32, channels: u16) -> Result<()> {
    let spec = pcm24_spec(sample_rate, channels)?;
    let mut writer =
        WavWriter::create(path, spec).map_err(|e| ForgeError::Encode(e.to_string()))?;
    write_pcm24(&mut writer, samples).map_err(|e| ForgeError::Encode(e.to_string()))?;
    writer
        .finalize()
        .map_err(|e| ForgeError::Encode(e.to_string()))?;
    Ok(())
}

/// Decode a downloaded result into interleaved f32 samples.
///
/// RIFF/WAVE data goes through hound; anything else (the backend serves MP3)
/// is probed by symphonia.
pub fn decode(bytes: &[u8]) -> Result<DecodedAudio> {
    let audio = if bytes.starts_with(b"RIFF") {
        decode_wav(bytes)?
    } else {
        decode_compressed(bytes)?
    };
    if audio.channels == 0 || audio.frames() == 0 {
        return Err(ForgeError::Decode("no audio frames".into()));
    }
    Ok(audio)
}

fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let samples = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };
    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

fn decode_compressed(bytes: &[u8]) -> Result<DecodedAudio> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let mut hint = Hint::new();
    if bytes.starts_with(b"ID3") || bytes.first() == Some(&0xff) {
        hint.with_extension("mp3");
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ForgeError::Decode("no audio track".into()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt frame is skipped, not fatal.
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("skipping undecodable packet: {e}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count();
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels: channels as u16,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sine(frames: usize, channels: u16) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let v = (i as f32 * 0.05).sin() * 0.8;
                std::iter::repeat(v).take(channels as usize)
            })
            .collect()
    }

    #[test]
    fn test_encode_is_24_bit_pcm() {
        let bytes = encode_wav(&sine(100, 2), 44_100, 2).unwrap();
        let reader = WavReader::new(Cursor::new(&bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.bits_per_sample, 24);
        assert_eq!(spec.sample_format, SampleFormat::Int);
        assert_eq!(spec.channels, 2);
        assert_eq!(reader.duration(), 100);
    }

    #[test]
    fn test_wav_decode_preserves_format_and_values() {
        let input = sine(500, 2);
        let audio = decode(&encode_wav(&input, 48_000, 2).unwrap()).unwrap();
        assert_eq!(audio.sample_rate, 48_000);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.frames(), 500);
        for (a, b) in audio.samples.iter().zip(&input) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_float_wav_decodes() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for s in [0.25f32, -0.5, 1.0] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        let audio = decode(cursor.get_ref()).unwrap();
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.samples, vec![0.25, -0.5, 1.0]);
    }

    #[test]
    fn test_16_bit_wav_scales_to_unit_range() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(i16::MIN).unwrap();
            writer.write_sample(16_384i16).unwrap();
            writer.finalize().unwrap();
        }
        let audio = decode(cursor.get_ref()).unwrap();
        assert_abs_diff_eq!(audio.samples[0], -1.0);
        assert_abs_diff_eq!(audio.samples[1], 0.5);
    }

    #[test]
    fn test_out_of_range_samples_clamp() {
        let audio = decode(&encode_wav(&[2.0, -3.0], 44_100, 1).unwrap()).unwrap();
        assert_abs_diff_eq!(audio.samples[0], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(audio.samples[1], -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_wav_is_a_decode_error() {
        let bytes = encode_wav(&[], 44_100, 2).unwrap();
        assert!(matches!(decode(&bytes), Err(ForgeError::Decode(_))));
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let err = decode(b"definitely not audio").unwrap_err();
        assert!(err.to_string().starts_with("Failed to decode audio"));
    }

    #[test]
    fn test_zero_channels_rejected_on_encode() {
        assert!(matches!(
            encode_wav(&[0.0], 44_100, 0),
            Err(ForgeError::Encode(_))
        ));
    }

    #[test]
    fn test_write_wav_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        write_wav(&path, &sine(10, 2), 44_100, 2).unwrap();
        let audio = decode(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(audio.frames(), 10);
    }
}
