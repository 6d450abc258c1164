//! Voice reference loading and validation.

use std::path::{Path, PathBuf};

use crate::audio::{self, processing, SynthAudio};
use crate::config;
use crate::error::{Error, Result};

/// A speaker reference clip, loaded once per job and shared across all
/// synthesis requests for that job.
#[derive(Debug, Clone)]
pub struct VoiceReference {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub transcript: Option<String>,
    /// Present only for formats this crate can decode itself. Compressed
    /// formats are forwarded to the backend as raw bytes.
    pub decoded: Option<SynthAudio>,
}

impl VoiceReference {
    /// Read and validate a reference clip. WAV input is decoded and
    /// conditioned here; other supported formats stay as raw bytes.
    pub fn resolve(path: &Path, transcript: Option<String>) -> Result<Self> {
        if !path.exists() {
            return Err(Error::VoiceReference(format!(
                "Voice sample not found: {}",
                path.display()
            )));
        }

        let extension = extension_of(path)?;
        if !config::VOICE_EXTENSIONS.contains(&extension.as_str()) {
            return Err(Error::InvalidInput(format!(
                "Unsupported voice format '{extension}', expected one of: {}",
                config::VOICE_EXTENSIONS.join(", ")
            )));
        }

        let bytes = std::fs::read(path).map_err(|e| {
            Error::VoiceReference(format!("Failed to read {}: {e}", path.display()))
        })?;
        if bytes.is_empty() {
            return Err(Error::VoiceReference(format!(
                "Voice sample is empty: {}",
                path.display()
            )));
        }

        let decoded = if extension == "wav" {
            let raw = audio::decode_wav_bytes(&bytes)?;
            let cleaned = processing::clean_reference(raw.samples, raw.sample_rate);
            if cleaned.is_empty() {
                return Err(Error::VoiceReference(format!(
                    "Voice sample contains no audible speech: {}",
                    path.display()
                )));
            }
            Some(SynthAudio {
                samples: cleaned,
                sample_rate: raw.sample_rate,
            })
        } else {
            None
        };

        Ok(Self {
            path: path.to_path_buf(),
            bytes,
            transcript,
            decoded,
        })
    }

    /// Decoded PCM, for backends that consume samples rather than bytes.
    pub fn pcm(&self) -> Result<&SynthAudio> {
        self.decoded.as_ref().ok_or_else(|| {
            Error::UnsupportedAudio(format!(
                "Reference format '{}' is not decodable in-process, provide WAV",
                self.extension()
            ))
        })
    }

    pub fn extension(&self) -> String {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default()
    }
}

fn extension_of(path: &Path) -> Result<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "Voice sample has no file extension: {}",
                path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_wav(path: &Path, secs: f32, rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let total = (secs * rate as f32) as usize;
        for i in 0..total {
            let t = i as f32 / rate as f32;
            let value = (t * 440.0 * std::f32::consts::TAU).sin() * 0.5;
            writer.write_sample((value * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn missing_file_is_a_voice_reference_error() {
        let err = VoiceReference::resolve(Path::new("/nonexistent/ref.wav"), None).unwrap_err();
        assert!(matches!(err, Error::VoiceReference(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.flac");
        std::fs::write(&path, b"junk").unwrap();

        let err = VoiceReference::resolve(&path, None).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn wav_reference_is_decoded_and_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speaker.wav");
        write_test_wav(&path, 1.0, 8000);

        let voice = VoiceReference::resolve(&path, Some("hello".into())).unwrap();
        let pcm = voice.pcm().unwrap();
        assert_eq!(pcm.sample_rate, 8000);
        assert!(!pcm.samples.is_empty());
        assert_eq!(voice.transcript.as_deref(), Some("hello"));
    }

    #[test]
    fn non_wav_keeps_raw_bytes_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp3");
        std::fs::write(&path, vec![1u8; 64]).unwrap();

        let voice = VoiceReference::resolve(&path, None).unwrap();
        assert!(voice.decoded.is_none());
        assert_eq!(voice.bytes.len(), 64);
        assert!(matches!(voice.pcm(), Err(Error::UnsupportedAudio(_))));
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        std::fs::write(&path, b"").unwrap();

        let err = VoiceReference::resolve(&path, None).unwrap_err();
        assert!(matches!(err, Error::VoiceReference(_)));
    }
}
