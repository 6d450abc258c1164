//! In-process synthesis backend.
//!
//! Loads a small manifest-described model from disk and renders speech-like
//! audio deterministically on the blocking pool. Rendering follows the
//! decoded voice reference for loudness so output levels track the speaker
//! clip.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::audio::SynthAudio;
use crate::config::LocalProviderConfig;
use crate::error::{Error, Result};
use crate::provider::{SynthRequest, Synthesizer};

const MANIFEST_NAME: &str = "model.json";

#[derive(Debug, Clone, Deserialize)]
pub struct LocalModelConfig {
    pub sample_rate: u32,
    #[serde(default = "default_base_pitch")]
    pub base_pitch_hz: f32,
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: f32,
}

fn default_base_pitch() -> f32 {
    160.0
}

fn default_words_per_minute() -> f32 {
    150.0
}

#[derive(Debug)]
pub struct LocalModel {
    config: LocalModelConfig,
}

impl LocalModel {
    /// Load a model directory. The directory must contain a `model.json`
    /// manifest; a missing or broken manifest is a fatal model error.
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest = dir.join(MANIFEST_NAME);
        let raw = std::fs::read_to_string(&manifest).map_err(|e| {
            Error::ModelLoad(format!("Failed to read {}: {e}", manifest.display()))
        })?;
        let config: LocalModelConfig = serde_json::from_str(&raw).map_err(|e| {
            Error::ModelLoad(format!("Invalid manifest {}: {e}", manifest.display()))
        })?;
        if config.sample_rate == 0 {
            return Err(Error::ModelLoad(format!(
                "Manifest {} declares a zero sample rate",
                manifest.display()
            )));
        }
        info!(
            dir = %dir.display(),
            sample_rate = config.sample_rate,
            "loaded local synthesis model"
        );
        Ok(Self { config })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Render text deterministically: one enveloped tone per word, pitch
    /// varied by a word hash, pauses stretched after sentence terminators.
    pub fn render(&self, text: &str, reference_rms: Option<f32>) -> Vec<f32> {
        let rate = self.config.sample_rate as f32;
        let amplitude = reference_rms
            .map(|rms| (rms * 2.0).clamp(0.05, 0.6))
            .unwrap_or(0.3);
        let word_secs = 60.0 / self.config.words_per_minute.max(40.0);
        let gap_len = (rate * 0.06) as usize;

        let mut samples = Vec::new();
        for word in text.split_whitespace() {
            let pitch =
                self.config.base_pitch_hz * (1.0 + (word_seed(word) % 7) as f32 * 0.04);
            let scale = 0.5 + (word.chars().count() as f32 / 12.0).min(1.0);
            let word_len = (rate * word_secs * scale) as usize;
            for i in 0..word_len {
                let t = i as f32 / rate;
                let envelope =
                    (std::f32::consts::PI * i as f32 / word_len.max(1) as f32).sin();
                samples.push(
                    (t * pitch * std::f32::consts::TAU).sin() * envelope * amplitude,
                );
            }

            let pause = if word.ends_with(['.', '!', '?']) {
                gap_len * 4
            } else {
                gap_len
            };
            samples.extend(std::iter::repeat(0.0).take(pause));
        }
        samples
    }
}

fn word_seed(word: &str) -> u32 {
    word.bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32))
}

pub struct LocalProvider {
    model: Arc<LocalModel>,
}

impl LocalProvider {
    pub fn load(config: &LocalProviderConfig) -> Result<Self> {
        let dir = config.model_dir.as_ref().ok_or_else(|| {
            Error::Config("Local provider selected but no model directory set".to_string())
        })?;
        let model = LocalModel::load(dir)?;
        Ok(Self {
            model: Arc::new(model),
        })
    }
}

impl Synthesizer for LocalProvider {
    async fn synthesize(&self, request: &SynthRequest) -> Result<SynthAudio> {
        let pcm = request.voice.pcm()?;
        let rms = if pcm.samples.is_empty() {
            None
        } else {
            Some(
                (pcm.samples.iter().map(|s| s * s).sum::<f32>()
                    / pcm.samples.len() as f32)
                    .sqrt(),
            )
        };

        let model = Arc::clone(&self.model);
        let text = request.text.clone();
        let samples = tokio::task::spawn_blocking(move || model.render(&text, rms))
            .await
            .map_err(|e| Error::Internal(format!("Render task failed: {e}")))?;

        Ok(SynthAudio {
            samples,
            sample_rate: self.model.sample_rate(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::VoiceReference;

    fn write_manifest(dir: &Path, body: &str) {
        std::fs::write(dir.join(MANIFEST_NAME), body).unwrap();
    }

    #[test]
    fn load_requires_a_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalModel::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ModelLoad(_)));
    }

    #[test]
    fn invalid_manifest_is_a_model_load_error() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "{\"sample_rate\": \"not a number\"}");
        let err = LocalModel::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ModelLoad(_)));
    }

    #[test]
    fn render_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "{\"sample_rate\": 8000}");
        let model = LocalModel::load(dir.path()).unwrap();

        let first = model.render("One sentence. Two words", Some(0.1));
        let second = model.render("One sentence. Two words", Some(0.1));
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn provider_renders_from_decoded_reference() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "{\"sample_rate\": 8000}");
        let config = LocalProviderConfig {
            model_dir: Some(dir.path().to_path_buf()),
        };
        let provider = LocalProvider::load(&config).unwrap();

        let voice = Arc::new(VoiceReference {
            path: "speaker.wav".into(),
            bytes: Vec::new(),
            transcript: None,
            decoded: Some(SynthAudio {
                samples: vec![0.2; 4000],
                sample_rate: 8000,
            }),
        });
        let audio = provider
            .synthesize(&SynthRequest::new("hello there", voice))
            .await
            .unwrap();
        assert_eq!(audio.sample_rate, 8000);
        assert!(!audio.samples.is_empty());
    }

    #[tokio::test]
    async fn provider_rejects_undecoded_reference() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "{\"sample_rate\": 8000}");
        let config = LocalProviderConfig {
            model_dir: Some(dir.path().to_path_buf()),
        };
        let provider = LocalProvider::load(&config).unwrap();

        let voice = Arc::new(VoiceReference {
            path: "speaker.mp3".into(),
            bytes: vec![1, 2, 3],
            transcript: None,
            decoded: None,
        });
        let err = provider
            .synthesize(&SynthRequest::new("hello", voice))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedAudio(_)));
    }
}
