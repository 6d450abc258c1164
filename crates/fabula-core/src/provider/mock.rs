//! Mock backend emitting a fixed tone, used when no real backend is
//! configured. Keeps the pipeline exercisable end to end without network
//! access or model weights.

use crate::audio::SynthAudio;
use crate::error::Result;
use crate::provider::{SynthRequest, Synthesizer};

const PLACEHOLDER_SECS: f32 = 0.4;

pub struct MockProvider {
    sample_rate: u32,
}

impl MockProvider {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl Synthesizer for MockProvider {
    async fn synthesize(&self, _request: &SynthRequest) -> Result<SynthAudio> {
        let total = (PLACEHOLDER_SECS * self.sample_rate as f32) as usize;
        let samples = (0..total)
            .map(|i| {
                let t = i as f32 / self.sample_rate as f32;
                (t * 220.0 * std::f32::consts::TAU).sin() * 0.1
            })
            .collect();
        Ok(SynthAudio {
            samples,
            sample_rate: self.sample_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::voice::VoiceReference;

    #[tokio::test]
    async fn mock_emits_fixed_duration_tone() {
        let voice = Arc::new(VoiceReference {
            path: "test.wav".into(),
            bytes: Vec::new(),
            transcript: None,
            decoded: None,
        });
        let provider = MockProvider::new(8000);
        let audio = provider
            .synthesize(&SynthRequest::new("any text", voice))
            .await
            .unwrap();
        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.samples.len(), 3200);
        assert!(audio.samples.iter().any(|&s| s != 0.0));
    }
}
