//! PCM containers and WAV codec helpers.

pub mod processing;

use std::io::Cursor;

use crate::error::{Error, Result};

/// Mono PCM produced by a synthesis backend.
#[derive(Debug, Clone, Default)]
pub struct SynthAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SynthAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// One synthesized chunk, tagged with its position in the source text.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub index: usize,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub placeholder: bool,
}

impl AudioSegment {
    pub fn new(index: usize, audio: SynthAudio) -> Self {
        Self {
            index,
            samples: audio.samples,
            sample_rate: audio.sample_rate,
            placeholder: false,
        }
    }

    /// Silent stand-in for a chunk that failed to synthesize.
    pub fn silence(index: usize, secs: f32, sample_rate: u32) -> Self {
        let len = (secs.max(0.0) * sample_rate as f32) as usize;
        Self {
            index,
            samples: vec![0.0; len],
            sample_rate,
            placeholder: true,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode a WAV file into mono f32 samples. Multi-channel input is downmixed
/// by averaging across channels.
pub fn decode_wav_bytes(bytes: &[u8]) -> Result<SynthAudio> {
    let cursor = Cursor::new(bytes);
    let mut reader = hound::WavReader::new(cursor)
        .map_err(|e| Error::UnsupportedAudio(format!("Failed to parse WAV: {e}")))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = if spec.bits_per_sample > 1 {
                ((1i64 << (spec.bits_per_sample - 1)) - 1) as f32
            } else {
                1.0
            };
            reader
                .samples::<i32>()
                .filter_map(|s| s.ok())
                .map(|s| (s as f32 / max_val).clamp(-1.0, 1.0))
                .collect()
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .filter_map(|s| s.ok())
            .collect(),
    };

    let channels = spec.channels.max(1) as usize;
    let mono: Vec<f32> = if channels > 1 {
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    } else {
        samples
    };

    let cleaned = mono
        .into_iter()
        .map(|s| if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 })
        .collect();

    Ok(SynthAudio {
        samples: cleaned,
        sample_rate: spec.sample_rate,
    })
}

/// Encode mono f32 samples as a 16-bit PCM WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::Assembly(format!("Failed to start WAV writer: {e}")))?;
        for &sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(value)
                .map_err(|e| Error::Assembly(format!("Failed to write WAV sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| Error::Assembly(format!("Failed to finalize WAV: {e}")))?;
    }

    Ok(cursor.into_inner())
}
