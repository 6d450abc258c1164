//! Joins synthesized segments into the final audiobook artifact.
//!
//! The in-memory path resamples everything to one rate, concatenates,
//! limits the peak, and encodes 16-bit WAV. A file-based path shells out to
//! ffmpeg's concat demuxer for segments that already live on disk.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use crate::audio::{self, processing, AudioSegment};
use crate::error::{Error, Result};

const TARGET_PEAK: f32 = 0.95;

pub struct AudioAssembler {
    target_sample_rate: u32,
}

impl AudioAssembler {
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    /// Concatenate segments in index order into one normalized sample
    /// buffer. An empty segment list cannot produce an artifact and fails.
    pub fn concat_samples(&self, segments: &[AudioSegment]) -> Result<Vec<f32>> {
        if segments.is_empty() {
            return Err(Error::Assembly("No audio segments to assemble".to_string()));
        }

        let total: usize = segments.iter().map(|s| s.samples.len()).sum();
        let mut combined = Vec::with_capacity(total);
        for segment in segments {
            if segment.sample_rate != self.target_sample_rate {
                combined.extend(processing::resample_linear(
                    &segment.samples,
                    segment.sample_rate,
                    self.target_sample_rate,
                ));
            } else {
                combined.extend_from_slice(&segment.samples);
            }
        }

        processing::clamp_samples(&mut combined);
        processing::peak_normalize(&mut combined, TARGET_PEAK);
        Ok(combined)
    }

    /// Full in-memory assembly: concatenate and encode WAV bytes.
    pub fn encode_artifact(&self, segments: &[AudioSegment]) -> Result<Vec<u8>> {
        let samples = self.concat_samples(segments)?;
        audio::encode_wav(&samples, self.target_sample_rate)
    }

    pub async fn write_artifact(
        &self,
        segments: &[AudioSegment],
        path: &Path,
    ) -> Result<()> {
        let bytes = self.encode_artifact(segments)?;
        tokio::fs::write(path, bytes).await.map_err(|e| {
            Error::Assembly(format!("Failed to write {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), "wrote audio artifact");
        Ok(())
    }

    /// Concatenate already-encoded segment files without re-encoding, via
    /// ffmpeg's concat demuxer.
    pub async fn concat_files(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        if inputs.is_empty() {
            return Err(Error::Assembly("No audio segments to assemble".to_string()));
        }
        let inputs = inputs.to_vec();
        let output = output.to_path_buf();
        tokio::task::spawn_blocking(move || run_ffmpeg_concat(&inputs, &output))
            .await
            .map_err(|e| Error::Internal(format!("Assembly task failed: {e}")))?
    }
}

fn run_ffmpeg_concat(inputs: &[PathBuf], output: &Path) -> Result<()> {
    let list_path = output.with_extension("txt");
    let mut list = String::new();
    for input in inputs {
        let escaped = input.display().to_string().replace('\'', "'\\''");
        list.push_str(&format!("file '{escaped}'\n"));
    }
    std::fs::write(&list_path, list).map_err(|e| {
        Error::Assembly(format!("Failed to write concat list: {e}"))
    })?;

    let result = Command::new("ffmpeg")
        .arg("-y")
        .arg("-f")
        .arg("concat")
        .arg("-safe")
        .arg("0")
        .arg("-i")
        .arg(&list_path)
        .arg("-c")
        .arg("copy")
        .arg(output)
        .output();
    let _ = std::fs::remove_file(&list_path);

    let output_result =
        result.map_err(|e| Error::Assembly(format!("Failed to launch ffmpeg: {e}")))?;
    if !output_result.status.success() {
        let stderr = String::from_utf8_lossy(&output_result.stderr);
        return Err(Error::Assembly(format!(
            "ffmpeg concat failed: {}",
            stderr.trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SynthAudio;

    fn segment(index: usize, value: f32, len: usize, rate: u32) -> AudioSegment {
        AudioSegment::new(
            index,
            SynthAudio {
                samples: vec![value; len],
                sample_rate: rate,
            },
        )
    }

    #[test]
    fn empty_segment_list_is_an_assembly_error() {
        let assembler = AudioAssembler::new(24_000);
        let err = assembler.concat_samples(&[]).unwrap_err();
        assert!(matches!(err, Error::Assembly(_)));
    }

    #[test]
    fn segments_concatenate_in_order() {
        let assembler = AudioAssembler::new(8000);
        let segments = vec![
            segment(0, 0.25, 100, 8000),
            segment(1, 0.5, 100, 8000),
        ];

        let combined = assembler.concat_samples(&segments).unwrap();
        assert_eq!(combined.len(), 200);
        // Peak normalization scales 0.5 up to 0.95 and 0.25 with it.
        assert!((combined[0] - 0.475).abs() < 1e-5);
        assert!((combined[150] - 0.95).abs() < 1e-5);
    }

    #[test]
    fn mismatched_rates_are_resampled() {
        let assembler = AudioAssembler::new(8000);
        let segments = vec![
            segment(0, 0.5, 1600, 16_000),
            segment(1, 0.5, 800, 8000),
        ];

        let combined = assembler.concat_samples(&segments).unwrap();
        assert_eq!(combined.len(), 1600);
    }

    #[test]
    fn clipped_input_is_limited() {
        let assembler = AudioAssembler::new(8000);
        let segments = vec![segment(0, 2.0, 50, 8000)];

        let combined = assembler.concat_samples(&segments).unwrap();
        for sample in combined {
            assert!(sample.abs() <= TARGET_PEAK + 1e-5);
        }
    }

    #[test]
    fn artifact_is_riff_encoded() {
        let assembler = AudioAssembler::new(8000);
        let bytes = assembler
            .encode_artifact(&[segment(0, 0.3, 400, 8000)])
            .unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
    }

    #[tokio::test]
    async fn artifact_writes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.wav");
        let assembler = AudioAssembler::new(8000);

        assembler
            .write_artifact(&[segment(0, 0.3, 400, 8000)], &path)
            .await
            .unwrap();
        let decoded = audio::decode_wav_bytes(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(decoded.samples.len(), 400);
    }

    #[tokio::test]
    async fn concat_files_rejects_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = AudioAssembler::new(8000);
        let err = assembler
            .concat_files(&[], &dir.path().join("out.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Assembly(_)));
    }
}
