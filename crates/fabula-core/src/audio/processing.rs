//! Sample-level DSP used by assembly and voice reference preparation.

use tracing::debug;

/// Remove the DC component so concatenated segments do not click.
pub fn remove_dc_offset(samples: &mut [f32]) {
    if samples.is_empty() {
        return;
    }
    let mean = samples.iter().sum::<f32>() / samples.len() as f32;
    if mean.abs() > 1e-6 {
        for sample in samples.iter_mut() {
            *sample -= mean;
        }
    }
}

/// Scale so the absolute peak lands on `target`. Near-silent input is left
/// untouched.
pub fn peak_normalize(samples: &mut [f32], target: f32) {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak > 1e-6 {
        let gain = target / peak;
        for sample in samples.iter_mut() {
            *sample *= gain;
        }
    }
}

/// Replace non-finite samples with silence and clamp the rest to [-1, 1].
pub fn clamp_samples(samples: &mut [f32]) {
    for sample in samples.iter_mut() {
        if sample.is_finite() {
            *sample = sample.clamp(-1.0, 1.0);
        } else {
            *sample = 0.0;
        }
    }
}

/// Linear-interpolation resampler. Good enough for speech; segments are
/// resampled at most once on their way into the final artifact.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() || from_rate == 0 || to_rate == 0 || from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64 / ratio).round() as usize).max(1);
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let left = (pos.floor() as usize).min(samples.len() - 1);
        let right = (left + 1).min(samples.len() - 1);
        let frac = (pos - left as f64) as f32;
        out.push(samples[left] * (1.0 - frac) + samples[right] * frac);
    }
    out
}

/// Condition a voice reference clip before it is handed to a synthesis
/// backend: scrub bad samples, strip DC, trim silence, cap the length to the
/// most energetic stretch, and level the gain. Returns an empty vector when
/// no audible speech remains.
pub fn clean_reference(samples: Vec<f32>, sample_rate: u32) -> Vec<f32> {
    let mut samples = samples;
    clamp_samples(&mut samples);
    remove_dc_offset(&mut samples);

    let initial_peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if initial_peak < 1e-5 {
        return Vec::new();
    }

    // Trim leading and trailing silence, keeping a short margin.
    let threshold = (initial_peak * 0.04).max(0.0025);
    let margin = (sample_rate as f32 * 0.12) as usize;
    let first = samples.iter().position(|s| s.abs() > threshold);
    let last = samples.iter().rposition(|s| s.abs() > threshold);
    if let (Some(first), Some(last)) = (first, last) {
        let start = first.saturating_sub(margin);
        let end = (last + margin + 1).min(samples.len());
        samples = samples[start..end].to_vec();
    } else {
        return Vec::new();
    }

    // Long clips degrade cloning quality; keep the strongest stretch.
    let max_len = sample_rate as usize * 12;
    if samples.len() > max_len {
        let window = sample_rate as usize * 6;
        let start = highest_energy_window_start(&samples, window);
        let start = start.min(samples.len() - max_len);
        samples = samples[start..start + max_len].to_vec();
    }

    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak > 0.95 {
        let gain = 0.95 / peak;
        for sample in samples.iter_mut() {
            *sample *= gain;
        }
    }

    let rms = (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt();
    if rms > 1e-6 && rms < 0.035 {
        let gain = (0.05 / rms).min(6.0);
        for sample in samples.iter_mut() {
            *sample = (*sample * gain).clamp(-0.95, 0.95);
        }
    }

    debug!(
        samples = samples.len(),
        secs = samples.len() as f32 / sample_rate as f32,
        "prepared voice reference"
    );
    samples
}

/// Start of the window with the highest total energy, via prefix sums.
fn highest_energy_window_start(samples: &[f32], window: usize) -> usize {
    if window == 0 || samples.len() <= window {
        return 0;
    }

    let mut prefix = Vec::with_capacity(samples.len() + 1);
    prefix.push(0.0f64);
    for sample in samples {
        let last = *prefix.last().unwrap_or(&0.0);
        prefix.push(last + (*sample as f64) * (*sample as f64));
    }

    let mut best_start = 0;
    let mut best_energy = f64::MIN;
    for start in 0..=samples.len() - window {
        let energy = prefix[start + window] - prefix[start];
        if energy > best_energy {
            best_energy = energy;
            best_start = start;
        }
    }
    best_start
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dc_offset_is_removed() {
        let mut samples: Vec<f32> = (0..1000)
            .map(|i| 0.3 + (i as f32 * 0.1).sin() * 0.2)
            .collect();
        remove_dc_offset(&mut samples);
        let mean = samples.iter().sum::<f32>() / samples.len() as f32;
        assert!(mean.abs() < 1e-4);
    }

    #[test]
    fn resample_halves_length_when_rate_halves() {
        let samples = vec![0.5f32; 4800];
        let out = resample_linear(&samples, 48_000, 24_000);
        assert_eq!(out.len(), 2400);
    }

    #[test]
    fn resample_same_rate_is_identity() {
        let samples = vec![0.1f32, -0.2, 0.3];
        assert_eq!(resample_linear(&samples, 24_000, 24_000), samples);
    }

    #[test]
    fn peak_normalize_hits_target() {
        let mut samples = vec![0.1f32, -0.4, 0.2];
        peak_normalize(&mut samples, 0.95);
        let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!((peak - 0.95).abs() < 1e-5);
    }

    #[test]
    fn clean_reference_trims_leading_silence() {
        let rate = 8000u32;
        let mut samples = vec![0.0f32; rate as usize * 2];
        samples.extend((0..rate as usize).map(|i| (i as f32 * 0.3).sin() * 0.5));
        let before = samples.len();

        let cleaned = clean_reference(samples, rate);
        assert!(!cleaned.is_empty());
        assert!(cleaned.len() < before);
        // Roughly one second of speech plus the margins.
        assert!(cleaned.len() < rate as usize * 2);
    }

    #[test]
    fn clean_reference_caps_length() {
        let rate = 8000u32;
        let samples: Vec<f32> = (0..rate as usize * 20)
            .map(|i| (i as f32 * 0.3).sin() * 0.5)
            .collect();
        let cleaned = clean_reference(samples, rate);
        assert!(cleaned.len() <= rate as usize * 12);
    }

    #[test]
    fn silent_reference_cleans_to_empty() {
        let cleaned = clean_reference(vec![0.0f32; 16_000], 8000);
        assert!(cleaned.is_empty());
    }

    #[test]
    fn quiet_reference_is_gained_up() {
        let rate = 8000u32;
        let samples: Vec<f32> = (0..rate as usize * 2)
            .map(|i| (i as f32 * 0.3).sin() * 0.01)
            .collect();
        let cleaned = clean_reference(samples, rate);
        let rms =
            (cleaned.iter().map(|s| s * s).sum::<f32>() / cleaned.len() as f32).sqrt();
        assert!(rms > 0.02);
    }

    #[test]
    fn energy_window_finds_loud_section() {
        let mut samples = vec![0.01f32; 1000];
        for sample in samples[600..800].iter_mut() {
            *sample = 0.8;
        }
        let start = highest_energy_window_start(&samples, 200);
        assert!((550..=650).contains(&start));
    }
}
