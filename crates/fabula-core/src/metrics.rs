//! Pipeline counters and latency tracking.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

const MAX_SAMPLES: usize = 1000;

/// Counters and rolling latency windows shared across jobs.
pub struct PipelineMetrics {
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    chunks_synthesized: AtomicU64,
    chunk_retries: AtomicU64,
    placeholders_inserted: AtomicU64,
    total_audio_duration_us: AtomicU64,
    job_latency_ms: RwLock<VecDeque<f64>>,
    synthesis_latency_ms: RwLock<VecDeque<f64>>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            chunks_synthesized: AtomicU64::new(0),
            chunk_retries: AtomicU64::new(0),
            placeholders_inserted: AtomicU64::new(0),
            total_audio_duration_us: AtomicU64::new(0),
            job_latency_ms: RwLock::new(VecDeque::new()),
            synthesis_latency_ms: RwLock::new(VecDeque::new()),
        }
    }

    pub async fn record_job(&self, latency: Duration, audio_duration: Duration, succeeded: bool) {
        if succeeded {
            self.jobs_completed.fetch_add(1, Ordering::Relaxed);
            self.total_audio_duration_us
                .fetch_add(audio_duration.as_micros() as u64, Ordering::Relaxed);
        } else {
            self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        }
        push_sample(&self.job_latency_ms, latency.as_secs_f64() * 1000.0).await;
    }

    pub async fn record_chunk(&self, latency: Duration, succeeded: bool) {
        if succeeded {
            self.chunks_synthesized.fetch_add(1, Ordering::Relaxed);
        }
        push_sample(&self.synthesis_latency_ms, latency.as_secs_f64() * 1000.0).await;
    }

    pub fn record_retry(&self) {
        self.chunk_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_placeholder(&self) {
        self.placeholders_inserted.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let job_latencies = self.job_latency_ms.read().await;
        let synthesis_latencies = self.synthesis_latency_ms.read().await;

        MetricsSnapshot {
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            chunks_synthesized: self.chunks_synthesized.load(Ordering::Relaxed),
            chunk_retries: self.chunk_retries.load(Ordering::Relaxed),
            placeholders_inserted: self.placeholders_inserted.load(Ordering::Relaxed),
            total_audio_secs: self.total_audio_duration_us.load(Ordering::Relaxed) as f64
                / 1_000_000.0,
            avg_job_latency_ms: compute_mean(&job_latencies),
            p50_job_latency_ms: compute_percentile(&job_latencies, 0.50),
            p90_job_latency_ms: compute_percentile(&job_latencies, 0.90),
            avg_synthesis_latency_ms: compute_mean(&synthesis_latencies),
            p90_synthesis_latency_ms: compute_percentile(&synthesis_latencies, 0.90),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

async fn push_sample(window: &RwLock<VecDeque<f64>>, value: f64) {
    let mut window = window.write().await;
    if window.len() >= MAX_SAMPLES {
        window.pop_front();
    }
    window.push_back(value);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub chunks_synthesized: u64,
    pub chunk_retries: u64,
    pub placeholders_inserted: u64,
    pub total_audio_secs: f64,
    pub avg_job_latency_ms: f64,
    pub p50_job_latency_ms: f64,
    pub p90_job_latency_ms: f64,
    pub avg_synthesis_latency_ms: f64,
    pub p90_synthesis_latency_ms: f64,
}

fn compute_mean(samples: &VecDeque<f64>) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

fn compute_percentile(samples: &VecDeque<f64>, percentile: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = samples.iter().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let index = ((percentile * sorted.len() as f64) as usize).min(sorted.len() - 1);
    sorted[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counters_show_up_in_the_snapshot() {
        let metrics = PipelineMetrics::new();

        metrics
            .record_job(Duration::from_millis(1200), Duration::from_secs(90), true)
            .await;
        metrics
            .record_job(Duration::from_millis(800), Duration::ZERO, false)
            .await;
        metrics.record_chunk(Duration::from_millis(250), true).await;
        metrics.record_chunk(Duration::from_millis(300), false).await;
        metrics.record_retry();
        metrics.record_placeholder();

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.jobs_completed, 1);
        assert_eq!(snapshot.jobs_failed, 1);
        assert_eq!(snapshot.chunks_synthesized, 1);
        assert_eq!(snapshot.chunk_retries, 1);
        assert_eq!(snapshot.placeholders_inserted, 1);
        assert!((snapshot.total_audio_secs - 90.0).abs() < 1e-9);
        assert!((snapshot.avg_job_latency_ms - 1000.0).abs() < 1e-9);
        assert!(snapshot.avg_synthesis_latency_ms > 0.0);
    }

    #[test]
    fn percentile_picks_from_the_sorted_window() {
        let samples: VecDeque<f64> = (1..=100).map(|i| i as f64).collect();
        assert_eq!(compute_percentile(&samples, 0.50), 51.0);
        assert_eq!(compute_percentile(&samples, 0.90), 91.0);
        assert_eq!(compute_percentile(&samples, 1.0), 100.0);
        assert_eq!(compute_percentile(&VecDeque::new(), 0.5), 0.0);
    }

    #[tokio::test]
    async fn latency_window_is_bounded() {
        let metrics = PipelineMetrics::new();
        for i in 0..(MAX_SAMPLES + 50) {
            metrics
                .record_chunk(Duration::from_millis(i as u64), true)
                .await;
        }
        let window = metrics.synthesis_latency_ms.read().await;
        assert_eq!(window.len(), MAX_SAMPLES);
    }
}
