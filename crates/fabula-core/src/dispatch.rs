//! Parallel chunk synthesis.
//!
//! Chunks are spawned as tasks behind a worker semaphore, retried on
//! transient errors, and collected back into source order. What happens to
//! a chunk that exhausts its retries depends on the failure policy: abort
//! the whole job, or keep going with silence in that slot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::audio::{AudioSegment, SynthAudio};
use crate::chunk::TextChunk;
use crate::config::{FailurePolicy, PipelineConfig};
use crate::error::{Error, Result};
use crate::metrics::PipelineMetrics;
use crate::provider::{SynthRequest, Synthesizer};
use crate::voice::VoiceReference;

pub struct ChunkDispatcher {
    workers: usize,
    max_attempts: u32,
    retry_backoff: Duration,
    failure_policy: FailurePolicy,
    placeholder_secs: f32,
    sample_rate: u32,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl ChunkDispatcher {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            max_attempts: config.chunk_retries + 1,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            failure_policy: config.failure_policy,
            placeholder_secs: config.placeholder_secs,
            sample_rate: config.sample_rate,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Synthesize every chunk and return segments in input order. Chunk
    /// indexes address result slots, so they must be dense and zero-based,
    /// which is what the chunker produces.
    pub async fn dispatch<P>(
        &self,
        provider: Arc<P>,
        chunks: &[TextChunk],
        voice: Arc<VoiceReference>,
    ) -> Result<Vec<AudioSegment>>
    where
        P: Synthesizer + 'static,
    {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks: JoinSet<(usize, Duration, Result<SynthAudio>)> = JoinSet::new();
        for chunk in chunks {
            let provider = Arc::clone(&provider);
            let voice = Arc::clone(&voice);
            let semaphore = Arc::clone(&semaphore);
            let metrics = self.metrics.clone();
            let text = chunk.text.clone();
            let index = chunk.index;
            let max_attempts = self.max_attempts;
            let backoff = self.retry_backoff;
            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            index,
                            Duration::ZERO,
                            Err(Error::Internal("Dispatcher semaphore closed".to_string())),
                        );
                    }
                };
                let started = Instant::now();
                let result = synthesize_with_retry(
                    provider.as_ref(),
                    &text,
                    voice,
                    max_attempts,
                    backoff,
                    metrics.as_deref(),
                )
                .await;
                (index, started.elapsed(), result)
            });
        }

        let mut slots: Vec<Option<Result<SynthAudio>>> = Vec::new();
        slots.resize_with(chunks.len(), || None);
        while let Some(joined) = tasks.join_next().await {
            let (index, elapsed, result) = joined
                .map_err(|e| Error::Internal(format!("Synthesis task panicked: {e}")))?;
            if let Some(metrics) = &self.metrics {
                metrics.record_chunk(elapsed, result.is_ok()).await;
            }
            match result {
                Ok(audio) => slots[index] = Some(Ok(audio)),
                Err(err) => {
                    if err.is_job_fatal() || self.failure_policy == FailurePolicy::Abort {
                        warn!(chunk = index, error = %err, "chunk synthesis failed, aborting job");
                        return Err(err);
                    }
                    warn!(chunk = index, error = %err, "chunk synthesis failed, will insert a placeholder");
                    slots[index] = Some(Err(err));
                }
            }
        }

        // Failed slots survive to this point only under the placeholder
        // policy; the abort policy returned above.
        let mut segments = Vec::with_capacity(slots.len());
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(Ok(audio)) => segments.push(AudioSegment::new(index, audio)),
                _ => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_placeholder();
                    }
                    segments.push(AudioSegment::silence(
                        index,
                        self.placeholder_secs,
                        self.sample_rate,
                    ));
                }
            }
        }
        Ok(segments)
    }
}

async fn synthesize_with_retry<P: Synthesizer>(
    provider: &P,
    text: &str,
    voice: Arc<VoiceReference>,
    max_attempts: u32,
    backoff: Duration,
    metrics: Option<&PipelineMetrics>,
) -> Result<SynthAudio> {
    let request = SynthRequest::new(text, voice);
    let mut last_err = None;
    for attempt in 1..=max_attempts {
        match provider.synthesize(&request).await {
            Ok(audio) => return Ok(audio),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                debug!(
                    request_id = %request.request_id,
                    attempt,
                    error = %err,
                    "synthesis attempt failed, retrying"
                );
                if let Some(metrics) = metrics {
                    metrics.record_retry();
                }
                tokio::time::sleep(backoff * attempt).await;
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or_else(|| Error::Synthesis("Synthesis failed".to_string())))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    struct ScriptedSynth {
        sample_rate: u32,
        delay: Duration,
        delays: Vec<Duration>,
        fail_indexes: Vec<usize>,
        fatal_indexes: Vec<usize>,
        flaky: Mutex<HashMap<usize, u32>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl ScriptedSynth {
        fn new(sample_rate: u32) -> Self {
            Self {
                sample_rate,
                delay: Duration::ZERO,
                delays: Vec::new(),
                fail_indexes: Vec::new(),
                fatal_indexes: Vec::new(),
                flaky: Mutex::new(HashMap::new()),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }
        }

        fn delay_for(&self, index: usize) -> Duration {
            self.delays.get(index).copied().unwrap_or(self.delay)
        }
    }

    impl Synthesizer for ScriptedSynth {
        async fn synthesize(&self, request: &SynthRequest) -> Result<SynthAudio> {
            let index: usize = request
                .text
                .rsplit(' ')
                .next()
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);

            let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(self.delay_for(index)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.fatal_indexes.contains(&index) {
                return Err(Error::ModelLoad("weights corrupted".to_string()));
            }
            if self.fail_indexes.contains(&index) {
                return Err(Error::Synthesis("scripted failure".to_string()));
            }
            {
                let mut flaky = self.flaky.lock().unwrap();
                if let Some(remaining) = flaky.get_mut(&index) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(Error::Network("scripted transient".to_string()));
                    }
                }
            }
            Ok(SynthAudio {
                samples: vec![index as f32 + 1.0],
                sample_rate: self.sample_rate,
            })
        }
    }

    fn test_chunks(count: usize) -> Vec<TextChunk> {
        (0..count)
            .map(|i| TextChunk {
                index: i,
                text: format!("chunk {i}"),
            })
            .collect()
    }

    fn test_voice() -> Arc<VoiceReference> {
        Arc::new(VoiceReference {
            path: "ref.wav".into(),
            bytes: Vec::new(),
            transcript: None,
            decoded: None,
        })
    }

    fn test_dispatcher(workers: usize, policy: FailurePolicy) -> ChunkDispatcher {
        ChunkDispatcher {
            workers,
            max_attempts: 1,
            retry_backoff: Duration::from_millis(1),
            failure_policy: policy,
            placeholder_secs: 1.0,
            sample_rate: 8000,
            metrics: None,
        }
    }

    #[tokio::test]
    async fn segments_come_back_in_input_order() {
        let mut synth = ScriptedSynth::new(8000);
        // Later chunks finish first.
        synth.delays = (0..8).map(|i| Duration::from_millis((8 - i) * 5)).collect();
        let dispatcher = test_dispatcher(4, FailurePolicy::Abort);

        let segments = dispatcher
            .dispatch(Arc::new(synth), &test_chunks(8), test_voice())
            .await
            .unwrap();

        assert_eq!(segments.len(), 8);
        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.index, i);
            assert_eq!(segment.samples[0], i as f32 + 1.0);
        }
    }

    #[tokio::test]
    async fn worker_bound_is_respected() {
        let mut synth = ScriptedSynth::new(8000);
        synth.delay = Duration::from_millis(10);
        let synth = Arc::new(synth);
        let dispatcher = test_dispatcher(3, FailurePolicy::Abort);

        dispatcher
            .dispatch(Arc::clone(&synth), &test_chunks(12), test_voice())
            .await
            .unwrap();

        let peak = synth.max_active.load(Ordering::SeqCst);
        assert!(peak <= 3, "saw {peak} concurrent synthesis calls");
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn placeholder_policy_fills_the_failed_slot() {
        let mut synth = ScriptedSynth::new(8000);
        synth.fail_indexes = vec![2];
        let dispatcher = test_dispatcher(4, FailurePolicy::Placeholder);

        let segments = dispatcher
            .dispatch(Arc::new(synth), &test_chunks(5), test_voice())
            .await
            .unwrap();

        assert_eq!(segments.len(), 5);
        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.placeholder, i == 2);
        }
        assert_eq!(segments[2].samples.len(), 8000);
        assert!(segments[2].samples.iter().all(|&s| s == 0.0));
    }

    #[tokio::test]
    async fn abort_policy_fails_the_dispatch() {
        let mut synth = ScriptedSynth::new(8000);
        synth.fail_indexes = vec![2];
        let dispatcher = test_dispatcher(4, FailurePolicy::Abort);

        let err = dispatcher
            .dispatch(Arc::new(synth), &test_chunks(5), test_voice())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Synthesis(_)));
    }

    #[tokio::test]
    async fn retry_budget_recovers_a_flaky_chunk() {
        let synth = ScriptedSynth::new(8000);
        synth.flaky.lock().unwrap().insert(1, 2);
        let mut dispatcher = test_dispatcher(2, FailurePolicy::Abort);
        dispatcher.max_attempts = 3;

        let segments = dispatcher
            .dispatch(Arc::new(synth), &test_chunks(3), test_voice())
            .await
            .unwrap();

        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].samples[0], 2.0);
        assert!(!segments[1].placeholder);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let synth = ScriptedSynth::new(8000);
        synth.flaky.lock().unwrap().insert(0, 5);
        let mut dispatcher = test_dispatcher(1, FailurePolicy::Abort);
        dispatcher.max_attempts = 2;

        let err = dispatcher
            .dispatch(Arc::new(synth), &test_chunks(1), test_voice())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[tokio::test]
    async fn fatal_error_aborts_even_under_placeholder_policy() {
        let mut synth = ScriptedSynth::new(8000);
        synth.fatal_indexes = vec![1];
        let dispatcher = test_dispatcher(4, FailurePolicy::Placeholder);

        let err = dispatcher
            .dispatch(Arc::new(synth), &test_chunks(4), test_voice())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ModelLoad(_)));
    }

    #[tokio::test]
    async fn empty_chunk_list_yields_no_segments() {
        let dispatcher = test_dispatcher(4, FailurePolicy::Abort);
        let segments = dispatcher
            .dispatch(Arc::new(ScriptedSynth::new(8000)), &[], test_voice())
            .await
            .unwrap();
        assert!(segments.is_empty());
    }
}
