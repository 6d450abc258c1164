//! The audiobook pipeline: accepts jobs, runs them in the background, and
//! reports lifecycle state through the job store.
//!
//! A job moves through extract, voice load, chunk, parallel synthesis,
//! assembly, and storage. The submitting request returns as soon as the
//! record exists; everything else happens in a supervised task with a hard
//! per-job timeout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::assemble::AudioAssembler;
use crate::audio;
use crate::chunk::TextChunker;
use crate::config::PipelineConfig;
use crate::dispatch::ChunkDispatcher;
use crate::error::{Error, Result};
use crate::extract;
use crate::job::{progress, JobRecord, JobStatus, JobStore};
use crate::metrics::PipelineMetrics;
use crate::provider::{ProviderKind, SynthProvider};
use crate::storage::ArtifactStorage;
use crate::voice::VoiceReference;

/// What a caller hands the pipeline: paths to an uploaded document and
/// voice sample, plus an optional transcript of the sample.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub document_path: PathBuf,
    pub voice_path: PathBuf,
    pub voice_transcript: Option<String>,
}

pub struct AudiobookPipeline {
    config: PipelineConfig,
    provider: Arc<SynthProvider>,
    store: Arc<JobStore>,
    storage: ArtifactStorage,
    dispatcher: ChunkDispatcher,
    assembler: AudioAssembler,
    chunker: TextChunker,
    metrics: Arc<PipelineMetrics>,
    job_slots: Arc<Semaphore>,
}

impl AudiobookPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.ensure_dirs()?;
        let provider = Arc::new(SynthProvider::from_config(
            &config.provider,
            config.sample_rate,
        )?);
        let store = Arc::new(JobStore::open(&config.jobs_dir())?);
        let storage = ArtifactStorage::from_config(&config);
        let metrics = Arc::new(PipelineMetrics::new());
        let dispatcher =
            ChunkDispatcher::from_config(&config).with_metrics(Arc::clone(&metrics));
        let assembler = AudioAssembler::new(config.sample_rate);
        let chunker = TextChunker::new(config.max_chunk_chars);
        let job_slots = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));

        Ok(Self {
            config,
            provider,
            store,
            storage,
            dispatcher,
            assembler,
            chunker,
            metrics,
            job_slots,
        })
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Accept a job. The record comes back queued; the work happens in a
    /// background task that polling clients observe through the store.
    pub async fn submit(self: Arc<Self>, request: JobRequest) -> Result<JobRecord> {
        self.validate_request(&request)?;
        let record = self.store.create().await?;
        let job_id = record.id.clone();
        info!(
            job = %job_id,
            document = %request.document_path.display(),
            "job accepted"
        );
        tokio::spawn(self.supervise(job_id, request));
        Ok(record)
    }

    async fn supervise(self: Arc<Self>, job_id: String, request: JobRequest) {
        let permit = match Arc::clone(&self.job_slots).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.record_failure(&job_id, "Server is shutting down").await;
                return;
            }
        };

        let started = Instant::now();
        let job_timeout = Duration::from_secs(self.config.job_timeout_secs);
        let runner = Arc::clone(&self);
        let inner_id = job_id.clone();
        let mut task =
            tokio::spawn(async move { runner.run_job(&inner_id, request).await });

        let result = match tokio::time::timeout(job_timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                Err(Error::Internal(format!("Job task panicked: {join_err}")))
            }
            Err(_) => {
                task.abort();
                Err(Error::JobTimeout(self.config.job_timeout_secs))
            }
        };
        drop(permit);

        match result {
            Ok(audio_duration) => {
                self.metrics
                    .record_job(started.elapsed(), audio_duration, true)
                    .await;
                info!(
                    job = %job_id,
                    secs = started.elapsed().as_secs_f64(),
                    audio_secs = audio_duration.as_secs_f64(),
                    "job completed"
                );
            }
            Err(err) => {
                warn!(job = %job_id, error = %err, "job failed");
                self.record_failure(&job_id, &err.to_string()).await;
                self.metrics
                    .record_job(started.elapsed(), Duration::ZERO, false)
                    .await;
            }
        }
    }

    async fn run_job(&self, job_id: &str, request: JobRequest) -> Result<Duration> {
        self.store.transition(job_id, JobStatus::Processing).await?;
        self.store.set_progress(job_id, progress::STARTED).await?;

        let text = extract::extract_text(&request.document_path).await?;
        self.store
            .set_progress(job_id, progress::TEXT_EXTRACTED)
            .await?;

        let voice_path = request.voice_path.clone();
        let transcript = request.voice_transcript.clone();
        let voice =
            tokio::task::spawn_blocking(move || VoiceReference::resolve(&voice_path, transcript))
                .await
                .map_err(|e| Error::Internal(format!("Voice load task failed: {e}")))??;
        let voice = Arc::new(voice);
        self.store.set_progress(job_id, progress::VOICE_READY).await?;

        let chunks = self.chunker.chunk(&text);
        if chunks.is_empty() {
            return Err(Error::Extraction(
                "Document produced no synthesizable text".to_string(),
            ));
        }
        info!(
            job = %job_id,
            chars = text.chars().count(),
            chunks = chunks.len(),
            "document chunked"
        );
        self.store.set_progress(job_id, progress::CHUNKED).await?;

        self.store
            .set_progress(job_id, progress::SYNTHESIS_STARTED)
            .await?;
        let segments = self
            .dispatcher
            .dispatch(Arc::clone(&self.provider), &chunks, voice)
            .await?;
        self.store
            .set_progress(job_id, progress::SYNTHESIS_DONE)
            .await?;

        let samples = self.assembler.concat_samples(&segments)?;
        let audio_duration =
            Duration::from_secs_f64(samples.len() as f64 / self.config.sample_rate as f64);
        let bytes = audio::encode_wav(&samples, self.config.sample_rate)?;
        self.store.set_progress(job_id, progress::ASSEMBLED).await?;

        let audio_url = self.storage.store(&format!("{job_id}.wav"), &bytes).await?;
        self.store.complete(job_id, audio_url).await?;
        Ok(audio_duration)
    }

    async fn record_failure(&self, job_id: &str, message: &str) {
        if let Err(err) = self.store.fail(job_id, message).await {
            warn!(job = %job_id, error = %err, "failed to record job failure");
        }
    }

    fn validate_request(&self, request: &JobRequest) -> Result<()> {
        if !request.document_path.exists() {
            return Err(Error::InvalidInput(format!(
                "Document not found: {}",
                request.document_path.display()
            )));
        }
        if !request.voice_path.exists() {
            return Err(Error::InvalidInput(format!(
                "Voice sample not found: {}",
                request.voice_path.display()
            )));
        }
        Ok(())
    }
}
