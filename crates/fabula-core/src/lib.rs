//! Core engine for converting documents into voice-cloned audiobooks.
//!
//! A job flows through text extraction, sentence-aware chunking, parallel
//! chunk synthesis against a pluggable backend, audio assembly, and
//! artifact storage, with lifecycle state persisted for polling clients.

pub mod assemble;
pub mod audio;
pub mod chunk;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod job;
pub mod metrics;
pub mod provider;
pub mod storage;
pub mod voice;

pub use assemble::AudioAssembler;
pub use audio::{AudioSegment, SynthAudio};
pub use chunk::{TextChunk, TextChunker};
pub use config::{FailurePolicy, PipelineConfig, ServerConfig};
pub use dispatch::ChunkDispatcher;
pub use error::{Error, Result};
pub use job::{AudiobookPipeline, JobRecord, JobRequest, JobStatus, JobStore};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use provider::{ProviderKind, SynthProvider, SynthRequest, Synthesizer};
pub use storage::ArtifactStorage;
pub use voice::VoiceReference;
