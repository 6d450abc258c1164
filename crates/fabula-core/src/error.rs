//! Error types for the conversion pipeline.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline error taxonomy. Chunk-level synthesis errors are retryable;
/// extraction, model-load, and assembly errors fail the whole job.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Text extraction failed: {0}")]
    Extraction(String),

    #[error("Voice reference error: {0}")]
    VoiceReference(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("Synthesis timed out after {0:?}")]
    SynthesisTimeout(Duration),

    #[error("Unsupported audio: {0}")]
    UnsupportedAudio(String),

    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Audio assembly failed: {0}")]
    Assembly(String),

    #[error("Storage upload failed: {0}")]
    Storage(String),

    #[error("Job store error: {0}")]
    JobStore(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job timed out after {0}s")]
    JobTimeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether another chunk-level attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_)
                | Error::Synthesis(_)
                | Error::SynthesisTimeout(_)
                | Error::UnsupportedAudio(_)
                | Error::VoiceReference(_)
                | Error::Storage(_)
        )
    }

    /// Errors that abort the job regardless of the dispatcher failure policy.
    pub fn is_job_fatal(&self) -> bool {
        matches!(
            self,
            Error::ModelLoad(_) | Error::Extraction(_) | Error::Assembly(_) | Error::JobTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesis_errors_are_retryable() {
        assert!(Error::Synthesis("remote failure".to_string()).is_retryable());
        assert!(Error::Network("connection reset".to_string()).is_retryable());
        assert!(Error::SynthesisTimeout(Duration::from_secs(300)).is_retryable());
    }

    #[test]
    fn model_load_is_fatal_not_retryable() {
        let err = Error::ModelLoad("missing weights".to_string());
        assert!(err.is_job_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn storage_failure_message_names_storage() {
        let err = Error::Storage("upload rejected".to_string());
        assert!(err.to_string().contains("Storage upload failed"));
    }
}
