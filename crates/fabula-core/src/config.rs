//! Configuration types for the conversion pipeline and HTTP server.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

use crate::error::{Error, Result};

/// Document containers accepted for conversion.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

/// Voice sample containers accepted as cloning prompts.
pub const VOICE_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a", "ogg"];

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory for uploads, artifacts, and job records
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Concurrent chunk synthesis workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum characters per text chunk
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Retries per chunk after the first attempt
    #[serde(default = "default_chunk_retries")]
    pub chunk_retries: u32,

    /// Base backoff between chunk attempts (milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// What to do when a chunk exhausts its retry budget
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Silence substituted for a lost chunk (seconds)
    #[serde(default = "default_placeholder_secs")]
    pub placeholder_secs: f32,

    /// Target sample rate of the assembled artifact
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Wall-clock cap per job (seconds)
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Number of jobs allowed to run at once
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            workers: default_workers(),
            max_chunk_chars: default_max_chunk_chars(),
            chunk_retries: default_chunk_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            failure_policy: FailurePolicy::default(),
            placeholder_secs: default_placeholder_secs(),
            sample_rate: default_sample_rate(),
            job_timeout_secs: default_job_timeout_secs(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            provider: ProviderConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Build configuration from environment overrides on top of defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(kind) = env_string("FABULA_PROVIDER") {
            config.provider.kind = Some(kind);
        }
        if let Some(endpoint) = env_string("FABULA_TTS_ENDPOINT") {
            config.provider.remote.endpoint = Some(endpoint);
        }
        if let Some(token) = env_string("FABULA_TTS_API_TOKEN") {
            config.provider.remote.api_token = Some(token);
        }
        if let Some(dir) = env_string("FABULA_MODEL_DIR") {
            config.provider.local.model_dir = Some(PathBuf::from(dir));
        }
        if let Some(endpoint) = env_string("FABULA_STORAGE_ENDPOINT") {
            config.storage.endpoint = Some(endpoint);
        }
        if let Some(key) = env_string("FABULA_STORAGE_ACCESS_KEY") {
            config.storage.access_key = Some(key);
        }
        if let Some(url) = env_string("FABULA_STORAGE_PUBLIC_URL") {
            config.storage.public_base_url = Some(url);
        }
        if let Some(raw) = env_string("FABULA_WORKERS") {
            match raw.parse::<usize>() {
                Ok(parsed) if parsed > 0 => config.workers = parsed,
                _ => warn!("Invalid FABULA_WORKERS='{}', keeping {}", raw, config.workers),
            }
        }
        if let Some(raw) = env_string("FABULA_FAILURE_POLICY") {
            match raw.parse::<FailurePolicy>() {
                Ok(policy) => config.failure_policy = policy,
                Err(_) => warn!(
                    "Invalid FABULA_FAILURE_POLICY='{}', keeping {}",
                    raw, config.failure_policy
                ),
            }
        }

        config
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir.join("artifacts")
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.data_dir.join("jobs")
    }

    /// Create the working directories under the data dir.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.uploads_dir(), self.artifacts_dir(), self.jobs_dir()] {
            std::fs::create_dir_all(&dir)
                .map_err(|e| Error::Config(format!("Failed to create {}: {}", dir.display(), e)))?;
        }
        Ok(())
    }
}

/// What the dispatcher does when a chunk irrecoverably fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Fail the whole job; no partial artifact is persisted.
    #[default]
    Abort,
    /// Substitute fixed-duration silence for the lost chunk and keep going.
    Placeholder,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Abort => "abort",
            FailurePolicy::Placeholder => "placeholder",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        match normalize_identifier(input).as_str() {
            "abort" | "fail" | "strict" => Ok(FailurePolicy::Abort),
            "placeholder" | "continue" | "skip" => Ok(FailurePolicy::Placeholder),
            _ => Err(Error::Config(format!("Unknown failure policy: {}", input))),
        }
    }
}

/// Synthesis backend selection and per-backend settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Explicit backend kind; inferred from the sections below when unset
    #[serde(default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub remote: RemoteProviderConfig,

    #[serde(default)]
    pub local: LocalProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteProviderConfig {
    /// Base URL of the prediction service
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer token sent with every request
    #[serde(default)]
    pub api_token: Option<String>,

    /// Base poll interval (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum total wait per prediction (seconds)
    #[serde(default = "default_max_poll_secs")]
    pub max_poll_secs: u64,

    /// Per-request HTTP timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for RemoteProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_token: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_secs: default_max_poll_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalProviderConfig {
    /// Directory holding the model manifest and assets
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
}

/// Object storage for finished artifacts. Without an endpoint the pipeline
/// persists artifacts under the data dir instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub access_key: Option<String>,

    /// Public base URL returned to clients; defaults to the endpoint
    #[serde(default)]
    pub public_base_url: Option<String>,

    #[serde(default = "default_upload_retries")]
    pub upload_retries: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            access_key: None,
            public_base_url: None,
            upload_retries: default_upload_retries(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_enabled")]
    pub cors_enabled: bool,

    /// Largest accepted document upload (megabytes)
    #[serde(default = "default_max_document_mb")]
    pub max_document_mb: usize,

    /// Largest accepted voice sample upload (megabytes)
    #[serde(default = "default_max_voice_mb")]
    pub max_voice_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: default_cors_enabled(),
            max_document_mb: default_max_document_mb(),
            max_voice_mb: default_max_voice_mb(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    if let Ok(from_env) = std::env::var("FABULA_DATA_DIR") {
        let trimmed = from_env.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fabula")
}

fn default_workers() -> usize {
    4
}

fn default_max_chunk_chars() -> usize {
    800
}

fn default_chunk_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_placeholder_secs() -> f32 {
    1.0
}

fn default_sample_rate() -> u32 {
    24_000
}

fn default_job_timeout_secs() -> u64 {
    1800
}

fn default_max_concurrent_jobs() -> usize {
    2
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_poll_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_upload_retries() -> u32 {
    3
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_enabled() -> bool {
    true
}

fn default_max_document_mb() -> usize {
    100
}

fn default_max_voice_mb() -> usize {
    50
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn normalize_identifier(input: &str) -> String {
    input
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = PipelineConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.max_chunk_chars, 800);
        assert_eq!(config.sample_rate, 24_000);
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert!(config.provider.kind.is_none());
        assert!(config.storage.endpoint.is_none());
    }

    #[test]
    fn empty_json_fills_defaults() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.chunk_retries, 2);
        assert_eq!(config.provider.remote.poll_interval_ms, 1000);
        assert_eq!(config.storage.upload_retries, 3);
    }

    #[test]
    fn partial_json_overrides_single_field() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"workers": 8, "failure_policy": "placeholder"}"#).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.failure_policy, FailurePolicy::Placeholder);
        assert_eq!(config.max_chunk_chars, 800);
    }

    #[test]
    fn failure_policy_parses_aliases() {
        assert_eq!(
            "continue".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::Placeholder
        );
        assert_eq!(
            "STRICT".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::Abort
        );
        assert!("bogus".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn working_dirs_derive_from_data_dir() {
        let mut config = PipelineConfig::default();
        config.data_dir = PathBuf::from("/tmp/fabula-test");
        assert_eq!(config.uploads_dir(), PathBuf::from("/tmp/fabula-test/uploads"));
        assert_eq!(
            config.artifacts_dir(),
            PathBuf::from("/tmp/fabula-test/artifacts")
        );
        assert_eq!(config.jobs_dir(), PathBuf::from("/tmp/fabula-test/jobs"));
    }

    #[test]
    fn server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_document_mb, 100);
        assert_eq!(config.max_voice_mb, 50);
        assert!(config.cors_enabled);
    }
}
