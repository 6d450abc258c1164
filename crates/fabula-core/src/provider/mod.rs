//! Synthesis backends.
//!
//! A backend turns one text chunk plus a voice reference into PCM. Three
//! implementations exist: a remote HTTP service that is polled to
//! completion, an in-process model loaded from disk, and a mock used when
//! nothing else is configured.

pub mod local;
pub mod mock;
pub mod remote;

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::audio::SynthAudio;
use crate::config::{self, ProviderConfig};
use crate::error::{Error, Result};
use crate::voice::VoiceReference;

pub use local::{LocalModel, LocalProvider};
pub use mock::MockProvider;
pub use remote::RemoteProvider;

/// One chunk's worth of synthesis work.
#[derive(Debug, Clone)]
pub struct SynthRequest {
    pub request_id: String,
    pub text: String,
    pub voice: Arc<VoiceReference>,
}

impl SynthRequest {
    pub fn new(text: impl Into<String>, voice: Arc<VoiceReference>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            text: text.into(),
            voice,
        }
    }
}

/// A text-to-speech backend. Implementations are shared across worker
/// tasks, so synthesis takes `&self`.
pub trait Synthesizer: Send + Sync {
    fn synthesize(
        &self,
        request: &SynthRequest,
    ) -> impl Future<Output = Result<SynthAudio>> + Send;
}

/// Which backend a configuration resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Remote,
    Local,
    Mock,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Remote => "remote",
            ProviderKind::Local => "local",
            ProviderKind::Mock => "mock",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        match config::normalize_identifier(input).as_str() {
            "remote" | "api" | "polling" => Ok(ProviderKind::Remote),
            "local" | "native" | "inprocess" => Ok(ProviderKind::Local),
            "mock" | "fallback" | "none" => Ok(ProviderKind::Mock),
            other => Err(Error::Config(format!("Unknown provider kind: {other}"))),
        }
    }
}

/// Configured backend, dispatched statically.
pub enum SynthProvider {
    Remote(RemoteProvider),
    Local(LocalProvider),
    Mock(MockProvider),
}

impl SynthProvider {
    /// Build the backend a configuration asks for. An explicit kind wins;
    /// otherwise the presence of an endpoint or a model directory decides,
    /// and the mock is the last resort.
    pub fn from_config(config: &ProviderConfig, sample_rate: u32) -> Result<Self> {
        let kind = resolve_kind(config)?;
        info!(provider = kind.as_str(), "synthesis backend selected");
        match kind {
            ProviderKind::Remote => Ok(SynthProvider::Remote(RemoteProvider::from_config(
                &config.remote,
            )?)),
            ProviderKind::Local => Ok(SynthProvider::Local(LocalProvider::load(
                &config.local,
            )?)),
            ProviderKind::Mock => Ok(SynthProvider::Mock(MockProvider::new(sample_rate))),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            SynthProvider::Remote(_) => ProviderKind::Remote,
            SynthProvider::Local(_) => ProviderKind::Local,
            SynthProvider::Mock(_) => ProviderKind::Mock,
        }
    }
}

impl Synthesizer for SynthProvider {
    async fn synthesize(&self, request: &SynthRequest) -> Result<SynthAudio> {
        match self {
            SynthProvider::Remote(provider) => provider.synthesize(request).await,
            SynthProvider::Local(provider) => provider.synthesize(request).await,
            SynthProvider::Mock(provider) => provider.synthesize(request).await,
        }
    }
}

fn resolve_kind(config: &ProviderConfig) -> Result<ProviderKind> {
    if let Some(kind) = &config.kind {
        return kind.parse();
    }
    if config.remote.endpoint.is_some() {
        return Ok(ProviderKind::Remote);
    }
    if config.local.model_dir.is_some() {
        return Ok(ProviderKind::Local);
    }
    warn!("No synthesis backend configured, falling back to mock audio");
    Ok(ProviderKind::Mock)
}
