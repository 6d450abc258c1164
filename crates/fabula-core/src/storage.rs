//! Artifact storage.
//!
//! Finished audiobooks are either uploaded to an external object store over
//! HTTP or kept on the local filesystem under the artifacts directory,
//! where the server exposes them at `/files/{name}`.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};

pub enum ArtifactStorage {
    Remote(RemoteStorage),
    Local(LocalStorage),
}

impl ArtifactStorage {
    pub fn from_config(config: &PipelineConfig) -> Self {
        match &config.storage.endpoint {
            Some(endpoint) => ArtifactStorage::Remote(RemoteStorage {
                client: reqwest::Client::new(),
                endpoint: endpoint.trim_end_matches('/').to_string(),
                access_key: config.storage.access_key.clone(),
                public_base_url: config
                    .storage
                    .public_base_url
                    .as_ref()
                    .map(|url| url.trim_end_matches('/').to_string()),
                upload_retries: config.storage.upload_retries.max(1),
            }),
            None => {
                info!("no storage endpoint configured, keeping artifacts on local disk");
                ArtifactStorage::Local(LocalStorage {
                    root: config.artifacts_dir(),
                })
            }
        }
    }

    /// Store the artifact and return the URL clients should fetch.
    pub async fn store(&self, name: &str, bytes: &[u8]) -> Result<String> {
        match self {
            ArtifactStorage::Remote(storage) => storage.store(name, bytes).await,
            ArtifactStorage::Local(storage) => storage.store(name, bytes).await,
        }
    }
}

pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    async fn store(&self, name: &str, bytes: &[u8]) -> Result<String> {
        let path = self.root.join(name);
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            Error::Storage(format!("Failed to write {}: {e}", path.display()))
        })?;
        Ok(format!("/files/{name}"))
    }
}

pub struct RemoteStorage {
    client: reqwest::Client,
    endpoint: String,
    access_key: Option<String>,
    public_base_url: Option<String>,
    upload_retries: u32,
}

impl RemoteStorage {
    async fn store(&self, name: &str, bytes: &[u8]) -> Result<String> {
        let url = format!("{}/{name}", self.endpoint);
        let mut last_err = String::new();

        for attempt in 1..=self.upload_retries {
            let mut builder = self
                .client
                .put(&url)
                .header(CONTENT_TYPE, "audio/wav")
                .body(bytes.to_vec());
            if let Some(key) = &self.access_key {
                builder = builder.header("AccessKey", key);
            }

            match builder.send().await {
                Ok(response) if response.status().is_success() => {
                    let base = self.public_base_url.as_deref().unwrap_or(&self.endpoint);
                    return Ok(format!("{base}/{name}"));
                }
                Ok(response) => {
                    last_err = format!("HTTP {}", response.status());
                }
                Err(err) => {
                    last_err = err.to_string();
                }
            }

            if attempt < self.upload_retries {
                warn!(attempt, error = %last_err, "artifact upload failed, retrying");
                tokio::time::sleep(Duration::from_millis(500) * attempt).await;
            }
        }

        Err(Error::Storage(format!(
            "Upload to {url} failed after {} attempts: {last_err}",
            self.upload_retries
        )))
    }
}
