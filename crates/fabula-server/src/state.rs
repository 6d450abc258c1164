use std::sync::Arc;

use fabula_core::config::ServerConfig;
use fabula_core::AudiobookPipeline;

/// Shared server state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AudiobookPipeline>,
    pub server_config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(pipeline: Arc<AudiobookPipeline>, server_config: ServerConfig) -> Self {
        Self {
            pipeline,
            server_config: Arc::new(server_config),
        }
    }
}
