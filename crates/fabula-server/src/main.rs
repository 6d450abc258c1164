mod api;
mod error;
mod state;

use std::sync::Arc;

use fabula_core::config::{PipelineConfig, ServerConfig};
use fabula_core::AudiobookPipeline;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "fabula_server=debug,fabula_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Fabula server");

    let config = PipelineConfig::from_env();
    info!(data_dir = %config.data_dir.display(), "pipeline configuration loaded");

    let pipeline = Arc::new(AudiobookPipeline::new(config)?);
    let server_config = ServerConfig::default();
    let host = std::env::var("FABULA_HOST").unwrap_or_else(|_| server_config.host.clone());
    let port = match std::env::var("FABULA_PORT") {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(value = %raw, "invalid FABULA_PORT, using the default");
            server_config.port
        }),
        Err(_) => server_config.port,
    };

    let state = AppState::new(pipeline, server_config);
    let app = api::create_router(state.clone());

    let addr = format!("{host}:{port}");
    info!(addr = %addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
    drop(state);
}
