//! HTTP API surface.
//!
//! Everything lives under `/api/v1`; finished artifacts are served
//! statically at `/files`.

mod health;
mod jobs;
mod metrics;
mod uploads;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::metrics_snapshot))
        .route("/uploads/document", post(uploads::upload_document))
        .route("/uploads/voice", post(uploads::upload_voice))
        .route("/jobs", post(jobs::submit_job))
        .route("/jobs/{id}", get(jobs::job_status));

    let max_upload_bytes = state
        .server_config
        .max_document_mb
        .max(state.server_config.max_voice_mb)
        * 1024
        * 1024;

    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .nest_service(
            "/files",
            ServeDir::new(state.pipeline.config().artifacts_dir()),
        )
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http());

    if state.server_config.cors_enabled {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}
