use axum::extract::State;
use axum::Json;
use fabula_core::MetricsSnapshot;

use crate::state::AppState;

pub async fn metrics_snapshot(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.pipeline.metrics().snapshot().await)
}
