// Health Check Route

use crate::api::{models::response::HealthResponse, state::AppState};
use axum::{extract::State, Json};
use std::sync::Arc;

/// Health check endpoint, served without authentication
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let backend = state.store.backend();
    let database = match state.store.ping().await {
        Ok(()) => format!("{}: connected", backend),
        Err(e) => format!("{}: error: {}", backend, e),
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        active_scans: state.scheduler.active_count().await,
        queued_scans: state.scheduler.queued_count().await,
        database,
    })
}
