use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::services::cache::CacheStats;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", axum::routing::delete(clear_cache))
        .route("/stats", get(get_stats))
        .route("/cleanup", post(cleanup))
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub removed: usize,
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    Json(state.cache.stats().await)
}

async fn clear_cache(State(state): State<Arc<AppState>>) -> StatusCode {
    state.cache.clear().await;
    tracing::info!("Cache cleared");
    StatusCode::NO_CONTENT
}

/// On-demand expiry sweep
async fn cleanup(State(state): State<Arc<AppState>>) -> Json<CleanupResponse> {
    let removed = state.cache.cleanup().await;
    Json(CleanupResponse { removed })
}
