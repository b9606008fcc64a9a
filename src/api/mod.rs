use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

mod cache;
mod seasons;
mod streaming;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/seasons", seasons::routes()) // Listings, current season, enrichment events
        .nest("/streaming", streaming::routes()) // Single and batch resolution
        .nest("/cache", cache::routes()) // Cache stats and maintenance
}

/// Full application router with middleware
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api", routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_health() {
        let response = send(default_state(), get("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "OK");
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let response = send(default_state(), get("/api/nope")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
