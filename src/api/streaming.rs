use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::models::{AnimeRecord, StreamingResult};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/resolve", post(resolve))
        .route("/resolve-batch", post(resolve_batch))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub anime_id: i64,
    pub result: StreamingResult,
}

async fn resolve(
    State(state): State<Arc<AppState>>,
    Json(anime): Json<AnimeRecord>,
) -> Json<StreamingResult> {
    Json(state.aggregator.resolve_streaming(&anime).await)
}

async fn resolve_batch(
    State(state): State<Arc<AppState>>,
    Json(list): Json<Vec<AnimeRecord>>,
) -> Json<Vec<BatchResult>> {
    tracing::debug!("Batch streaming resolution for {} anime", list.len());

    let results = state
        .aggregator
        .resolve_batch(&list)
        .await
        .into_iter()
        .map(|(anime_id, result)| BatchResult { anime_id, result })
        .collect();

    Json(results)
}

#[cfg(test)]
mod tests {
    use crate::api::testing::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_resolve_found() {
        let body = json!({"id": 1, "title": "Alpha"});
        let response = send(default_state(), json_request("POST", "/api/streaming/resolve", &body)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["source"], "Kitsu");
        assert_eq!(body["searchedTerms"], json!(["Alpha"]));
        assert_eq!(body["platforms"][0]["name"], "Crunchyroll");
        assert_eq!(body["platforms"][0]["confidence"], "high");
    }

    #[tokio::test]
    async fn test_resolve_not_found() {
        let body = json!({"id": 9, "title": "Nobody Streams This", "titleEnglish": "Obscure"});
        let response = send(default_state(), json_request("POST", "/api/streaming/resolve", &body)).await;

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["source"], "none");
        assert_eq!(body["platforms"], json!([]));
        assert_eq!(body["searchedTerms"], json!(["Obscure", "Nobody Streams This"]));
    }

    #[tokio::test]
    async fn test_resolve_rejects_malformed_record() {
        let body = json!({"title": "missing id"});
        let response = send(default_state(), json_request("POST", "/api/streaming/resolve", &body)).await;
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_resolve_batch_in_input_order() {
        let body = json!([
            {"id": 3, "title": "Gamma"},
            {"id": 2, "title": "Beta"},
            {"id": 1, "title": "Alpha"}
        ]);
        let response = send(
            default_state(),
            json_request("POST", "/api/streaming/resolve-batch", &body),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let ids: Vec<i64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["animeId"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(body[0]["result"]["success"], false);
        assert_eq!(body[1]["result"]["platforms"][0]["name"], "Netflix");
    }
}
