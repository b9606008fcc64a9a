use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::models::{sort_anime, AnimeRecord, Season, SeasonInfo, SortBy, SortOrder, StreamingPlatform};
use crate::services::aggregator::{Delivery, DeliveryMode, EnrichmentUpdate};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/current", get(get_current_season))
        .route("/:year/:season", get(get_season))
        .route("/:year/:season/events", get(get_season_events))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonQuery {
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub mode: DeliveryMode,
}

/// Payload of a progressive `streaming` event
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamingEvent {
    anime_id: i64,
    platforms: Vec<StreamingPlatform>,
}

fn parse_season(season: &str) -> Result<Season, (StatusCode, String)> {
    season
        .parse()
        .map_err(|e: String| (StatusCode::BAD_REQUEST, e))
}

async fn get_current_season() -> Json<SeasonInfo> {
    Json(SeasonInfo::current())
}

/// Enriched season listing, resolved before responding
async fn get_season(
    State(state): State<Arc<AppState>>,
    Path((year, season)): Path<(i32, String)>,
    Query(query): Query<SeasonQuery>,
) -> Result<Json<Vec<AnimeRecord>>, (StatusCode, String)> {
    let season = parse_season(&season)?;

    let mut list = state
        .aggregator
        .fetch_seasonal_anime(year, season, Delivery::Eager)
        .await
        .map_err(|e| {
            tracing::error!("Season listing {} {} failed: {:#}", season, year, e);
            (StatusCode::BAD_GATEWAY, format!("Failed to load {} {}: {}", season, year, e))
        })?;

    sort_anime(&mut list, query.sort_by, query.order);
    Ok(Json(list))
}

/// Listing first, then enrichment as server-sent events
async fn get_season_events(
    State(state): State<Arc<AppState>>,
    Path((year, season)): Path<(i32, String)>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let season = parse_season(&season)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let list = state
        .aggregator
        .fetch_seasonal_anime(year, season, Delivery::new(query.mode, tx))
        .await
        .map_err(|e| {
            tracing::error!("Season listing {} {} failed: {:#}", season, year, e);
            (StatusCode::BAD_GATEWAY, format!("Failed to load {} {}: {}", season, year, e))
        })?;

    tracing::debug!(
        "Streaming {} {} events ({:?}, {} anime)",
        season,
        year,
        query.mode,
        list.len()
    );

    Ok(Sse::new(enrichment_events(list, rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

enum EventPhase {
    Listing(Vec<AnimeRecord>, UnboundedReceiver<EnrichmentUpdate>),
    Updates(UnboundedReceiver<EnrichmentUpdate>),
    Done,
}

/// `listing`, then `streaming`/`enriched` updates, then `complete`
fn enrichment_events(
    list: Vec<AnimeRecord>,
    updates: UnboundedReceiver<EnrichmentUpdate>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(EventPhase::Listing(list, updates), |phase| async move {
        match phase {
            EventPhase::Listing(list, rx) => Some((json_event("listing", &list), EventPhase::Updates(rx))),
            EventPhase::Updates(mut rx) => match rx.recv().await {
                Some(EnrichmentUpdate::Item { anime_id, platforms }) => Some((
                    json_event("streaming", &StreamingEvent { anime_id, platforms }),
                    EventPhase::Updates(rx),
                )),
                Some(EnrichmentUpdate::Replaced(list)) => {
                    Some((json_event("enriched", &list), EventPhase::Updates(rx)))
                }
                // A dropped sender also ends the stream
                Some(EnrichmentUpdate::Finished) | None => Some((
                    Ok(Event::default().event("complete").data("{}")),
                    EventPhase::Done,
                )),
            },
            EventPhase::Done => None,
        }
    })
}

fn json_event<T: Serialize>(name: &str, data: &T) -> Result<Event, Infallible> {
    let event = Event::default().event(name);
    match serde_json::to_string(data) {
        Ok(json) => Ok(event.data(json)),
        Err(e) => {
            tracing::warn!("Failed to serialize {} event: {}", name, e);
            Ok(event.data("null"))
        }
    }
}
