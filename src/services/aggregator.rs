// Seasonal anime aggregation
//
// Fetches a season listing, de-duplicates and sorts it, then attaches streaming
// platforms from the resolver. Callers pick how enrichment is delivered.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use super::cache::{CacheKey, CacheOptions, CacheStore};
use super::streaming::StreamingResolver;
use crate::models::{sort_by_air_date, AnimeRecord, Season, StreamingPlatform, StreamingResult};

/// Provider of the raw seasonal listing. Errors propagate to the caller.
#[async_trait]
pub trait SeasonalListingSource: Send + Sync {
    async fn seasonal_anime(&self, year: i32, season: Season) -> Result<Vec<AnimeRecord>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryMode {
    #[default]
    Eager,
    TwoPhase,
    Progressive,
}

/// Enrichment progress pushed to the caller after the listing is returned
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentUpdate {
    /// One anime finished resolving (progressive)
    Item {
        anime_id: i64,
        platforms: Vec<StreamingPlatform>,
    },
    /// The whole enriched list, sorted (two-phase)
    Replaced(Vec<AnimeRecord>),
    Finished,
}

/// How the caller wants streaming results delivered
pub enum Delivery {
    /// Resolve everything before returning
    Eager,
    /// Return the bare listing, then send one `Replaced` with the enriched list
    TwoPhase(UnboundedSender<EnrichmentUpdate>),
    /// Return the bare listing, then send an `Item` per anime as each completes
    Progressive(UnboundedSender<EnrichmentUpdate>),
}

impl Delivery {
    pub fn new(mode: DeliveryMode, updates: UnboundedSender<EnrichmentUpdate>) -> Self {
        match mode {
            DeliveryMode::Eager => Delivery::Eager,
            DeliveryMode::TwoPhase => Delivery::TwoPhase(updates),
            DeliveryMode::Progressive => Delivery::Progressive(updates),
        }
    }
}

pub struct AnimeAggregator {
    listing: Arc<dyn SeasonalListingSource>,
    resolver: Arc<StreamingResolver>,
    cache: Arc<CacheStore>,
    max_concurrent: usize,
}

impl AnimeAggregator {
    pub fn new(
        listing: Arc<dyn SeasonalListingSource>,
        resolver: Arc<StreamingResolver>,
        cache: Arc<CacheStore>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            listing,
            resolver,
            cache,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Season listing, de-duplicated by id and sorted by air date.
    /// Platforms are left empty.
    pub async fn season_listing(&self, year: i32, season: Season) -> Result<Vec<AnimeRecord>> {
        let key = CacheKey::SeasonListing { season, year }.to_string();

        if let Some(cached) = self.cache.get_current::<Vec<AnimeRecord>>(&key).await {
            tracing::debug!("Listing cache hit: {}", key);
            return Ok(cached);
        }

        let raw = self.listing.seasonal_anime(year, season).await?;
        let mut list = dedupe_by_id(raw);
        sort_by_air_date(&mut list);

        self.cache.set(&key, &list, CacheOptions::default()).await;
        Ok(list)
    }

    /// Fetch a season and deliver streaming platforms according to `delivery`.
    /// Only the listing fetch can fail; enrichment failures leave platforms empty.
    pub async fn fetch_seasonal_anime(
        self: &Arc<Self>,
        year: i32,
        season: Season,
        delivery: Delivery,
    ) -> Result<Vec<AnimeRecord>> {
        match delivery {
            Delivery::Eager => self.fetch_enriched(year, season).await,
            Delivery::TwoPhase(updates) => {
                let list = self.season_listing(year, season).await?;
                let this = Arc::clone(self);
                let background = list.clone();
                tokio::spawn(async move {
                    let enriched = this.enrich_batch(year, season, background).await;
                    send_update(&updates, EnrichmentUpdate::Replaced(enriched));
                    send_update(&updates, EnrichmentUpdate::Finished);
                });
                Ok(list)
            }
            Delivery::Progressive(updates) => {
                let list = self.season_listing(year, season).await?;
                let this = Arc::clone(self);
                let background = list.clone();
                tokio::spawn(async move {
                    this.enrich_progressively(background, &updates).await;
                    send_update(&updates, EnrichmentUpdate::Finished);
                });
                Ok(list)
            }
        }
    }

    /// Eager delivery: the enriched list, served from the batch cache when fresh
    async fn fetch_enriched(&self, year: i32, season: Season) -> Result<Vec<AnimeRecord>> {
        let key = CacheKey::StreamingBatch { season, year }.to_string();
        if let Some(cached) = self.cache.get_current::<Vec<AnimeRecord>>(&key).await {
            tracing::debug!("Streaming batch cache hit: {}", key);
            return Ok(cached);
        }

        let list = self.season_listing(year, season).await?;
        Ok(self.enrich_batch(year, season, list).await)
    }

    /// Resolve every anime, attach the platforms and re-sort. The batch is only
    /// cached when every anime resolved.
    async fn enrich_batch(&self, year: i32, season: Season, list: Vec<AnimeRecord>) -> Vec<AnimeRecord> {
        let key = CacheKey::StreamingBatch { season, year }.to_string();
        if let Some(cached) = self.cache.get_current::<Vec<AnimeRecord>>(&key).await {
            tracing::debug!("Streaming batch cache hit: {}", key);
            return cached;
        }

        tracing::info!("Enriching {} anime for {} {}", list.len(), season, year);

        let results = self.resolve_batch(&list).await;
        let complete = results.iter().all(|(_, result)| result.success);

        let mut enriched = list;
        for (anime, (_, result)) in enriched.iter_mut().zip(results) {
            anime.streaming_platforms = result.platforms;
        }
        sort_by_air_date(&mut enriched);

        if complete {
            self.cache.set(&key, &enriched, CacheOptions::default()).await;
        } else {
            tracing::debug!("Not caching {}: some anime have no platforms", key);
        }
        enriched
    }

    async fn enrich_progressively(&self, list: Vec<AnimeRecord>, updates: &UnboundedSender<EnrichmentUpdate>) {
        tracing::info!("Progressive enrichment of {} anime", list.len());

        let mut completed = stream::iter(list)
            .map(|anime| async move {
                let result = self.resolve_streaming(&anime).await;
                (anime.id, result)
            })
            .buffer_unordered(self.max_concurrent);

        while let Some((anime_id, result)) = completed.next().await {
            send_update(
                updates,
                EnrichmentUpdate::Item {
                    anime_id,
                    platforms: result.platforms,
                },
            );
        }
    }

    /// Resolve one anime, reusing a cached non-empty result
    pub async fn resolve_streaming(&self, anime: &AnimeRecord) -> StreamingResult {
        let key = CacheKey::AnimeStreaming { anime_id: anime.id }.to_string();

        if let Some(cached) = self.cache.get_current::<StreamingResult>(&key).await {
            tracing::debug!("Streaming cache hit: {}", key);
            return cached;
        }

        let result = self.resolver.resolve(anime).await;
        if result.success {
            self.cache.set(&key, &result, CacheOptions::default()).await;
        }
        result
    }

    /// Resolve many anime with bounded concurrency; output keeps input order
    pub async fn resolve_batch(&self, list: &[AnimeRecord]) -> Vec<(i64, StreamingResult)> {
        stream::iter(list.to_vec())
            .map(|anime| async move {
                let result = self.resolve_streaming(&anime).await;
                (anime.id, result)
            })
            .buffered(self.max_concurrent)
            .collect()
            .await
    }
}

fn send_update(updates: &UnboundedSender<EnrichmentUpdate>, update: EnrichmentUpdate) {
    if updates.send(update).is_err() {
        tracing::debug!("Enrichment receiver dropped");
    }
}

/// Keep the first record for each id
pub fn dedupe_by_id(list: Vec<AnimeRecord>) -> Vec<AnimeRecord> {
    let mut seen = HashSet::new();
    list.into_iter().filter(|a| seen.insert(a.id)).collect()
}
