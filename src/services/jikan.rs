// Jikan API client - Unofficial MyAnimeList API
// API Documentation: https://docs.api.jikan.moe/
// Rate limit: 3 requests/second, 60 requests/minute

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

use super::aggregator::SeasonalListingSource;
use super::rate_limit::Throttle;
use crate::models::{AnimeRecord, Genre, Season};

pub const JIKAN_API_BASE: &str = "https://api.jikan.moe/v4";

/// Jikan API client with rate limiting
pub struct JikanClient {
    client: Client,
    base_url: String,
    throttle: Throttle,
    max_pages: u32,
}

// === API Response Types ===

#[derive(Debug, Deserialize)]
pub struct JikanSeasonResponse {
    pub data: Vec<JikanAnime>,
    pub pagination: Option<JikanPagination>,
}

#[derive(Debug, Deserialize)]
pub struct JikanPagination {
    #[serde(default)]
    pub has_next_page: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JikanAnime {
    pub mal_id: i64,
    pub images: Option<JikanImages>,
    pub title: String,
    pub title_english: Option<String>,
    pub title_japanese: Option<String>,
    pub title_synonyms: Option<Vec<String>>,
    pub aired: Option<JikanAired>,
    pub score: Option<f64>,
    pub synopsis: Option<String>,
    pub genres: Option<Vec<JikanGenre>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JikanImages {
    pub jpg: Option<JikanImageSet>,
    pub webp: Option<JikanImageSet>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JikanImageSet {
    pub image_url: Option<String>,
    pub large_image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JikanAired {
    pub from: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JikanGenre {
    pub mal_id: i64,
    pub name: String,
}

impl JikanClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, throttle: Duration, max_pages: u32) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            throttle: Throttle::new("Jikan", throttle),
            max_pages: max_pages.max(1),
        }
    }

    /// Fetch one page of a season listing
    pub async fn season_page(&self, year: i32, season: Season, page: u32) -> Result<JikanSeasonResponse> {
        self.throttle.wait().await;

        let url = format!("{}/seasons/{}/{}?page={}", self.base_url, year, season, page);

        tracing::debug!("Jikan season listing: {} {} page {}", season, year, page);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to fetch season from Jikan")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("Jikan season listing failed: {} - {}", status, text);
        }

        response
            .json()
            .await
            .context("Failed to parse Jikan season response")
    }

    /// Every page of a season, following pagination up to the page limit
    pub async fn fetch_season(&self, year: i32, season: Season) -> Result<Vec<AnimeRecord>> {
        let mut records = Vec::new();
        let mut seen = HashSet::new();

        for page in 1..=self.max_pages {
            let response = self.season_page(year, season, page).await?;
            merge_page(&mut records, &mut seen, response.data);

            let has_next = response
                .pagination
                .as_ref()
                .map(|p| p.has_next_page)
                .unwrap_or(false);
            if !has_next {
                break;
            }
            if page == self.max_pages {
                tracing::debug!(
                    "Jikan listing for {} {} truncated at {} pages",
                    season,
                    year,
                    self.max_pages
                );
            }
        }

        tracing::info!("Jikan: {} anime for {} {}", records.len(), season, year);
        Ok(records)
    }
}

#[async_trait]
impl SeasonalListingSource for JikanClient {
    async fn seasonal_anime(&self, year: i32, season: Season) -> Result<Vec<AnimeRecord>> {
        self.fetch_season(year, season).await
    }
}

/// Append a page, skipping ids already seen on earlier pages
fn merge_page(records: &mut Vec<AnimeRecord>, seen: &mut HashSet<i64>, page: Vec<JikanAnime>) {
    for anime in page {
        if seen.insert(anime.mal_id) {
            records.push(to_record(anime));
        }
    }
}

/// Convert a Jikan entry to the listing record
pub fn to_record(anime: JikanAnime) -> AnimeRecord {
    // Prefer the large jpg, then any jpg, then webp
    let image_url = anime.images.as_ref().and_then(|images| {
        images
            .jpg
            .as_ref()
            .and_then(|jpg| jpg.large_image_url.clone().or(jpg.image_url.clone()))
            .or_else(|| {
                images
                    .webp
                    .as_ref()
                    .and_then(|webp| webp.large_image_url.clone().or(webp.image_url.clone()))
            })
    });

    // "2024-04-06T00:00:00+00:00" -> 2024-04-06
    let aired_from = anime
        .aired
        .as_ref()
        .and_then(|aired| aired.from.as_deref())
        .and_then(|from| from.get(..10))
        .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok());

    AnimeRecord {
        id: anime.mal_id,
        title: anime.title,
        title_english: anime.title_english,
        title_japanese: anime.title_japanese,
        synonyms: anime.title_synonyms.unwrap_or_default(),
        aired_from,
        score: anime.score,
        genres: anime
            .genres
            .unwrap_or_default()
            .into_iter()
            .map(|g| Genre {
                id: g.mal_id,
                name: g.name,
            })
            .collect(),
        image_url,
        synopsis: anime.synopsis,
        streaming_platforms: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEASON_PAGE: &str = r#"{
        "pagination": {"last_visible_page": 2, "has_next_page": true},
        "data": [
            {
                "mal_id": 52991,
                "url": "https://myanimelist.net/anime/52991",
                "images": {
                    "jpg": {
                        "image_url": "https://cdn.myanimelist.net/images/anime/1015/138006.jpg",
                        "large_image_url": "https://cdn.myanimelist.net/images/anime/1015/138006l.jpg"
                    }
                },
                "title": "Sousou no Frieren",
                "title_english": "Frieren: Beyond Journey's End",
                "title_japanese": "葬送のフリーレン",
                "title_synonyms": ["Frieren at the Funeral"],
                "type": "TV",
                "aired": {"from": "2023-09-29T00:00:00+00:00", "to": null},
                "score": 9.31,
                "synopsis": "The demon king has been defeated.",
                "genres": [{"mal_id": 2, "type": "anime", "name": "Adventure"}]
            },
            {
                "mal_id": 99999,
                "images": {"webp": {"image_url": "https://cdn.example/x.webp"}},
                "title": "Untitled Short",
                "title_english": null,
                "title_synonyms": [],
                "aired": {"from": null},
                "score": null,
                "genres": []
            }
        ]
    }"#;

    #[test]
    fn test_parse_season_page() {
        let page: JikanSeasonResponse = serde_json::from_str(SEASON_PAGE).unwrap();
        assert_eq!(page.data.len(), 2);
        assert!(page.pagination.unwrap().has_next_page);
    }

    #[test]
    fn test_to_record() {
        let page: JikanSeasonResponse = serde_json::from_str(SEASON_PAGE).unwrap();
        let mut data = page.data.into_iter();

        let frieren = to_record(data.next().unwrap());
        assert_eq!(frieren.id, 52991);
        assert_eq!(frieren.display_title(), "Frieren: Beyond Journey's End");
        assert_eq!(frieren.aired_from, NaiveDate::from_ymd_opt(2023, 9, 29));
        assert_eq!(
            frieren.image_url.as_deref(),
            Some("https://cdn.myanimelist.net/images/anime/1015/138006l.jpg")
        );
        assert_eq!(frieren.synonyms, vec!["Frieren at the Funeral"]);
        assert_eq!(frieren.genres[0].name, "Adventure");
        assert!(frieren.streaming_platforms.is_empty());

        let short = to_record(data.next().unwrap());
        assert_eq!(short.aired_from, None);
        assert_eq!(short.score, None);
        assert_eq!(short.image_url.as_deref(), Some("https://cdn.example/x.webp"));
    }

    #[test]
    fn test_merge_page_skips_repeated_ids() {
        let page: JikanSeasonResponse = serde_json::from_str(SEASON_PAGE).unwrap();
        let mut records = Vec::new();
        let mut seen = HashSet::new();

        merge_page(&mut records, &mut seen, page.data.clone());
        merge_page(&mut records, &mut seen, page.data);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_missing_pagination_defaults() {
        let page: JikanSeasonResponse = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert!(page.pagination.is_none());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = JikanClient::new("http://localhost:1/v4/", Duration::from_secs(1), Duration::ZERO, 0);
        assert_eq!(client.base_url, "http://localhost:1/v4");
        assert_eq!(client.max_pages, 1);
    }
}
