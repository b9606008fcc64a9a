// Kitsu API client - primary streaming source
// API Documentation: https://kitsu.docs.apiary.io/
// JSON:API responses; streaming links arrive as included resources.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::fuzzy::find_best_match;
use super::rate_limit::Throttle;
use super::streaming::{SourceError, StreamingLink, StreamingSource};
use crate::models::Confidence;

pub const KITSU_API_BASE: &str = "https://kitsu.io/api/edge";

/// Search results fetched per query; the best title match among them wins
const SEARCH_LIMIT: u32 = 5;

pub struct KitsuClient {
    client: Client,
    base_url: String,
    throttle: Throttle,
}

// === API Response Types ===

#[derive(Debug, Deserialize)]
pub struct KitsuSearchResponse {
    #[serde(default)]
    pub data: Vec<KitsuAnime>,
    #[serde(default)]
    pub included: Vec<KitsuIncluded>,
}

#[derive(Debug, Deserialize)]
pub struct KitsuAnime {
    pub attributes: KitsuAnimeAttributes,
    #[serde(default)]
    pub relationships: Option<KitsuRelationships>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KitsuAnimeAttributes {
    pub canonical_title: Option<String>,
    #[serde(default)]
    pub titles: HashMap<String, Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KitsuRelationships {
    pub streaming_links: Option<KitsuRelationship>,
}

#[derive(Debug, Deserialize)]
pub struct KitsuRelationship {
    #[serde(default)]
    pub data: Option<Vec<KitsuResourceId>>,
}

#[derive(Debug, Deserialize)]
pub struct KitsuResourceId {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct KitsuIncluded {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub attributes: KitsuLinkAttributes,
}

#[derive(Debug, Default, Deserialize)]
pub struct KitsuLinkAttributes {
    pub url: Option<String>,
}

impl KitsuAnime {
    /// Canonical title first, then the localized ones in key order
    fn titles(&self) -> Vec<&str> {
        let mut titles: Vec<&str> = self.attributes.canonical_title.as_deref().into_iter().collect();

        let mut localized: Vec<(&String, &str)> = self
            .attributes
            .titles
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k, v)))
            .collect();
        localized.sort_by(|a, b| a.0.cmp(b.0));

        for (_, title) in localized {
            if !title.trim().is_empty() && !titles.contains(&title) {
                titles.push(title);
            }
        }
        titles
    }

    fn streaming_link_ids(&self) -> Vec<&str> {
        self.relationships
            .as_ref()
            .and_then(|r| r.streaming_links.as_ref())
            .and_then(|r| r.data.as_ref())
            .map(|ids| {
                ids.iter()
                    .filter(|id| id.kind == "streamingLinks")
                    .map(|id| id.id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl KitsuSearchResponse {
    /// The anime whose titles best match the query
    pub fn best_match(&self, query: &str) -> Option<&KitsuAnime> {
        let mut owners = Vec::new();
        let mut titles = Vec::new();
        for (index, anime) in self.data.iter().enumerate() {
            for title in anime.titles() {
                owners.push(index);
                titles.push(title);
            }
        }

        let best = find_best_match(query, &titles, Confidence::Low)?;
        tracing::debug!(
            "Kitsu: best match for \"{}\" is \"{}\" ({:.2})",
            query,
            best.title,
            best.result.score
        );
        self.data.get(owners[best.index])
    }

    /// Streaming links related to one anime, in relationship order
    pub fn links_for(&self, anime: &KitsuAnime) -> Vec<StreamingLink> {
        let by_id: HashMap<&str, &str> = self
            .included
            .iter()
            .filter(|inc| inc.kind == "streamingLinks")
            .filter_map(|inc| inc.attributes.url.as_deref().map(|url| (inc.id.as_str(), url)))
            .collect();

        anime
            .streaming_link_ids()
            .into_iter()
            .filter_map(|id| by_id.get(id))
            .map(|url| StreamingLink::new(*url))
            .collect()
    }
}

impl KitsuClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, throttle: Duration) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            throttle: Throttle::new("Kitsu", throttle),
        }
    }

    pub async fn search_anime(&self, title: &str) -> Result<KitsuSearchResponse, SourceError> {
        self.throttle.wait().await;

        let url = format!(
            "{}/anime?filter[text]={}&include=streamingLinks&page[limit]={}",
            self.base_url,
            urlencoding::encode(title),
            SEARCH_LIMIT
        );

        tracing::debug!("Kitsu search: {}", title);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.api+json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                status: response.status(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl StreamingSource for KitsuClient {
    fn name(&self) -> &str {
        "Kitsu"
    }

    fn confidence(&self) -> Confidence {
        Confidence::High
    }

    async fn search(&self, title: &str) -> Result<Vec<StreamingLink>, SourceError> {
        let response = self.search_anime(title).await?;

        let Some(anime) = response.best_match(title) else {
            tracing::debug!("Kitsu: no results for \"{}\"", title);
            return Ok(Vec::new());
        };

        Ok(response.links_for(anime))
    }
}
