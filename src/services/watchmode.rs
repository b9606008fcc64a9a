// WatchMode API client - secondary streaming source
// API Documentation: https://api.watchmode.com/docs
// Requires an API key; two requests per lookup (title search, then sources).

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::fuzzy::{are_titles_similar, find_best_match};
use super::rate_limit::Throttle;
use super::streaming::{SourceError, StreamingLink, StreamingSource};
use crate::models::Confidence;

pub const WATCHMODE_API_BASE: &str = "https://api.watchmode.com/v1";

pub struct WatchModeClient {
    client: Client,
    base_url: String,
    api_key: String,
    region: String,
    throttle: Throttle,
}

// === API Response Types ===

#[derive(Debug, Deserialize)]
pub struct WatchModeSearchResponse {
    #[serde(default)]
    pub title_results: Vec<WatchModeTitle>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchModeTitle {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchModeSource {
    pub web_url: Option<String>,
}

impl WatchModeSearchResponse {
    pub fn best_match(&self, query: &str) -> Option<&WatchModeTitle> {
        let names: Vec<&str> = self.title_results.iter().map(|t| t.name.as_str()).collect();
        let best = find_best_match(query, &names, Confidence::Low)?;
        self.title_results.get(best.index)
    }

    /// Best match, rejected unless it is at least a medium-confidence match
    pub fn confident_match(&self, query: &str) -> Option<&WatchModeTitle> {
        let show = self.best_match(query)?;
        if !are_titles_similar(query, &show.name, Confidence::Medium) {
            tracing::debug!("WatchMode: rejected weak match \"{}\" for \"{}\"", show.name, query);
            return None;
        }
        Some(show)
    }
}

/// Sources with a web URL, in response order
pub fn source_links(sources: Vec<WatchModeSource>) -> Vec<StreamingLink> {
    sources
        .into_iter()
        .filter_map(|s| s.web_url)
        .filter(|url| !url.trim().is_empty())
        .map(StreamingLink::new)
        .collect()
}

impl WatchModeClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        region: impl Into<String>,
        timeout: Duration,
        throttle: Duration,
    ) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            region: region.into(),
            throttle: Throttle::new("WatchMode", throttle),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        self.throttle.wait().await;

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                status: response.status(),
            });
        }

        Ok(response.json().await?)
    }

    pub async fn search_titles(&self, title: &str) -> Result<WatchModeSearchResponse, SourceError> {
        tracing::debug!("WatchMode search: {}", title);

        let url = format!(
            "{}/search/?apiKey={}&search_field=name&search_value={}&types=tv",
            self.base_url,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(title)
        );
        self.get_json(&url).await
    }

    pub async fn title_sources(&self, title_id: i64) -> Result<Vec<WatchModeSource>, SourceError> {
        tracing::debug!("WatchMode sources: {}", title_id);

        let url = format!(
            "{}/title/{}/sources/?apiKey={}&regions={}",
            self.base_url,
            title_id,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(&self.region)
        );
        self.get_json(&url).await
    }
}

#[async_trait]
impl StreamingSource for WatchModeClient {
    fn name(&self) -> &str {
        "WatchMode"
    }

    fn confidence(&self) -> Confidence {
        Confidence::Medium
    }

    async fn search(&self, title: &str) -> Result<Vec<StreamingLink>, SourceError> {
        let results = self.search_titles(title).await?;

        let Some(show) = results.confident_match(title) else {
            tracing::debug!("WatchMode: no usable results for \"{}\"", title);
            return Ok(Vec::new());
        };

        tracing::debug!("WatchMode: matched \"{}\" (ID: {})", show.name, show.id);

        let sources = self.title_sources(show.id).await?;
        Ok(source_links(sources))
    }
}
