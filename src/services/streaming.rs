// Streaming platform resolution
//
// Sources are tried in priority order. Within a source every candidate title is
// searched until one yields a platform; later sources are only consulted when
// the earlier ones found nothing. Source failures count as "nothing found".

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use super::platforms::{is_known, platform_name};
use super::title_extractor::{all_search_terms, extract_variations};
use crate::models::{AnimeRecord, Confidence, StreamingPlatform, StreamingResult};

/// Sentinel for `StreamingResult::source` when every source came up empty
pub const NO_SOURCE: &str = "none";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {status}")]
    Status { status: reqwest::StatusCode },
}

/// A raw link reported by a source, before platform normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingLink {
    pub url: String,
}

impl StreamingLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// An external API that can find streaming links by title
#[async_trait]
pub trait StreamingSource: Send + Sync {
    /// Label recorded on platforms and results from this source
    fn name(&self) -> &str;

    /// Confidence attached to platforms found here
    fn confidence(&self) -> Confidence;

    async fn search(&self, title: &str) -> Result<Vec<StreamingLink>, SourceError>;
}

#[derive(Debug, Clone, Copy)]
pub struct ResolverOptions {
    /// Upper bound on candidate titles tried per source
    pub max_candidates: usize,
    /// Also search mechanical variants (suffixes, punctuation, articles stripped)
    pub expand_variations: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            max_candidates: 6,
            expand_variations: false,
        }
    }
}

pub struct StreamingResolver {
    sources: Vec<Arc<dyn StreamingSource>>,
    options: ResolverOptions,
}

impl StreamingResolver {
    pub fn new(sources: Vec<Arc<dyn StreamingSource>>, options: ResolverOptions) -> Self {
        Self { sources, options }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Candidate titles in search order
    pub fn candidates(&self, anime: &AnimeRecord) -> Vec<String> {
        let mut terms = if self.options.expand_variations {
            all_search_terms(anime)
        } else {
            extract_variations(anime)
        };
        terms.truncate(self.options.max_candidates.max(1));
        terms
    }

    /// Find streaming platforms for one anime. Never fails; exhaustion gives
    /// an empty, unsuccessful result.
    pub async fn resolve(&self, anime: &AnimeRecord) -> StreamingResult {
        let searched_terms = self.candidates(anime);

        tracing::debug!(
            "Streaming search: \"{}\" ({} candidate titles)",
            anime.display_title(),
            searched_terms.len()
        );

        for source in &self.sources {
            for term in &searched_terms {
                let platforms = self.search_source(source.as_ref(), term).await;
                if !platforms.is_empty() {
                    tracing::info!(
                        "Found {} platforms for \"{}\" via {}",
                        platforms.len(),
                        anime.display_title(),
                        source.name()
                    );
                    return StreamingResult {
                        platforms,
                        searched_terms,
                        source: source.name().to_string(),
                        success: true,
                    };
                }
            }
            tracing::debug!(
                "{} found nothing for \"{}\"",
                source.name(),
                anime.display_title()
            );
        }

        tracing::info!(
            "No streaming platforms found for \"{}\" after trying {}",
            anime.display_title(),
            self.source_names().join(", ")
        );

        StreamingResult {
            platforms: Vec::new(),
            searched_terms,
            source: NO_SOURCE.to_string(),
            success: false,
        }
    }

    async fn search_source(&self, source: &dyn StreamingSource, term: &str) -> Vec<StreamingPlatform> {
        match source.search(term).await {
            Ok(links) => normalize_links(links, source.name(), source.confidence()),
            Err(e) => {
                tracing::warn!("{} search failed for \"{}\": {}", source.name(), term, e);
                Vec::new()
            }
        }
    }
}

/// Turn raw links into named platforms: unknown URLs dropped, one entry per name
pub fn normalize_links(
    links: Vec<StreamingLink>,
    source: &str,
    confidence: Confidence,
) -> Vec<StreamingPlatform> {
    let mut platforms: Vec<StreamingPlatform> = Vec::new();

    for link in links {
        let name = platform_name(&link.url);
        if !is_known(&name) {
            tracing::debug!("{}: skipping unrecognized link {:?}", source, link.url);
            continue;
        }
        if platforms.iter().any(|p| p.name == name) {
            continue;
        }
        platforms.push(StreamingPlatform {
            name,
            url: link.url,
            confidence: Some(confidence),
            source: Some(source.to_string()),
        });
    }

    platforms
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted source recording every title it was asked about
    pub struct FakeSource {
        pub name: &'static str,
        pub responses: HashMap<String, Result<Vec<String>, u16>>,
        pub calls: Mutex<Vec<String>>,
        /// Every search fails with 503 while set
        pub down: AtomicBool,
        pub delay: Option<Duration>,
        pub in_flight: AtomicUsize,
        pub peak_in_flight: AtomicUsize,
    }

    impl FakeSource {
        pub fn new(name: &'static str) -> Self {
            Self {
                name,
                responses: HashMap::new(),
                calls: Mutex::new(Vec::new()),
                down: AtomicBool::new(false),
                delay: None,
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }
        }

        pub fn with_links(mut self, title: &str, urls: &[&str]) -> Self {
            self.responses.insert(
                title.to_string(),
                Ok(urls.iter().map(|u| u.to_string()).collect()),
            );
            self
        }

        pub fn failing_on(mut self, title: &str, status: u16) -> Self {
            self.responses.insert(title.to_string(), Err(status));
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn peak_in_flight(&self) -> usize {
            self.peak_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StreamingSource for FakeSource {
        fn name(&self) -> &str {
            self.name
        }

        fn confidence(&self) -> Confidence {
            Confidence::High
        }

        async fn search(&self, title: &str) -> Result<Vec<StreamingLink>, SourceError> {
            self.calls.lock().unwrap().push(title.to_string());

            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.down.load(Ordering::SeqCst) {
                return Err(SourceError::Status {
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                });
            }

            match self.responses.get(title) {
                Some(Ok(urls)) => Ok(urls.iter().map(StreamingLink::new).collect()),
                Some(Err(status)) => Err(SourceError::Status {
                    status: reqwest::StatusCode::from_u16(*status).unwrap(),
                }),
                None => Ok(Vec::new()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeSource;
    use super::*;
    use crate::models::anime;

    fn frieren() -> AnimeRecord {
        let mut record = anime(52991, "Sousou no Frieren", Some("2023-09-29"));
        record.title_english = Some("Frieren: Beyond Journey's End".to_string());
        record
    }

    fn resolver(primary: Arc<FakeSource>, secondary: Arc<FakeSource>) -> StreamingResolver {
        StreamingResolver::new(vec![primary, secondary], ResolverOptions::default())
    }

    #[tokio::test]
    async fn test_primary_hit_short_circuits_secondary() {
        let primary = Arc::new(FakeSource::new("Kitsu").with_links(
            "Frieren: Beyond Journey's End",
            &["https://www.crunchyroll.com/series/GG5H5XQX4"],
        ));
        let secondary = Arc::new(FakeSource::new("WatchMode"));

        let result = resolver(primary.clone(), secondary.clone())
            .resolve(&frieren())
            .await;

        assert!(result.success);
        assert_eq!(result.source, "Kitsu");
        assert_eq!(result.platforms.len(), 1);
        assert_eq!(result.platforms[0].name, "Crunchyroll");
        assert_eq!(result.platforms[0].source.as_deref(), Some("Kitsu"));
        assert_eq!(primary.calls(), vec!["Frieren: Beyond Journey's End"]);
        assert!(secondary.calls().is_empty());
    }

    #[tokio::test]
    async fn test_primary_tries_every_candidate_before_falling_back() {
        let primary = Arc::new(
            FakeSource::new("Kitsu").with_links("Sousou no Frieren", &["https://www.netflix.com/title/1"]),
        );
        let secondary = Arc::new(FakeSource::new("WatchMode"));

        let result = resolver(primary.clone(), secondary.clone())
            .resolve(&frieren())
            .await;

        assert_eq!(result.source, "Kitsu");
        assert_eq!(result.platforms[0].name, "Netflix");
        assert_eq!(
            primary.calls(),
            vec!["Frieren: Beyond Journey's End", "Sousou no Frieren"]
        );
        assert!(secondary.calls().is_empty());
    }

    #[tokio::test]
    async fn test_secondary_used_when_primary_empty() {
        let primary = Arc::new(FakeSource::new("Kitsu"));
        let secondary = Arc::new(
            FakeSource::new("WatchMode").with_links("Sousou no Frieren", &["https://www.hulu.com/series/x"]),
        );

        let result = resolver(primary.clone(), secondary.clone())
            .resolve(&frieren())
            .await;

        assert!(result.success);
        assert_eq!(result.source, "WatchMode");
        assert_eq!(result.platforms[0].name, "Hulu");
        assert_eq!(primary.calls().len(), 2);
        assert_eq!(secondary.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_is_empty_not_error() {
        let primary = Arc::new(FakeSource::new("Kitsu"));
        let secondary = Arc::new(FakeSource::new("WatchMode"));

        let result = resolver(primary, secondary).resolve(&frieren()).await;

        assert!(!result.success);
        assert!(result.platforms.is_empty());
        assert_eq!(result.source, NO_SOURCE);
        assert_eq!(
            result.searched_terms,
            vec!["Frieren: Beyond Journey's End", "Sousou no Frieren"]
        );
    }

    #[tokio::test]
    async fn test_source_failure_degrades_to_next_source() {
        let primary = Arc::new(
            FakeSource::new("Kitsu")
                .failing_on("Frieren: Beyond Journey's End", 503)
                .failing_on("Sousou no Frieren", 500),
        );
        let secondary = Arc::new(FakeSource::new("WatchMode").with_links(
            "Frieren: Beyond Journey's End",
            &["https://www.crunchyroll.com/x"],
        ));

        let result = resolver(primary, secondary).resolve(&frieren()).await;
        assert!(result.success);
        assert_eq!(result.source, "WatchMode");
    }

    #[tokio::test]
    async fn test_unknown_links_do_not_count_as_found() {
        let primary = Arc::new(
            FakeSource::new("Kitsu").with_links("Frieren: Beyond Journey's End", &["not a url"]),
        );
        let secondary = Arc::new(FakeSource::new("WatchMode"));

        let result = resolver(primary.clone(), secondary.clone())
            .resolve(&frieren())
            .await;
        assert!(!result.success);
        assert_eq!(primary.calls().len(), 2);
        assert_eq!(secondary.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_caller_record_untouched() {
        let primary = Arc::new(FakeSource::new("Kitsu").with_links(
            "Frieren: Beyond Journey's End",
            &["https://www.crunchyroll.com/x"],
        ));
        let record = frieren();
        let before = record.clone();
        let _ = resolver(primary, Arc::new(FakeSource::new("WatchMode")))
            .resolve(&record)
            .await;
        assert_eq!(record, before);
    }

    #[tokio::test]
    async fn test_candidates_respect_options() {
        let mut record = frieren();
        record.synonyms = vec!["Frieren at the Funeral".to_string()];

        let limited = StreamingResolver::new(
            Vec::new(),
            ResolverOptions {
                max_candidates: 2,
                expand_variations: false,
            },
        );
        assert_eq!(limited.candidates(&record).len(), 2);

        let expanded = StreamingResolver::new(
            Vec::new(),
            ResolverOptions {
                max_candidates: 20,
                expand_variations: true,
            },
        );
        assert!(expanded
            .candidates(&record)
            .contains(&"Frieren Beyond Journey's End".to_string()));
    }

    #[test]
    fn test_normalize_links_dedupes_by_name() {
        let links = vec![
            StreamingLink::new("https://www.crunchyroll.com/a"),
            StreamingLink::new("https://crunchyroll.com/b"),
            StreamingLink::new("garbage"),
            StreamingLink::new("https://www.primevideo.com/c"),
        ];
        let platforms = normalize_links(links, "Kitsu", Confidence::High);
        let names: Vec<&str> = platforms.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Crunchyroll", "Amazon Prime"]);
        assert_eq!(platforms[0].url, "https://www.crunchyroll.com/a");
        assert_eq!(platforms[0].confidence, Some(Confidence::High));
    }
}
