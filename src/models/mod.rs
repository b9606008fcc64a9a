use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// One anime from a seasonal listing, enriched in place with streaming platforms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimeRecord {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub title_english: Option<String>,
    #[serde(default)]
    pub title_japanese: Option<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub aired_from: Option<NaiveDate>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub streaming_platforms: Vec<StreamingPlatform>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingPlatform {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Coarse bucket summarizing a continuous match score.
/// Ordered so that `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

/// Outcome of resolving streaming platforms for one anime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingResult {
    pub platforms: Vec<StreamingPlatform>,
    pub searched_terms: Vec<String>,
    pub source: String,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Fall => "fall",
        }
    }

    /// Season airing in the given month (1-12)
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Fall,
            _ => Season::Winter,
        }
    }
}

impl std::fmt::Display for Season {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Season {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "winter" => Ok(Season::Winter),
            "spring" => Ok(Season::Spring),
            "summer" => Ok(Season::Summer),
            "fall" | "autumn" => Ok(Season::Fall),
            other => Err(format!("unknown season: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonInfo {
    pub season: Season,
    pub year: i32,
}

impl SeasonInfo {
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            season: Season::from_month(date.month()),
            year: date.year(),
        }
    }

    pub fn current() -> Self {
        Self::for_date(chrono::Local::now().date_naive())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    Name,
    #[default]
    ReleaseDate,
    Rating,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Sort a listing in place. Stable, so equal keys keep listing order.
/// Missing dates and scores sort last regardless of direction.
pub fn sort_anime(list: &mut [AnimeRecord], sort_by: SortBy, order: SortOrder) {
    list.sort_by(|a, b| {
        let directed = |ord: Ordering| match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        };

        match sort_by {
            SortBy::Name => directed(
                a.display_title()
                    .to_lowercase()
                    .cmp(&b.display_title().to_lowercase()),
            ),
            SortBy::ReleaseDate => match (a.aired_from, b.aired_from) {
                (Some(x), Some(y)) => directed(x.cmp(&y)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
            SortBy::Rating => match (a.score, b.score) {
                (Some(x), Some(y)) => directed(x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        }
    });
}

/// Default display order: ascending air date
pub fn sort_by_air_date(list: &mut [AnimeRecord]) {
    sort_anime(list, SortBy::ReleaseDate, SortOrder::Asc);
}

impl AnimeRecord {
    /// English title when present, otherwise the main title
    pub fn display_title(&self) -> &str {
        self.title_english
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.title)
    }
}

#[cfg(test)]
pub(crate) fn anime(id: i64, title: &str, aired: Option<&str>) -> AnimeRecord {
    AnimeRecord {
        id,
        title: title.to_string(),
        title_english: None,
        title_japanese: None,
        synonyms: Vec::new(),
        aired_from: aired.and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
        score: None,
        genres: Vec::new(),
        image_url: None,
        synopsis: None,
        streaming_platforms: Vec::new(),
    }
}
