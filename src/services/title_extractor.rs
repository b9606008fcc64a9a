// Search-term extraction for anime titles
// Western streaming catalogs usually list the English title, so it goes first.

use regex::Regex;
use std::sync::OnceLock;

use super::fuzzy::is_title_char;
use crate::models::AnimeRecord;

fn season_suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\s+(season|part|vol|volume|series)\s+\d+$").expect("valid regex")
    })
}

fn year_suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\(\d{4}\)$").expect("valid regex"))
}

fn leading_article_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(the|a|an)\s+").expect("valid regex"))
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    let value = value.trim();
    if !value.is_empty() && !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// Title variations of one anime in search priority order:
/// English, main, Japanese, then synonyms
pub fn extract_variations(anime: &AnimeRecord) -> Vec<String> {
    let mut variations = Vec::new();

    if let Some(ref english) = anime.title_english {
        push_unique(&mut variations, english);
    }
    push_unique(&mut variations, &anime.title);
    if let Some(ref japanese) = anime.title_japanese {
        push_unique(&mut variations, japanese);
    }
    for synonym in &anime.synonyms {
        push_unique(&mut variations, synonym);
    }

    variations
}

/// The title itself followed by independently derived variants
pub fn generate_search_variations(title: &str) -> Vec<String> {
    let stripped_chars = title
        .chars()
        .map(|c| if is_title_char(c) { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let transforms = [
        season_suffix_regex().replace(title, "").trim().to_string(),
        year_suffix_regex().replace(title, "").trim().to_string(),
        stripped_chars,
        title.replace(':', ""),
        title.replace('!', ""),
        title.replace('?', ""),
        leading_article_regex().replace(title, "").trim().to_string(),
    ];

    let mut variations = Vec::new();
    push_unique(&mut variations, title);
    for variant in &transforms {
        push_unique(&mut variations, variant);
    }
    variations
}

/// Every title variation expanded with its mechanical variants, de-duplicated
pub fn all_search_terms(anime: &AnimeRecord) -> Vec<String> {
    let mut terms = Vec::new();
    for title in extract_variations(anime) {
        for variant in generate_search_variations(&title) {
            push_unique(&mut terms, &variant);
        }
    }
    terms
}
