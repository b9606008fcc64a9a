// Fuzzy title matching
// Blends normalized Levenshtein, word-set Jaccard and containment scores so that
// titles spelled differently across APIs can still be paired up.

use std::collections::HashSet;

use serde::Serialize;

use crate::models::Confidence;

const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.8;
const MEDIUM_CONFIDENCE_THRESHOLD: f64 = 0.6;

const LEVENSHTEIN_WEIGHT: f64 = 0.4;
const WORD_WEIGHT: f64 = 0.4;
const CONTAINMENT_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMethod {
    Exact,
    NormalizedExact,
    CombinedFuzzy,
    InvalidInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchResult {
    pub score: f64,
    pub confidence: Confidence,
    pub method: MatchMethod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BestMatch<'a> {
    pub title: &'a str,
    pub index: usize,
    pub result: MatchResult,
}

/// Characters kept when normalizing: ASCII word characters, whitespace,
/// Hiragana, Katakana and CJK Unified Ideographs
pub fn is_title_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c == '_'
        || c.is_whitespace()
        || ('\u{3040}'..='\u{309F}').contains(&c)
        || ('\u{30A0}'..='\u{30FF}').contains(&c)
        || ('\u{4E00}'..='\u{9FAF}').contains(&c)
}

/// Lowercase, drop characters outside the allow-list, collapse whitespace
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| is_title_char(*c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_words(title: &str) -> HashSet<String> {
    normalize_title(title)
        .split_whitespace()
        .filter(|w| w.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

pub fn confidence_for(score: f64) -> Confidence {
    if score >= HIGH_CONFIDENCE_THRESHOLD {
        Confidence::High
    } else if score >= MEDIUM_CONFIDENCE_THRESHOLD {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// `1 - distance / max_len`, 1.0 when both are empty
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Jaccard index of the two word sets; an empty union counts as identical
pub fn word_similarity(a: &str, b: &str) -> f64 {
    let words_a = extract_words(a);
    let words_b = extract_words(b);
    let union = words_a.union(&words_b).count();
    if union == 0 {
        return 1.0;
    }
    let intersection = words_a.intersection(&words_b).count();
    intersection as f64 / union as f64
}

/// Substring ratio when the shorter normalized title sits inside the longer,
/// otherwise the share of the smaller word set found in the larger one
pub fn containment_similarity(a: &str, b: &str) -> f64 {
    let norm_a = normalize_title(a);
    let norm_b = normalize_title(b);

    let (shorter, longer) = if norm_a.chars().count() < norm_b.chars().count() {
        (&norm_a, &norm_b)
    } else {
        (&norm_b, &norm_a)
    };

    if shorter.is_empty() {
        return 0.0;
    }

    if longer.contains(shorter.as_str()) {
        return shorter.chars().count() as f64 / longer.chars().count() as f64;
    }

    let words_a = extract_words(a);
    let words_b = extract_words(b);
    let (fewer, more) = if words_a.len() < words_b.len() {
        (&words_a, &words_b)
    } else {
        (&words_b, &words_a)
    };

    if fewer.is_empty() {
        return 0.0;
    }

    let matched = fewer.iter().filter(|w| more.contains(*w)).count();
    matched as f64 / fewer.len() as f64
}

/// Score how likely two titles name the same anime
pub fn similarity(a: &str, b: &str) -> MatchResult {
    if a.to_lowercase() == b.to_lowercase() {
        return MatchResult {
            score: 1.0,
            confidence: Confidence::High,
            method: MatchMethod::Exact,
        };
    }

    if a.is_empty() || b.is_empty() {
        return MatchResult {
            score: 0.0,
            confidence: Confidence::Low,
            method: MatchMethod::InvalidInput,
        };
    }

    let norm_a = normalize_title(a);
    let norm_b = normalize_title(b);

    if norm_a == norm_b {
        return MatchResult {
            score: 0.95,
            confidence: Confidence::High,
            method: MatchMethod::NormalizedExact,
        };
    }

    let score = levenshtein_similarity(&norm_a, &norm_b) * LEVENSHTEIN_WEIGHT
        + word_similarity(a, b) * WORD_WEIGHT
        + containment_similarity(a, b) * CONTAINMENT_WEIGHT;

    MatchResult {
        score,
        confidence: confidence_for(score),
        method: MatchMethod::CombinedFuzzy,
    }
}

/// Highest-scoring candidate meeting `min_confidence`; ties keep the earliest
pub fn find_best_match<'a, S: AsRef<str>>(
    query: &str,
    candidates: &'a [S],
    min_confidence: Confidence,
) -> Option<BestMatch<'a>> {
    if query.is_empty() {
        return None;
    }

    let mut best: Option<BestMatch<'a>> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        let title = candidate.as_ref();
        let result = similarity(query, title);

        if result.confidence < min_confidence {
            continue;
        }

        let better = match &best {
            Some(current) => result.score > current.result.score,
            None => true,
        };
        if better {
            best = Some(BestMatch {
                title,
                index,
                result,
            });
        }
    }

    best
}

pub fn are_titles_similar(a: &str, b: &str, min_confidence: Confidence) -> bool {
    similarity(a, b).confidence >= min_confidence
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_strings_score_one() {
        for s in ["", "Frieren", "進撃の巨人", "Re:Zero - Starting Life in Another World"] {
            let result = similarity(s, s);
            assert_eq!(result.score, 1.0);
            assert_eq!(result.confidence, Confidence::High);
        }
    }

    #[test]
    fn test_case_insensitive_exact() {
        let result = similarity("DEATH NOTE", "death note");
        assert_eq!(result.method, MatchMethod::Exact);
        assert_eq!(result.score, 1.0);
    }

    #[test]
    fn test_normalized_exact() {
        let result = similarity("Re:Zero", "re zero");
        assert_ne!(result.method, MatchMethod::Exact);

        let result = similarity("Oshi no Ko!", "oshi no ko");
        assert_eq!(result.method, MatchMethod::NormalizedExact);
        assert_eq!(result.score, 0.95);
        assert_eq!(result.confidence, Confidence::High);
    }

    #[test]
    fn test_empty_side_is_low() {
        for a in ["Bocchi the Rock!", "x", "進撃の巨人"] {
            assert_eq!(similarity(a, "").confidence, Confidence::Low);
            assert_eq!(similarity("", a).confidence, Confidence::Low);
        }
    }

    #[test]
    fn test_levenshtein_symmetry() {
        let pairs = [
            ("kitten", "sitting"),
            ("frieren", "frieren beyond journeys end"),
            ("", "abc"),
            ("呪術廻戦", "呪術"),
        ];
        for (a, b) in pairs {
            assert_eq!(levenshtein_similarity(a, b), levenshtein_similarity(b, a));
            assert_eq!(similarity(a, b).score, similarity(b, a).score);
        }
        assert_eq!(levenshtein_similarity("", ""), 1.0);
    }

    #[test]
    fn test_word_similarity() {
        assert_eq!(word_similarity("Spy x Family", "spy family"), 1.0);
        assert_eq!(word_similarity("a", "b"), 1.0);
        let sim = word_similarity("Attack on Titan", "Attack on Titan Final Season");
        assert!((sim - 3.0 / 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_containment_similarity() {
        let sim = containment_similarity("Frieren", "Frieren Beyond");
        assert!((sim - 7.0 / 14.0).abs() < 1e-9);
        assert_eq!(containment_similarity("", "anything"), 0.0);
        let partial = containment_similarity("Titan Attack", "Attack on the Titan");
        assert_eq!(partial, 1.0);
    }

    #[test]
    fn test_confidence_thresholds() {
        assert_eq!(confidence_for(0.8), Confidence::High);
        assert_eq!(confidence_for(0.79), Confidence::Medium);
        assert_eq!(confidence_for(0.6), Confidence::Medium);
        assert_eq!(confidence_for(0.59), Confidence::Low);
    }

    #[test]
    fn test_related_titles_beat_unrelated() {
        let related = similarity("Frieren: Beyond Journey's End", "Frieren Beyond Journeys End");
        let unrelated = similarity("Frieren: Beyond Journey's End", "Chainsaw Man");
        assert!(related.score > unrelated.score);
        assert_eq!(unrelated.confidence, Confidence::Low);
    }

    #[test]
    fn test_find_best_match() {
        let candidates = vec![
            "Chainsaw Man",
            "Spy x Family Season 2",
            "Spy x Family",
        ];
        let best = find_best_match("SPY x FAMILY", &candidates, Confidence::Medium).unwrap();
        assert_eq!(best.title, "Spy x Family");
        assert_eq!(best.index, 2);
        assert_eq!(best.result.method, MatchMethod::Exact);
    }

    #[test]
    fn test_find_best_match_filters_by_confidence() {
        let candidates = vec!["Chainsaw Man"];
        assert!(find_best_match("Spy x Family", &candidates, Confidence::Medium).is_none());
        assert!(find_best_match("Spy x Family", &candidates, Confidence::Low).is_some());

        let empty: Vec<String> = Vec::new();
        assert!(find_best_match("Spy x Family", &empty, Confidence::Low).is_none());
    }

    #[test]
    fn test_find_best_match_ties_keep_first() {
        let candidates = vec!["one piece", "One Piece"];
        let best = find_best_match("ONE PIECE", &candidates, Confidence::High).unwrap();
        assert_eq!(best.index, 0);
    }

    #[test]
    fn test_are_titles_similar() {
        assert!(are_titles_similar("Oshi no Ko", "[Oshi no Ko]", Confidence::High));
        assert!(!are_titles_similar("Oshi no Ko", "Dandadan", Confidence::Medium));
        assert!(are_titles_similar("Oshi no Ko", "Dandadan", Confidence::Low));
    }
}
