// Canonical platform labels for streaming URLs

use reqwest::Url;

pub const UNKNOWN_PLATFORM: &str = "Unknown Platform";

/// Domain -> label, checked in order
const PLATFORM_DOMAINS: &[(&str, &str)] = &[
    ("crunchyroll.com", "Crunchyroll"),
    ("funimation.com", "Funimation"),
    ("netflix.com", "Netflix"),
    ("hulu.com", "Hulu"),
    ("vrv.co", "VRV"),
    ("hidive.com", "Hidive"),
    ("amazon.com", "Amazon Prime"),
    ("primevideo.com", "Amazon Prime"),
    ("disney.com", "Disney+"),
    ("disneyplus.com", "Disney+"),
    ("tubi.tv", "Tubi"),
    ("youtube.com", "YouTube"),
];

/// Map a streaming URL to a platform label.
/// Unmapped hosts fall back to their capitalized first label;
/// unparseable URLs give [`UNKNOWN_PLATFORM`].
pub fn platform_name(url: &str) -> String {
    let host = match Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
    {
        Some(host) if !host.is_empty() => host,
        _ => return UNKNOWN_PLATFORM.to_string(),
    };

    for (domain, name) in PLATFORM_DOMAINS {
        if host == *domain || host.ends_with(&format!(".{}", domain)) {
            return (*name).to_string();
        }
    }

    let host = host.strip_prefix("www.").unwrap_or(&host);
    let label = host.split('.').next().unwrap_or_default();
    capitalize(label)
}

pub fn is_known(name: &str) -> bool {
    name != UNKNOWN_PLATFORM && !name.is_empty()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapped_domains() {
        assert_eq!(
            platform_name("https://www.crunchyroll.com/series/GG5H5XQX4/frieren"),
            "Crunchyroll"
        );
        assert_eq!(platform_name("https://www.primevideo.com/detail/0ABC"), "Amazon Prime");
        assert_eq!(platform_name("https://www.disneyplus.com/series/x"), "Disney+");
        assert_eq!(platform_name("http://tubi.tv/series/300"), "Tubi");
        assert_eq!(platform_name("https://WWW.NETFLIX.COM/title/81726714"), "Netflix");
    }

    #[test]
    fn test_unmapped_domain_uses_first_label() {
        assert_eq!(platform_name("https://www.bilibili.tv/en/play/1"), "Bilibili");
        assert_eq!(platform_name("https://retrocrush.tv/watch/1"), "Retrocrush");
    }

    #[test]
    fn test_lookalike_domain_is_not_mapped() {
        assert_eq!(platform_name("https://notnetflix.com/x"), "Notnetflix");
    }

    #[test]
    fn test_unparseable_url() {
        assert_eq!(platform_name("not a url"), UNKNOWN_PLATFORM);
        assert_eq!(platform_name(""), UNKNOWN_PLATFORM);
        assert!(!is_known(&platform_name("/relative/path")));
    }
}
