use std::collections::HashSet;
use url::Url;

/// Splits raw text into lines and keeps the ones that are http(s) URLs, dropping
/// duplicates while preserving the order they first appeared in.
pub fn normalize_urls(raw: &str) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut urls: Vec<String> = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || !is_valid_url(trimmed) {
            continue;
        }
        if seen.insert(trimmed) {
            urls.push(trimmed.to_string());
        }
    }
    urls
}

pub fn is_valid_url(value: &str) -> bool {
    let Ok(url) = Url::parse(value) else {
        return false;
    };
    matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty())
}

/// Reduces a URL to its origin so job logs never carry video ids or query strings.
pub fn redact_url_for_log(value: &str) -> String {
    match Url::parse(value.trim()) {
        Ok(url) => match url.host_str() {
            Some(host) => format!("{}://{}/<redacted>", url.scheme(), host),
            None => format!("{}://<redacted>", url.scheme()),
        },
        Err(_) => "[invalid-url]".to_string(),
    }
}
