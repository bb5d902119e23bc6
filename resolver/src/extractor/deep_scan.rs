/// Recursive media-URL search over parsed JSON.
use std::borrow::Cow;
use std::collections::HashSet;

use serde_json::Value;
use terarelay_shared::models::MediaCandidate;

/// Finds string values that look like media URLs anywhere in a JSON tree.
#[derive(Debug, Clone)]
pub struct MediaScanner {
    /// Lowercase extensions without the leading dot.
    extensions: Vec<String>,
    quality_preferences: Vec<String>,
}

impl MediaScanner {
    pub fn new(extensions: &[String], quality_preferences: &[String]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            quality_preferences: quality_preferences.to_vec(),
        }
    }

    /// All media URLs in `value`, deduplicated, in first-seen order.
    pub fn scan(&self, value: &Value) -> Vec<MediaCandidate> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        self.walk(value, &mut found, &mut seen);
        found
    }

    fn walk(&self, value: &Value, found: &mut Vec<MediaCandidate>, seen: &mut HashSet<String>) {
        match value {
            Value::String(s) => {
                let url = unescape_slashes(s);
                if self.is_media_url(&url) && seen.insert(url.to_string()) {
                    found.push(
                        MediaCandidate::new(url.into_owned())
                            .with_inferred_quality(&self.quality_preferences),
                    );
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.walk(item, found, seen);
                }
            }
            Value::Object(map) => {
                for item in map.values() {
                    self.walk(item, found, seen);
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }

    /// http(s) URL whose last path segment ends in a configured extension.
    pub fn is_media_url(&self, candidate: &str) -> bool {
        let candidate = candidate.trim();
        let lower = candidate.to_ascii_lowercase();
        let rest = match lower
            .strip_prefix("https://")
            .or_else(|| lower.strip_prefix("http://"))
        {
            Some(rest) => rest,
            None => return false,
        };

        let without_query = rest.split(['?', '#']).next().unwrap_or_default();
        let path = match without_query.split_once('/') {
            Some((host, path)) if !host.is_empty() => path,
            _ => return false,
        };
        let last_segment = path.rsplit('/').next().unwrap_or_default();
        match last_segment.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => self.extensions.iter().any(|e| e == ext),
            _ => false,
        }
    }
}

/// Undo forward-slash escapes left in page-embedded strings.
pub fn unescape_slashes(s: &str) -> Cow<'_, str> {
    if !s.contains('\\') {
        return Cow::Borrowed(s);
    }
    Cow::Owned(
        s.replace("\\u002F", "/")
            .replace("\\u002f", "/")
            .replace("\\/", "/"),
    )
}
