/// Secondary-API strategies.
///
/// Both build an API URL from a configured template, fetch it with the same
/// header profile as the page, and deep-scan the JSON response.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use terarelay_shared::config::TOKEN_PLACEHOLDER;
use terarelay_shared::models::HeaderProfile;

use super::deep_scan::MediaScanner;
use super::{ExtractionContext, ExtractionStrategy, StrategyOutcome};
use crate::fetcher::PageFetcher;

/// Shared fetch-parse-scan step.
async fn fetch_and_scan(
    fetcher: &dyn PageFetcher,
    scanner: &MediaScanner,
    api_url: &str,
    profile: HeaderProfile,
    timeout: Duration,
) -> StrategyOutcome {
    let response = match fetcher.fetch(api_url, profile, timeout).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Secondary API request failed: {}", e);
            return StrategyOutcome::NotApplicable;
        }
    };

    match serde_json::from_str::<serde_json::Value>(&response.body_text) {
        Ok(value) => {
            let found = scanner.scan(&value);
            if found.is_empty() {
                debug!("API response from {} holds no media URLs", api_url);
                StrategyOutcome::NotApplicable
            } else {
                StrategyOutcome::Found(found)
            }
        }
        Err(e) => StrategyOutcome::Malformed(format!("API response is not JSON: {}", e)),
    }
}

/// Short-link token from the query string of the resolved URL, falling
/// back to the original link.
pub struct ShortLinkApiStrategy {
    fetcher: Arc<dyn PageFetcher>,
    scanner: MediaScanner,
    params: Vec<String>,
    template: String,
    timeout: Duration,
}

impl ShortLinkApiStrategy {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        scanner: MediaScanner,
        params: &[String],
        template: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            scanner,
            params: params.to_vec(),
            template: template.to_string(),
            timeout,
        }
    }

    /// First configured query parameter with a non-empty value in `url`.
    pub fn token_from(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        self.params.iter().find_map(|param| {
            parsed
                .query_pairs()
                .find(|(key, value)| key == param.as_str() && !value.is_empty())
                .map(|(_, value)| value.into_owned())
        })
    }

    pub fn api_url(&self, token: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(token.as_bytes()).collect();
        self.template.replace(TOKEN_PLACEHOLDER, &encoded)
    }
}

#[async_trait]
impl ExtractionStrategy for ShortLinkApiStrategy {
    fn name(&self) -> &'static str {
        "short_link_api"
    }

    async fn attempt(&self, ctx: &ExtractionContext<'_>) -> StrategyOutcome {
        let token = match self
            .token_from(&ctx.fetch.final_url)
            .or_else(|| self.token_from(ctx.original_url))
        {
            Some(token) => token,
            None => return StrategyOutcome::NotApplicable,
        };

        let api_url = self.api_url(&token);
        debug!("Short-link token {} -> {}", token, api_url);
        fetch_and_scan(self.fetcher.as_ref(), &self.scanner, &api_url, ctx.profile, self.timeout).await
    }
}

/// Two numeric page fields (e.g. `shareid` and `uk`) feeding a second API.
pub struct MarkerPairApiStrategy {
    fetcher: Arc<dyn PageFetcher>,
    scanner: MediaScanner,
    fields: [(String, Regex); 2],
    template: String,
    timeout: Duration,
}

impl MarkerPairApiStrategy {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        scanner: MediaScanner,
        fields: (&str, &str),
        template: &str,
        timeout: Duration,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            fetcher,
            scanner,
            fields: [field_pattern(fields.0)?, field_pattern(fields.1)?],
            template: template.to_string(),
            timeout,
        })
    }

    /// Values of both markers, or `None` unless both are present.
    pub fn markers_in(&self, body: &str) -> Option<[(String, String); 2]> {
        let [first, second] = &self.fields;
        let find = |(name, re): &(String, Regex)| {
            re.captures(body).map(|cap| (name.clone(), cap[1].to_string()))
        };
        Some([find(first)?, find(second)?])
    }

    pub fn api_url(&self, markers: &[(String, String); 2]) -> String {
        markers.iter().fold(self.template.clone(), |url, (name, value)| {
            url.replace(&format!("{{{}}}", name), value)
        })
    }
}

fn field_pattern(name: &str) -> Result<(String, Regex), regex::Error> {
    let re = Regex::new(&format!(
        r#"["']?\b{}["']?\s*[:=]\s*["']?(\d+)"#,
        regex::escape(name)
    ))?;
    Ok((name.to_string(), re))
}

#[async_trait]
impl ExtractionStrategy for MarkerPairApiStrategy {
    fn name(&self) -> &'static str {
        "marker_pair_api"
    }

    async fn attempt(&self, ctx: &ExtractionContext<'_>) -> StrategyOutcome {
        let markers = match self.markers_in(&ctx.fetch.body_text) {
            Some(markers) => markers,
            None => return StrategyOutcome::NotApplicable,
        };

        let api_url = self.api_url(&markers);
        debug!("Page markers {:?} -> {}", markers, api_url);
        fetch_and_scan(self.fetcher.as_ref(), &self.scanner, &api_url, ctx.profile, self.timeout).await
    }
}
