/// Media metadata extraction.
///
/// Runs an ordered chain of strategies over a fetched page and stops at the
/// first one that yields media URLs:
///
/// 1. [`EmbeddedObjectStrategy`] - JSON literal assigned to a script global
/// 2. [`ShortLinkApiStrategy`] - API call keyed by the short-link query token
/// 3. [`MarkerPairApiStrategy`] - API call keyed by two numeric page markers
///
/// The target page format is uncontrolled, so every strategy is best-effort.
/// The only guarantee is that the first non-empty result wins and that an
/// empty result is never reported as success.
pub mod api;
pub mod deep_scan;
pub mod embedded;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use terarelay_shared::config::ExtractionConfig;
use terarelay_shared::errors::ExtractionError;
use terarelay_shared::models::{FetchResult, HeaderProfile, MediaCandidate};

use crate::fetcher::PageFetcher;
pub use api::{MarkerPairApiStrategy, ShortLinkApiStrategy};
pub use deep_scan::MediaScanner;
pub use embedded::EmbeddedObjectStrategy;

/// Inputs shared by every strategy for one page.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionContext<'a> {
    pub fetch: &'a FetchResult,
    /// Link as the user sent it, before redirects.
    pub original_url: &'a str,
    /// Profile used for the page; secondary requests reuse it.
    pub profile: HeaderProfile,
}

/// Result of one strategy attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    /// Non-empty, deduplicated candidates.
    Found(Vec<MediaCandidate>),
    /// Marker absent, request failed, or nothing media-like inside.
    NotApplicable,
    /// Marker present but its payload did not parse.
    Malformed(String),
}

#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn attempt(&self, ctx: &ExtractionContext<'_>) -> StrategyOutcome;
}

/// Ordered strategy chain.
pub struct MetadataExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl MetadataExtractor {
    /// Build the standard three-strategy chain from configuration.
    pub fn new(config: &ExtractionConfig, fetcher: Arc<dyn PageFetcher>) -> Result<Self, regex::Error> {
        let scanner = MediaScanner::new(&config.media_extensions, &config.quality_preferences);

        let embedded = EmbeddedObjectStrategy::new(&config.embedded_markers, scanner.clone())?;
        let short_link = ShortLinkApiStrategy::new(
            fetcher.clone(),
            scanner.clone(),
            &config.short_link_params,
            &config.short_link_api_template,
            config.fetch_timeout,
        );
        let marker_pair = MarkerPairApiStrategy::new(
            fetcher,
            scanner,
            (config.marker_fields.0.as_str(), config.marker_fields.1.as_str()),
            &config.marker_api_template,
            config.fetch_timeout,
        )?;

        Ok(Self::with_strategies(vec![
            Box::new(embedded),
            Box::new(short_link),
            Box::new(marker_pair),
        ]))
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run the chain. Fails with `MalformedMetadata` if every strategy came
    /// up empty and at least one hit an unparseable payload, otherwise
    /// `NoMetadataFound`.
    pub async fn extract(
        &self,
        fetch: &FetchResult,
        original_url: &str,
        profile: HeaderProfile,
    ) -> Result<Vec<MediaCandidate>, ExtractionError> {
        let ctx = ExtractionContext {
            fetch,
            original_url,
            profile,
        };
        let mut malformed: Option<String> = None;

        for strategy in &self.strategies {
            match strategy.attempt(&ctx).await {
                StrategyOutcome::Found(candidates) if !candidates.is_empty() => {
                    debug!(
                        "Strategy {} found {} candidate(s) for {}",
                        strategy.name(),
                        candidates.len(),
                        original_url
                    );
                    return Ok(candidates);
                }
                StrategyOutcome::Found(_) | StrategyOutcome::NotApplicable => {
                    debug!("Strategy {} found nothing", strategy.name());
                }
                StrategyOutcome::Malformed(reason) => {
                    debug!("Strategy {} hit malformed metadata: {}", strategy.name(), reason);
                    malformed.get_or_insert(reason);
                }
            }
        }

        Err(match malformed {
            Some(reason) => ExtractionError::MalformedMetadata(reason),
            None => ExtractionError::NoMetadataFound,
        })
    }
}
