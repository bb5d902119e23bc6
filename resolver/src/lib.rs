/// Terarelay resolution engine.
///
/// Turns a share link into a playable media URL and, optionally, a local
/// file:
///
/// - [`link_matcher`] finds candidate links in chat text
/// - [`fetcher`] retrieves pages with a desktop or mobile header profile
/// - [`extractor`] runs the ordered metadata strategy chain
/// - [`selector`] picks one candidate by quality preference
/// - [`media_downloader`] streams the pick into a size-bounded temp file
/// - [`pipeline`] drives the stages as a state machine
/// - [`worker`] runs pipelines on a bounded pool and reports over a channel
pub mod extractor;
pub mod fetcher;
pub mod link_matcher;
pub mod media_downloader;
pub mod pipeline;
pub mod selector;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use extractor::MetadataExtractor;
pub use fetcher::{HttpPageFetcher, PageFetcher};
pub use link_matcher::LinkMatcher;
pub use media_downloader::{HttpMediaDownloader, LocalHandle, MediaDownloader};
pub use pipeline::{MediaResult, PipelineRun, ResolutionPipeline};
pub use selector::QualitySelector;
pub use worker::{ResolutionJob, ResolutionReport, ResolverPool};
