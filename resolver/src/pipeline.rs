/// Resolution pipeline.
///
/// Drives one link through fetch, extraction, selection and (optionally)
/// download. Every transition is logged and recorded in the run history;
/// any stage failure is terminal and skips the remaining stages.
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use terarelay_shared::config::ExtractionConfig;
use terarelay_shared::errors::{ExtractionError, ResolveError, ResolveResult};
use terarelay_shared::models::{CandidateLink, PipelineState, ResolveOptions};

use crate::extractor::MetadataExtractor;
use crate::fetcher::{HttpPageFetcher, PageFetcher};
use crate::media_downloader::{HttpMediaDownloader, LocalHandle, MediaDownloader};
use crate::selector::QualitySelector;

/// Successful outcome of a run.
#[derive(Debug)]
pub struct MediaResult {
    pub selected_url: String,
    pub quality_tag: Option<String>,
    /// Present only when the download stage ran.
    pub local: Option<LocalHandle>,
    pub size_bytes: Option<u64>,
}

impl MediaResult {
    pub fn local_path(&self) -> Option<&Path> {
        self.local.as_ref().map(|h| h.path())
    }
}

/// Final state of a run plus every state it passed through.
#[derive(Debug)]
pub struct PipelineRun {
    pub state: PipelineState,
    pub history: Vec<PipelineState>,
    pub media: Option<MediaResult>,
}

impl PipelineRun {
    fn new() -> Self {
        Self {
            state: PipelineState::Fetching,
            history: vec![PipelineState::Fetching],
            media: None,
        }
    }

    fn enter(&mut self, state: PipelineState, url: &str) {
        debug!("Pipeline {} -> {} for {}", self.state, state, url);
        self.history.push(state.clone());
        self.state = state;
    }

    fn fail(mut self, error: ResolveError, url: &str) -> Self {
        info!("Resolution of {} failed in {}: {}", url, self.state, error);
        self.enter(PipelineState::Failed(error), url);
        self
    }

    pub fn is_done(&self) -> bool {
        self.state == PipelineState::Done
    }

    pub fn into_result(self) -> ResolveResult<MediaResult> {
        match (self.state, self.media) {
            (PipelineState::Failed(error), _) => Err(error),
            (_, Some(media)) => Ok(media),
            (_, None) => Err(ExtractionError::NoMetadataFound.into()),
        }
    }
}

/// Stateless driver; one instance serves any number of concurrent runs.
pub struct ResolutionPipeline {
    fetcher: Arc<dyn PageFetcher>,
    extractor: MetadataExtractor,
    selector: QualitySelector,
    downloader: Arc<dyn MediaDownloader>,
    fetch_timeout: Duration,
    size_limit: u64,
}

impl ResolutionPipeline {
    pub fn new(
        config: &ExtractionConfig,
        fetcher: Arc<dyn PageFetcher>,
        downloader: Arc<dyn MediaDownloader>,
    ) -> Result<Self, regex::Error> {
        let extractor = MetadataExtractor::new(config, fetcher.clone())?;
        Ok(Self {
            fetcher,
            extractor,
            selector: QualitySelector::new(&config.quality_preferences),
            downloader,
            fetch_timeout: config.fetch_timeout,
            size_limit: config.size_limit,
        })
    }

    /// Pipeline backed by the reqwest fetcher and downloader.
    pub fn from_config(config: &ExtractionConfig) -> anyhow::Result<Self> {
        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpPageFetcher::new()?);
        let downloader: Arc<dyn MediaDownloader> = Arc::new(HttpMediaDownloader::new(config)?);
        Ok(Self::new(config, fetcher, downloader)?)
    }

    pub fn size_limit(&self) -> u64 {
        self.size_limit
    }

    pub async fn run(&self, link: &CandidateLink, options: ResolveOptions) -> PipelineRun {
        let url = link.request_url().into_owned();
        let mut run = PipelineRun::new();
        debug!("Pipeline start for {} ({})", url, options.profile);

        let page = match self.fetcher.fetch(&url, options.profile, self.fetch_timeout).await {
            Ok(page) => page,
            Err(e) => return run.fail(e.into(), &url),
        };

        run.enter(PipelineState::Extracting, &url);
        let candidates = match self.extractor.extract(&page, &url, options.profile).await {
            Ok(candidates) => candidates,
            Err(e) => return run.fail(e.into(), &url),
        };

        run.enter(PipelineState::Selecting, &url);
        let selected = match self.selector.select(&candidates) {
            Some(candidate) => candidate.clone(),
            None => return run.fail(ExtractionError::NoMetadataFound.into(), &url),
        };
        debug!("Selected {} of {} candidate(s)", selected.url, candidates.len());

        let mut media = MediaResult {
            selected_url: selected.url,
            quality_tag: selected.inferred_quality_tag,
            local: None,
            size_bytes: None,
        };

        if options.download {
            run.enter(PipelineState::Downloading, &url);
            match self
                .downloader
                .download(&media.selected_url, options.profile, self.size_limit)
                .await
            {
                Ok(handle) => {
                    media.size_bytes = Some(handle.size_bytes());
                    media.local = Some(handle);
                }
                Err(e) => return run.fail(e.into(), &url),
            }
        }

        run.media = Some(media);
        run.enter(PipelineState::Done, &url);
        run
    }

    pub async fn resolve(&self, link: &CandidateLink, options: ResolveOptions) -> ResolveResult<MediaResult> {
        self.run(link, options).await.into_result()
    }
}
