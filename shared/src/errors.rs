/// Error taxonomy for the resolution pipeline.
///
/// Every stage fails closed with its own error type; `ResolveError` wraps
/// whichever stage failed. Variants carry short detail strings instead of
/// source errors so pipeline states stay `Clone` and comparable.
use thiserror::Error;

/// Page and secondary API fetch failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("HTTP {status} fetching {url}")]
    Http { url: String, status: u16 },

    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },
}

/// Metadata extraction failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("No media metadata found on page")]
    NoMetadataFound,

    #[error("Media metadata could not be parsed: {0}")]
    MalformedMetadata(String),
}

/// Media download failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    #[error("HTTP {status} downloading {url}")]
    Http { url: String, status: u16 },

    #[error("Download exceeded size limit of {limit} bytes ({received} bytes received)")]
    SizeExceeded { limit: u64, received: u64 },

    #[error("Network error downloading {url}: {message}")]
    Network { url: String, message: String },

    #[error("Download of {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    #[error("IO error writing download: {0}")]
    Io(String),
}

/// Terminal failure of a pipeline run, tagged with the failing stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),
}

impl ResolveError {
    /// Stable kind name, used in logs and task tracking.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::Fetch(FetchError::Timeout { .. }) => "fetch_timeout",
            ResolveError::Fetch(FetchError::Http { .. }) => "fetch_http",
            ResolveError::Fetch(FetchError::Network { .. }) => "fetch_network",
            ResolveError::Extraction(ExtractionError::NoMetadataFound) => "no_metadata_found",
            ResolveError::Extraction(ExtractionError::MalformedMetadata(_)) => "malformed_metadata",
            ResolveError::Download(DownloadError::Http { .. }) => "download_http",
            ResolveError::Download(DownloadError::SizeExceeded { .. }) => "size_exceeded",
            ResolveError::Download(DownloadError::Network { .. }) => "download_network",
            ResolveError::Download(DownloadError::Timeout { .. }) => "download_timeout",
            ResolveError::Download(DownloadError::Io(_)) => "download_io",
        }
    }

    /// Static message safe to show to chat users. Never includes raw error text.
    pub fn user_hint(&self) -> &'static str {
        match self {
            ResolveError::Fetch(FetchError::Timeout { .. }) => {
                "The file host took too long to answer. Try again in a moment."
            }
            ResolveError::Fetch(FetchError::Http { .. }) => {
                "The file host refused the page request. The link may be expired or private."
            }
            ResolveError::Fetch(FetchError::Network { .. }) => {
                "Could not reach the file host."
            }
            ResolveError::Extraction(ExtractionError::NoMetadataFound) => {
                "Could not extract a video link from this page."
            }
            ResolveError::Extraction(ExtractionError::MalformedMetadata(_)) => {
                "The page layout was not understood. The host may have changed its format."
            }
            ResolveError::Download(DownloadError::Http { .. }) => {
                "The video server refused the download."
            }
            ResolveError::Download(DownloadError::SizeExceeded { .. }) => {
                "The video is larger than the download limit."
            }
            ResolveError::Download(DownloadError::Network { .. }) => {
                "The download was interrupted."
            }
            ResolveError::Download(DownloadError::Timeout { .. }) => {
                "The download took too long and was stopped."
            }
            ResolveError::Download(DownloadError::Io(_)) => {
                "The file could not be stored on the server."
            }
        }
    }

    /// Whether re-running with the other header profile may help: the host
    /// serves different markup per client class.
    pub fn suggests_alternate_profile(&self) -> bool {
        matches!(
            self,
            ResolveError::Extraction(_)
                | ResolveError::Fetch(FetchError::Http { status: 403 | 404, .. })
        )
    }
}

/// Configuration loading errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Result type alias for pipeline operations.
pub type ResolveResult<T> = Result<T, ResolveError>;
