/// Data model shared by the resolver pipeline and the bot.
use std::borrow::Cow;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::errors::ResolveError;

/// A link found inside a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateLink {
    /// Byte range of the match inside the source text.
    pub raw_text_span: Range<usize>,
    /// The matched text, whitespace-trimmed.
    pub normalized_url: String,
}

impl CandidateLink {
    /// URL to request. Links typed without a scheme are fetched over https.
    pub fn request_url(&self) -> Cow<'_, str> {
        let url = self.normalized_url.as_str();
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Cow::Borrowed(url)
        } else {
            Cow::Owned(format!("https://{}", url))
        }
    }
}

/// Raw page content returned by a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Location after following redirects.
    pub final_url: String,
    pub body_text: String,
    pub status: u16,
}

/// A media URL found in page metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaCandidate {
    pub url: String,
    pub inferred_quality_tag: Option<String>,
}

impl MediaCandidate {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            inferred_quality_tag: None,
        }
    }

    /// Tag the candidate with the first preference tag its URL contains.
    pub fn with_inferred_quality(mut self, preferences: &[String]) -> Self {
        self.inferred_quality_tag = preferences
            .iter()
            .find(|tag| self.url.contains(tag.as_str()))
            .cloned();
        self
    }
}

/// Client class presented to the file host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderProfile {
    Desktop,
    Mobile,
}

impl HeaderProfile {
    pub fn user_agent(&self) -> &'static str {
        match self {
            HeaderProfile::Desktop => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36"
            }
            HeaderProfile::Mobile => {
                "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Mobile Safari/537.36"
            }
        }
    }

    pub fn accept(&self) -> &'static str {
        match self {
            HeaderProfile::Desktop => {
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
            }
            HeaderProfile::Mobile => "text/html,application/xhtml+xml,*/*;q=0.8",
        }
    }

    pub fn accept_language(&self) -> &'static str {
        "en-US,en;q=0.9"
    }

    /// The other profile, for callers that retry with a different client class.
    pub fn alternate(&self) -> Self {
        match self {
            HeaderProfile::Desktop => HeaderProfile::Mobile,
            HeaderProfile::Mobile => HeaderProfile::Desktop,
        }
    }
}

impl std::fmt::Display for HeaderProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeaderProfile::Desktop => write!(f, "desktop"),
            HeaderProfile::Mobile => write!(f, "mobile"),
        }
    }
}

impl std::str::FromStr for HeaderProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "desktop" => Ok(HeaderProfile::Desktop),
            "mobile" => Ok(HeaderProfile::Mobile),
            other => Err(format!("unknown header profile '{}'", other)),
        }
    }
}

/// Per-run options chosen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    pub profile: HeaderProfile,
    /// Skip the download stage and return only the selected URL when false.
    pub download: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            profile: HeaderProfile::Desktop,
            download: true,
        }
    }
}

/// Pipeline state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Fetching,
    Extracting,
    Selecting,
    Downloading,
    Done,
    Failed(ResolveError),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Fetching => write!(f, "fetching"),
            PipelineState::Extracting => write!(f, "extracting"),
            PipelineState::Selecting => write!(f, "selecting"),
            PipelineState::Downloading => write!(f, "downloading"),
            PipelineState::Done => write!(f, "done"),
            PipelineState::Failed(e) => write!(f, "failed ({})", e.kind()),
        }
    }
}
