/// Link detection for incoming chat messages.
///
/// Recognises links to any configured file-host domain, with or without a
/// scheme and with optional subdomains.
use regex::Regex;
use terarelay_shared::models::CandidateLink;

/// Host characters that may follow a configured domain.
const HOST_TAIL: &str = r"[a-z0-9._-]*";

/// Path/query characters allowed after the host.
const PATH_CHARS: &str = r#"[^\s<>\[\](){},"']*"#;

/// Compiled matcher for a domain allow-list.
#[derive(Debug, Clone)]
pub struct LinkMatcher {
    /// `None` when no domains are configured; matches nothing.
    pattern: Option<Regex>,
}

impl LinkMatcher {
    /// Build a matcher for the given domains.
    pub fn new<I, S>(domains: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut domains: Vec<String> = domains
            .into_iter()
            .map(|d| d.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        if domains.is_empty() {
            return Ok(Self { pattern: None });
        }

        // Longest first so "1024terabox.com" wins over "terabox.com" in the alternation.
        domains.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        domains.dedup();
        let alternation = domains
            .iter()
            .map(|d| regex::escape(d))
            .collect::<Vec<_>>()
            .join("|");

        // The host tail runs to the end of the token so a match never stops inside a host.
        let pattern = format!(
            r"(?i)(?:https?://)?(?:[a-z0-9-]+\.)*(?:{}){}(?::\d+)?(?:[/?#]{})?",
            alternation, HOST_TAIL, PATH_CHARS
        );
        Ok(Self {
            pattern: Some(Regex::new(&pattern)?),
        })
    }

    /// Lazily yield every link in `text`, in order of first occurrence.
    ///
    /// Each call starts a fresh scan.
    pub fn find_links<'a>(&'a self, text: &'a str) -> impl Iterator<Item = CandidateLink> + 'a {
        self.pattern
            .iter()
            .flat_map(move |re| re.find_iter(text))
            .filter_map(|m| {
                let trimmed = m.as_str().trim();
                if trimmed.is_empty() {
                    return None;
                }
                Some(CandidateLink {
                    raw_text_span: m.range(),
                    normalized_url: trimmed.to_string(),
                })
            })
    }

    /// Detect the first link in a message (most common case).
    pub fn first_link(&self, text: &str) -> Option<CandidateLink> {
        self.find_links(text).next()
    }

    /// Whether the text mentions any configured domain.
    pub fn contains_link(&self, text: &str) -> bool {
        self.pattern.as_ref().is_some_and(|re| re.is_match(text))
    }
}

/// One-shot helper: compile a matcher for `domains` and collect its links.
pub fn find_links<S: AsRef<str>>(text: &str, domains: &[S]) -> Result<Vec<CandidateLink>, regex::Error> {
    let matcher = LinkMatcher::new(domains.iter().map(|d| d.as_ref()))?;
    Ok(matcher.find_links(text).collect())
}
