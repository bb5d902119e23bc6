/// Page retrieval with client-class header profiles.
///
/// The file host serves different markup to desktop and mobile clients, so
/// every request carries the headers of the chosen [`HeaderProfile`].
/// Redirects are followed and the post-redirect URL is reported, since
/// short-link tokens often only appear after the redirect.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::Client;
use tracing::debug;

use terarelay_shared::errors::FetchError;
use terarelay_shared::models::{FetchResult, HeaderProfile};

const MAX_REDIRECTS: usize = 10;

/// Source of raw page content. Never retries; retry policy belongs to callers.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        profile: HeaderProfile,
        timeout: Duration,
    ) -> Result<FetchResult, FetchError>;
}

/// reqwest-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(Policy::limited(MAX_REDIRECTS))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client (shared connection pool).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// Request headers for a profile.
pub fn profile_headers(profile: HeaderProfile) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(profile.user_agent()));
    headers.insert(ACCEPT, HeaderValue::from_static(profile.accept()));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(profile.accept_language()));
    headers
}

fn classify_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout { url: url.to_string() }
    } else if let Some(status) = err.status() {
        FetchError::Http {
            url: url.to_string(),
            status: status.as_u16(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(
        &self,
        url: &str,
        profile: HeaderProfile,
        timeout: Duration,
    ) -> Result<FetchResult, FetchError> {
        debug!("Fetching {} as {}", url, profile);

        let response = self
            .client
            .get(url)
            .headers(profile_headers(profile))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            return Err(FetchError::Http {
                url: final_url,
                status: status.as_u16(),
            });
        }

        let body_text = response.text().await.map_err(|e| classify_error(url, e))?;
        debug!("Fetched {} -> {} ({} bytes)", url, final_url, body_text.len());

        Ok(FetchResult {
            final_url,
            body_text,
            status: status.as_u16(),
        })
    }
}
