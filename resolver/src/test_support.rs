/// Test doubles shared by the unit tests.
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use terarelay_shared::errors::FetchError;
use terarelay_shared::models::{FetchResult, HeaderProfile};

use crate::fetcher::PageFetcher;

/// Canned responses keyed by URL. Unknown URLs fail with HTTP 404.
#[derive(Default)]
pub struct StubFetcher {
    responses: HashMap<String, Result<FetchResult, FetchError>>,
    calls: Mutex<Vec<(String, HeaderProfile)>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(final_url: &str, body: &str) -> FetchResult {
        FetchResult {
            final_url: final_url.to_string(),
            body_text: body.to_string(),
            status: 200,
        }
    }

    pub fn with_page(self, url: &str, body: &str) -> Self {
        self.with_redirect(url, url, body)
    }

    pub fn with_redirect(mut self, url: &str, final_url: &str, body: &str) -> Self {
        self.responses
            .insert(url.to_string(), Ok(Self::page(final_url, body)));
        self
    }

    pub fn with_error(mut self, url: &str, error: FetchError) -> Self {
        self.responses.insert(url.to_string(), Err(error));
        self
    }

    pub fn calls(&self) -> Vec<(String, HeaderProfile)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(
        &self,
        url: &str,
        profile: HeaderProfile,
        _timeout: Duration,
    ) -> Result<FetchResult, FetchError> {
        self.calls.lock().unwrap().push((url.to_string(), profile));
        self.responses.get(url).cloned().unwrap_or_else(|| {
            Err(FetchError::Http {
                url: url.to_string(),
                status: 404,
            })
        })
    }
}
