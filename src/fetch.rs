use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING};
use tracing::{info, warn};

use crate::config;
use crate::error::FetchError;

/// HTTP client for the source pages: fixed headers, request timeout and a
/// bounded exponential backoff on retryable failures.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    max_retries: u32,
    base_backoff: Duration,
}

impl Fetcher {
    pub fn new(settings: &config::Fetch) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        // Plain text only; the extractors work on the raw markup.
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/html"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Fetcher {
            client,
            max_retries: settings.max_retries,
            base_backoff: Duration::from_millis(settings.backoff_ms),
        })
    }

    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let backoff = self.base_backoff * 2u32.pow(attempt);
                    warn!(
                        "Fetch of {} failed (attempt {}/{}): {}; backing off {:.1}s",
                        url,
                        attempt + 1,
                        self.max_retries,
                        e,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };

        let start = Instant::now();
        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(transport)?;
        info!(
            "Fetched {} ({} bytes in {} ms)",
            url,
            body.len(),
            start.elapsed().as_millis()
        );
        Ok(body)
    }
}
