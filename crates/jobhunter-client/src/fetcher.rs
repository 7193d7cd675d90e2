use std::time::Duration;

use jobhunter_core::error::ProviderError;
use jobhunter_core::traits::Fetcher;
use reqwest::Client;

/// Job boards serve reduced or blocked pages to non-browser agents.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36";

/// HTTP fetcher using reqwest.
///
/// Downloads raw HTML with a browser-like User-Agent and a request timeout.
/// Clones share one connection pool.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unsupported(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    /// The underlying client, for callers that need custom headers.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), url));
        }

        response
            .text()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Failed to read response body: {e}")))
    }
}

/// Map a failed `send()` into the provider taxonomy.
pub(crate) fn map_send_error(e: reqwest::Error, timeout_secs: u64) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else if e.is_connect() {
        ProviderError::Unsupported(format!("Connection failed: {e}"))
    } else if let Some(status) = e.status() {
        ProviderError::from_status(status.as_u16(), &e.to_string())
    } else {
        ProviderError::Unsupported(e.to_string())
    }
}
