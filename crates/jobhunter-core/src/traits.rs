use std::future::Future;

use async_trait::async_trait;
use url::Url;

use crate::error::{AppError, ProviderError};
use crate::models::{ProviderMethod, RawRecord, RunResult, SearchCriteria};

/// One retrieval strategy for one job source.
///
/// Object safe so that a source's fallback chain can mix provider types.
/// Implementations must be read-only with respect to the outside world:
/// calling `fetch` twice is always safe.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    fn method(&self) -> ProviderMethod;

    /// Fetch raw candidates for the given criteria, at most
    /// `criteria.max_results` of them.
    async fn fetch(&self, criteria: &SearchCriteria) -> Result<Vec<RawRecord>, ProviderError>;

    /// Page URL that relative posting links in this provider's output
    /// resolve against, for the same criteria passed to `fetch`.
    fn base_url(&self, _criteria: &SearchCriteria) -> Option<Url> {
        None
    }
}

/// Fetches raw page content (HTML) from a URL.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, ProviderError>> + Send;
}

/// Converts raw HTML into compact text suitable for an LLM prompt.
pub trait Cleaner: Send + Sync + Clone {
    fn clean(&self, html: &str) -> Result<String, ProviderError>;
}

/// Extracts structured JSON data from text content using an LLM.
pub trait Extractor: Send + Sync + Clone {
    /// Sends the content and JSON schema to the LLM and returns extracted JSON.
    fn extract(
        &self,
        content: &str,
        schema: &serde_json::Value,
    ) -> impl Future<Output = Result<serde_json::Value, ProviderError>> + Send;
}

/// Consumes the final run result (notification, file, stdout, ...).
pub trait ResultSink: Send + Sync {
    fn deliver(&self, result: &RunResult) -> impl Future<Output = Result<(), AppError>> + Send;
}
