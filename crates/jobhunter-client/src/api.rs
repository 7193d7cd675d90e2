use async_trait::async_trait;
use jobhunter_core::config::ApiConfig;
use jobhunter_core::error::ProviderError;
use jobhunter_core::models::{ProviderMethod, RawRecord, SearchCriteria};
use jobhunter_core::template::UrlTemplate;
use jobhunter_core::traits::SourceProvider;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::fetcher::{ReqwestFetcher, map_send_error};

/// Provider for job boards with a JSON search endpoint.
pub struct JsonApiProvider {
    client: Client,
    timeout_secs: u64,
    template: UrlTemplate,
    items_pointer: String,
    /// Resolved at build time; an unresolvable credential fails every call.
    headers: Result<Vec<(String, String)>, ProviderError>,
}

impl JsonApiProvider {
    /// `headers` are already resolved against the environment.
    pub fn new(
        http: &ReqwestFetcher,
        config: &ApiConfig,
        headers: Result<Vec<(String, String)>, ProviderError>,
    ) -> Self {
        Self {
            client: http.client().clone(),
            timeout_secs: http.timeout_secs(),
            template: UrlTemplate::new(config.url_template.clone()),
            items_pointer: config.items_pointer.clone(),
            headers,
        }
    }
}

#[async_trait]
impl SourceProvider for JsonApiProvider {
    fn method(&self) -> ProviderMethod {
        ProviderMethod::Api
    }

    async fn fetch(&self, criteria: &SearchCriteria) -> Result<Vec<RawRecord>, ProviderError> {
        let headers = self.headers.clone()?;
        let url = self.template.expand(criteria)?;
        tracing::info!(%url, "Querying job API");

        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json");
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), &url));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Failed to read response body: {e}")))?;

        items_at(&body, &self.items_pointer, criteria.max_results)
    }

    fn base_url(&self, criteria: &SearchCriteria) -> Option<Url> {
        self.template.base_url(criteria)
    }
}

/// Pull the item array out of a JSON body.
fn items_at(body: &str, pointer: &str, max_results: usize) -> Result<Vec<RawRecord>, ProviderError> {
    let document: Value = serde_json::from_str(body)?;
    let items = if pointer.is_empty() {
        &document
    } else {
        document
            .pointer(pointer)
            .ok_or_else(|| ProviderError::ParseError(format!("no value at {pointer}")))?
    };
    let Value::Array(items) = items else {
        return Err(ProviderError::ParseError(format!(
            "expected an array at '{pointer}'"
        )));
    };
    Ok(items
        .iter()
        .take(max_results)
        .cloned()
        .map(RawRecord::Structured)
        .collect())
}
