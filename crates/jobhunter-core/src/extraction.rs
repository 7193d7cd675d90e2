use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::ProviderError;
use crate::models::{ProviderMethod, RawRecord, SearchCriteria};
use crate::template::UrlTemplate;
use crate::traits::{Cleaner, Extractor, Fetcher, SourceProvider};

const FIELDS: [&str; 6] = ["title", "company", "location", "posted", "url", "description"];

/// Output schema requested from the model, in the strict subset accepted by
/// structured-output endpoints (object root, every field required, nullable
/// strings).
pub fn job_request_schema() -> serde_json::Value {
    let properties: serde_json::Map<String, serde_json::Value> = FIELDS
        .iter()
        .map(|f| (f.to_string(), serde_json::json!({"type": ["string", "null"]})))
        .collect();
    serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["jobs"],
        "properties": {
            "jobs": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": FIELDS,
                    "properties": properties
                }
            }
        }
    })
}

/// Provider that reads a listing page through an LLM: fetch → clean → extract.
///
/// Generic over all external dependencies via traits, so it runs with mocks
/// in tests and with real HTTP, htmd and chat-completion clients in the
/// binary. The LLM answer is returned whole as one [`RawRecord::Extracted`];
/// it is untrusted until the normalizer has validated it.
pub struct LlmExtractionProvider<F, C, E>
where
    F: Fetcher,
    C: Cleaner,
    E: Extractor,
{
    fetcher: F,
    cleaner: C,
    extractor: E,
    template: UrlTemplate,
    model_name: String,
}

impl<F, C, E> LlmExtractionProvider<F, C, E>
where
    F: Fetcher,
    C: Cleaner,
    E: Extractor,
{
    pub fn new(
        fetcher: F,
        cleaner: C,
        extractor: E,
        template: UrlTemplate,
        model_name: String,
    ) -> Self {
        Self {
            fetcher,
            cleaner,
            extractor,
            template,
            model_name,
        }
    }
}

#[async_trait]
impl<F, C, E> SourceProvider for LlmExtractionProvider<F, C, E>
where
    F: Fetcher + 'static,
    C: Cleaner + 'static,
    E: Extractor + 'static,
{
    fn method(&self) -> ProviderMethod {
        ProviderMethod::LlmExtraction
    }

    async fn fetch(&self, criteria: &SearchCriteria) -> Result<Vec<RawRecord>, ProviderError> {
        let url = self.template.expand(criteria)?;

        tracing::info!(%url, "Fetching page for extraction");
        let html = self.fetcher.fetch(&url).await?;

        let markdown = self.cleaner.clean(&html)?;
        tracing::debug!(
            html_bytes = html.len(),
            markdown_bytes = markdown.len(),
            "Cleaned page"
        );

        tracing::info!(model = %self.model_name, "Extracting job listings");
        let extracted = self.extractor.extract(&markdown, &job_request_schema()).await?;

        Ok(vec![RawRecord::Extracted(cap_jobs(
            extracted,
            criteria.max_results,
        ))])
    }

    fn base_url(&self, criteria: &SearchCriteria) -> Option<Url> {
        self.template.base_url(criteria)
    }
}

/// Keep at most `max` listings of an answer shaped as `{"jobs": [...]}` or a
/// bare array, decoding a stringified document first. Other shapes pass
/// through for the normalizer to reject.
fn cap_jobs(value: Value, max: usize) -> Value {
    let mut value = match value {
        Value::String(s) => match serde_json::from_str(&s) {
            Ok(parsed) => parsed,
            Err(_) => return Value::String(s),
        },
        other => other,
    };
    match &mut value {
        Value::Array(items) => items.truncate(max),
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get_mut("jobs") {
                items.truncate(max);
            }
        }
        _ => {}
    }
    value
}
