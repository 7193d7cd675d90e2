use std::time::Duration;

use jobhunter_core::error::ProviderError;
use jobhunter_core::traits::Extractor;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::fetcher::map_send_error;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_SYSTEM_PROMPT: &str = "You extract job postings from job board pages. Return every actual job listing on the page with its title, company, location, posting date exactly as shown, link, and a one-sentence description. Use null for fields that are not shown. Respond ONLY with JSON matching the requested schema.";

/// OpenAI-compatible LLM client for job list extraction.
///
/// Works with any OpenAI-compatible API, including:
/// - OpenAI directly (`https://api.openai.com/v1`)
/// - Gemini via compatibility layer (`https://generativelanguage.googleapis.com/v1beta/openai`)
#[derive(Clone)]
pub struct OpenAiExtractor {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
    system_prompt: String,
}

impl OpenAiExtractor {
    pub fn new(api_key: &str, model: &str) -> Result<Self, ProviderError> {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Result<Self, ProviderError> {
        Self::build(api_key, model, base_url, DEFAULT_LLM_TIMEOUT)
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, ProviderError> {
        let prompt = self.system_prompt.clone();
        Ok(Self::build(&self.api_key, &self.model, &self.base_url, timeout)?.with_system_prompt(prompt))
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unsupported(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout_secs: timeout.as_secs(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        })
    }

    fn request(&self, content: &str, schema: &serde_json::Value) -> Result<ChatRequest, ProviderError> {
        Ok(ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: self.system_prompt.clone(),
                },
                Message {
                    role: "user".to_string(),
                    content: format!(
                        "Extract job listings according to this JSON schema:\n```json\n{}\n```\n\nFrom the following page content:\n\n{}",
                        serde_json::to_string_pretty(schema)?,
                        content
                    ),
                },
            ],
            temperature: 0.3,
            response_format: Some(ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: Some(JsonSchemaWrapper {
                    name: "job_listings".to_string(),
                    strict: true,
                    schema: schema.clone(),
                }),
            }),
        })
    }
}

// ---- OpenAI API types ----

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    json_schema: Option<JsonSchemaWrapper>,
}

#[derive(Serialize)]
struct JsonSchemaWrapper {
    name: String,
    strict: bool,
    schema: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Map a non-2xx chat completion response into the provider taxonomy.
fn api_error(status_code: u16, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ApiError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());
    match status_code {
        429 => ProviderError::RateLimited(message),
        401 | 403 => ProviderError::AuthFailed(message),
        _ => ProviderError::Unsupported(format!("LLM HTTP {status_code}: {message}")),
    }
}

impl Extractor for OpenAiExtractor {
    /// Returns the parsed JSON answer. An answer that is not JSON is
    /// returned as a string value so the normalizer can reject it.
    async fn extract(
        &self,
        content: &str,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.request(content, schema)?;

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse LLM response: {e}")))?;

        let content_str = chat_response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| ProviderError::ParseError("Empty response from LLM".into()))?;

        match serde_json::from_str(content_str) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(error = %e, "LLM returned non-JSON content");
                Ok(serde_json::Value::String(content_str.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_api_errors() {
        let body = r#"{"error": {"message": "Incorrect API key provided"}}"#;
        match api_error(401, body) {
            ProviderError::AuthFailed(msg) => assert_eq!(msg, "Incorrect API key provided"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(api_error(429, ""), ProviderError::RateLimited(_)));
        assert!(matches!(
            api_error(503, "<html>overloaded</html>"),
            ProviderError::Unsupported(_)
        ));
    }

    #[test]
    fn request_carries_schema_and_content() {
        let extractor = OpenAiExtractor::with_base_url("k", "test-model", "http://localhost/v1/").unwrap();
        let schema = serde_json::json!({"type": "object"});
        let request = extractor.request("## Engineer at Acme", &schema).unwrap();
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "test-model");
        assert_eq!(json["response_format"]["type"], "json_schema");
        assert_eq!(json["response_format"]["json_schema"]["schema"], schema);
        assert!(
            json["messages"][1]["content"]
                .as_str()
                .unwrap()
                .contains("## Engineer at Acme")
        );
        assert_eq!(extractor.base_url, "http://localhost/v1");
    }
}
