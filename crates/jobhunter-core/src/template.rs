use url::Url;

use crate::error::ProviderError;
use crate::models::SearchCriteria;

/// A search URL with `{keywords}` and `{location}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate(String);

impl UrlTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fill in the placeholders, URL-encoded. Keywords are joined with
    /// `" OR "`; only the first location is used.
    pub fn expand(&self, criteria: &SearchCriteria) -> Result<String, ProviderError> {
        let expanded = self
            .0
            .replace("{keywords}", &encode(&criteria.keyword_query()))
            .replace("{location}", &encode(criteria.primary_location()));
        Url::parse(&expanded)
            .map_err(|e| ProviderError::Unsupported(format!("invalid URL template {}: {e}", self.0)))?;
        Ok(expanded)
    }

    /// The expanded page URL, against which relative links on that page
    /// resolve.
    pub fn base_url(&self, criteria: &SearchCriteria) -> Option<Url> {
        Url::parse(&self.expand(criteria).ok()?).ok()
    }
}

fn encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
