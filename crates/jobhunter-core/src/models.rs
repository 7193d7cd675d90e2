use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ProviderError;

/// Identifier of one configured job source (e.g. `"Indeed"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Retrieval strategy of a provider.
///
/// Declaration order is the fallback priority and the trust order used
/// when deduplicating: API first, LLM extraction last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderMethod {
    Api,
    BrowserScrape,
    LlmExtraction,
}

impl ProviderMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderMethod::Api => "API",
            ProviderMethod::BrowserScrape => "BROWSER_SCRAPE",
            ProviderMethod::LlmExtraction => "LLM_EXTRACTION",
        }
    }

    /// Lower is tried first and trusted more.
    pub fn priority(&self) -> u8 {
        match self {
            ProviderMethod::Api => 0,
            ProviderMethod::BrowserScrape => 1,
            ProviderMethod::LlmExtraction => 2,
        }
    }
}

impl fmt::Display for ProviderMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "api" => Ok(ProviderMethod::Api),
            "browser_scrape" | "browser" | "scrape" => Ok(ProviderMethod::BrowserScrape),
            "llm_extraction" | "llm" => Ok(ProviderMethod::LlmExtraction),
            _ => Err(format!("Unknown provider method: {s}")),
        }
    }
}

/// What every provider is asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub keywords: BTreeSet<String>,
    pub locations: BTreeSet<String>,
    pub max_results: usize,
}

impl SearchCriteria {
    /// Keywords as a single query string, `"a OR b"`.
    pub fn keyword_query(&self) -> String {
        self.keywords
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    /// The location sent to search endpoints (first configured one).
    pub fn primary_location(&self) -> &str {
        self.locations.iter().next().map(String::as_str).unwrap_or("")
    }
}

/// DOM fields read by a scraping provider. Every field is optional; the
/// normalizer decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedFields {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub posted: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
}

/// Provider-specific candidate record, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RawRecord {
    /// One item of a structured (JSON API) response.
    Structured(serde_json::Value),
    /// Fields scraped from a rendered or static page.
    Scraped(ScrapedFields),
    /// A whole LLM response for one page; untrusted.
    Extracted(serde_json::Value),
}

/// Canonical job posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// SHA-256 of the identity key.
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub url: String,
    pub source: SourceId,
    pub method: ProviderMethod,
    pub posted_at: Option<DateTime<Utc>>,
    pub retrieved_at: DateTime<Utc>,
    pub description_snippet: Option<String>,
}

/// One provider invocation within a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAttempt {
    pub method: ProviderMethod,
    pub error: Option<ProviderError>,
    pub elapsed_ms: u64,
}

/// Outcome of running the fallback chain for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAttemptResult {
    pub succeeded: bool,
    pub method_used: Option<ProviderMethod>,
    pub record_count: usize,
    pub skipped_count: usize,
    pub error: Option<ProviderError>,
    pub attempts: Vec<ProviderAttempt>,
}

impl SourceAttemptResult {
    pub fn succeeded(
        method: ProviderMethod,
        record_count: usize,
        skipped_count: usize,
        attempts: Vec<ProviderAttempt>,
    ) -> Self {
        Self {
            succeeded: true,
            method_used: Some(method),
            record_count,
            skipped_count,
            error: None,
            attempts,
        }
    }

    /// Every provider failed; `error` is the last one seen.
    pub fn exhausted(error: ProviderError, attempts: Vec<ProviderAttempt>) -> Self {
        Self {
            succeeded: false,
            method_used: None,
            record_count: 0,
            skipped_count: 0,
            error: Some(error),
            attempts,
        }
    }
}

/// Final output of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Sorted by recency, grouped by source.
    pub jobs: Vec<JobRecord>,
    pub source_status: BTreeMap<SourceId, SourceAttemptResult>,
}

impl RunResult {
    /// Contiguous per-source groups of `jobs`, in presentation order.
    pub fn by_source(&self) -> Vec<(&SourceId, &[JobRecord])> {
        self.jobs
            .chunk_by(|a, b| a.source == b.source)
            .map(|group| (&group[0].source, group))
            .collect()
    }

    pub fn failed_sources(&self) -> impl Iterator<Item = (&SourceId, &SourceAttemptResult)> {
        self.source_status.iter().filter(|(_, s)| !s.succeeded)
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
