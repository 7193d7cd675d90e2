//! Run configuration, as read from `jobhunter.json`.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::TimeDelta;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::dedup::FilterConfig;
use crate::error::AppError;
use crate::models::{ProviderMethod, SearchCriteria};

fn default_max_results() -> usize {
    25
}

/// One century; anything longer cannot be subtracted from a timestamp safely.
pub const MAX_RECENCY_WINDOW_HOURS: u64 = 24 * 365 * 100;

fn default_recency_window_hours() -> u64 {
    24
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_max_concurrent_sources() -> usize {
    3
}

fn default_request_delay_ms() -> u64 {
    2000
}

/// Everything one run needs besides credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HuntConfig {
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    #[serde(default)]
    pub locations: BTreeSet<String>,
    /// Equivalent spellings of a location, e.g. `bengaluru → [bangalore]`.
    #[serde(default)]
    pub location_aliases: BTreeMap<String, Vec<String>>,
    #[serde(default = "default_max_results")]
    pub max_results_per_source: usize,
    #[serde(default = "default_recency_window_hours")]
    pub recency_window_hours: u64,
    #[serde(default = "default_timeout_seconds")]
    pub per_provider_timeout_seconds: u64,
    #[serde(default = "default_max_concurrent_sources")]
    pub max_concurrent_sources: usize,
    /// Spacing between page requests to one host; 0 disables.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// One provider of a source, tagged by `method`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ProviderConfig {
    Api(ApiConfig),
    BrowserScrape(ScrapeConfig),
    LlmExtraction(LlmConfig),
}

impl ProviderConfig {
    pub fn method(&self) -> ProviderMethod {
        match self {
            ProviderConfig::Api(_) => ProviderMethod::Api,
            ProviderConfig::BrowserScrape(_) => ProviderMethod::BrowserScrape,
            ProviderConfig::LlmExtraction(_) => ProviderMethod::LlmExtraction,
        }
    }

    pub fn url_template(&self) -> &str {
        match self {
            ProviderConfig::Api(c) => &c.url_template,
            ProviderConfig::BrowserScrape(c) => &c.url_template,
            ProviderConfig::LlmExtraction(c) => &c.url_template,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub url_template: String,
    /// JSON pointer to the item array; empty means the document root.
    #[serde(default)]
    pub items_pointer: String,
    /// Values may reference the environment as `${VAR}`.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeConfig {
    pub url_template: String,
    /// Render with the headless browser before scraping.
    #[serde(default)]
    pub render: bool,
    #[serde(default)]
    pub selectors: SelectorConfig,
}

/// CSS selectors for card-based scraping. Without `card`, only JSON-LD
/// postings are read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub card: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub posted: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub url_template: String,
    /// Overrides the default model for this provider.
    #[serde(default)]
    pub model: Option<String>,
}

impl HuntConfig {
    /// Read and parse a config file. Does not validate.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Reject configurations the pipeline cannot run.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.sources.is_empty() {
            return Err(AppError::ConfigError("no sources configured".into()));
        }
        let mut seen = HashSet::new();
        for source in &self.sources {
            let id = source.id.trim();
            if id.is_empty() {
                return Err(AppError::ConfigError("source id must not be blank".into()));
            }
            if !seen.insert(id) {
                return Err(AppError::ConfigError(format!("duplicate source id: {id}")));
            }
            if source.providers.is_empty() {
                return Err(AppError::ConfigError(format!(
                    "source {id} has no providers"
                )));
            }
        }
        if self.per_provider_timeout_seconds == 0 {
            return Err(AppError::ConfigError(
                "per_provider_timeout_seconds must be positive".into(),
            ));
        }
        if self.recency_window_hours == 0 {
            return Err(AppError::ConfigError(
                "recency_window_hours must be positive".into(),
            ));
        }
        if self.recency_window_hours > MAX_RECENCY_WINDOW_HOURS {
            return Err(AppError::ConfigError(format!(
                "recency_window_hours must be at most {MAX_RECENCY_WINDOW_HOURS}"
            )));
        }
        if self.max_concurrent_sources == 0 {
            return Err(AppError::ConfigError(
                "max_concurrent_sources must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn criteria(&self) -> SearchCriteria {
        SearchCriteria {
            keywords: self.keywords.clone(),
            locations: self.locations.clone(),
            max_results: self.max_results_per_source,
        }
    }

    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig::new(
            &self.keywords,
            &self.locations,
            &self.location_aliases,
            self.recency_window(),
        )
    }

    pub fn recency_window(&self) -> TimeDelta {
        i64::try_from(self.recency_window_hours)
            .ok()
            .and_then(TimeDelta::try_hours)
            .unwrap_or(TimeDelta::MAX)
    }

    pub fn per_provider_timeout(&self) -> Duration {
        Duration::from_secs(self.per_provider_timeout_seconds)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

static ENV_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env reference pattern is valid")
});

/// Replace every `${VAR}` in `value` using `lookup`.
///
/// Returns the name of the first variable `lookup` cannot resolve.
pub fn resolve_env_refs(
    value: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, String> {
    let mut missing = None;
    let resolved = ENV_REF.replace_all(value, |caps: &Captures<'_>| {
        let name = &caps[1];
        lookup(name).unwrap_or_else(|| {
            missing.get_or_insert_with(|| name.to_string());
            String::new()
        })
    });
    match missing {
        Some(name) => Err(name),
        None => Ok(resolved.into_owned()),
    }
}
