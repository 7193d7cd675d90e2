//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::{AppError, ProviderError};
use crate::models::{ProviderMethod, RawRecord, RunResult, ScrapedFields, SearchCriteria};
use crate::reporter::{PipelineEvent, PipelineReporter};
use crate::traits::{Cleaner, Extractor, Fetcher, ResultSink, SourceProvider};

/// Build a scraped candidate.
pub fn scraped(
    title: &str,
    company: &str,
    location: &str,
    posted: Option<&str>,
    link: &str,
) -> RawRecord {
    let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
    RawRecord::Scraped(ScrapedFields {
        title: opt(title),
        company: opt(company),
        location: opt(location),
        posted: posted.map(str::to_string),
        link: opt(link),
        description: None,
    })
}

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Behavior {
    Respond(Result<Vec<RawRecord>, ProviderError>),
    Panic,
}

/// Provider returning the same configured response on every call.
#[derive(Clone)]
pub struct MockProvider {
    method: ProviderMethod,
    behavior: Behavior,
    delay: Option<Duration>,
    base_url: Option<Url>,
    calls: Arc<Mutex<Vec<SearchCriteria>>>,
}

impl MockProvider {
    pub fn succeeding(method: ProviderMethod, records: Vec<RawRecord>) -> Self {
        Self::with_behavior(method, Behavior::Respond(Ok(records)))
    }

    pub fn failing(method: ProviderMethod, error: ProviderError) -> Self {
        Self::with_behavior(method, Behavior::Respond(Err(error)))
    }

    /// A provider whose `fetch` panics.
    pub fn panicking(method: ProviderMethod) -> Self {
        Self::with_behavior(method, Behavior::Panic)
    }

    fn with_behavior(method: ProviderMethod, behavior: Behavior) -> Self {
        Self {
            method,
            behavior,
            delay: None,
            base_url: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_base_url(mut self, base: &str) -> Self {
        self.base_url = Url::parse(base).ok();
        self
    }

    /// Number of `fetch` calls so far, across clones.
    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Criteria of every call, in order.
    pub fn seen_criteria(&self) -> Vec<SearchCriteria> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceProvider for MockProvider {
    fn method(&self) -> ProviderMethod {
        self.method
    }

    async fn fetch(&self, criteria: &SearchCriteria) -> Result<Vec<RawRecord>, ProviderError> {
        self.calls.lock().unwrap().push(criteria.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behavior {
            Behavior::Respond(response) => response.clone(),
            Behavior::Panic => panic!("mock provider exploded"),
        }
    }

    fn base_url(&self, _criteria: &SearchCriteria) -> Option<Url> {
        self.base_url.clone()
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that returns a configurable response.
#[derive(Clone)]
pub struct MockFetcher {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns a default HTML string.
    responses: Arc<Mutex<Vec<Result<String, ProviderError>>>>,
    fetched: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
    in_flight: Arc<Mutex<(usize, usize)>>,
}

impl MockFetcher {
    pub fn new(html: &str) -> Self {
        Self::with_responses(vec![Ok(html.to_string())])
    }

    pub fn with_error(error: ProviderError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            fetched: Arc::new(Mutex::new(Vec::new())),
            delay: None,
            in_flight: Arc::new(Mutex::new((0, 0))),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// URLs requested so far, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    /// Highest number of fetches that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.in_flight.lock().unwrap().1
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ProviderError> {
        self.fetched.lock().unwrap().push(url.to_string());
        {
            let mut counts = self.in_flight.lock().unwrap();
            counts.0 += 1;
            counts.1 = counts.1.max(counts.0);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.lock().unwrap().0 -= 1;

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("<html><body>default</body></html>".to_string())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockCleaner
// ---------------------------------------------------------------------------

/// Mock cleaner that returns its input unchanged, or a one-shot error.
#[derive(Clone)]
pub struct MockCleaner {
    error: Arc<Mutex<Option<ProviderError>>>,
}

impl MockCleaner {
    pub fn passthrough() -> Self {
        Self {
            error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_error(error: ProviderError) -> Self {
        Self {
            error: Arc::new(Mutex::new(Some(error))),
        }
    }
}

impl Cleaner for MockCleaner {
    fn clean(&self, html: &str) -> Result<String, ProviderError> {
        if let Some(e) = self.error.lock().unwrap().take() {
            return Err(e);
        }
        Ok(html.to_string())
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Mock extractor that returns configurable JSON and records its inputs.
#[derive(Clone)]
pub struct MockExtractor {
    responses: Arc<Mutex<Vec<Result<serde_json::Value, ProviderError>>>>,
    contents: Arc<Mutex<Vec<String>>>,
}

impl MockExtractor {
    pub fn new(data: serde_json::Value) -> Self {
        Self::with_responses(vec![Ok(data)])
    }

    pub fn with_error(error: ProviderError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<serde_json::Value, ProviderError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            contents: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Content passed to each `extract` call.
    pub fn contents(&self) -> Vec<String> {
        self.contents.lock().unwrap().clone()
    }
}

impl Extractor for MockExtractor {
    async fn extract(
        &self,
        content: &str,
        _schema: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        self.contents.lock().unwrap().push(content.to_string());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(serde_json::json!({"jobs": []}))
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Reporter that keeps a compact line per event, e.g.
/// `"provider_failed Indeed API RATE_LIMITED"`.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Number of recorded events whose line starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

impl PipelineReporter for RecordingReporter {
    fn report(&self, event: PipelineEvent<'_>) {
        let line = match event {
            PipelineEvent::RunStarted { sources, .. } => format!("run_started {sources}"),
            PipelineEvent::SourceStarted { source, providers } => {
                format!("source_started {source} {providers}")
            }
            PipelineEvent::ProviderAttempt { source, method } => {
                format!("provider_attempt {source} {method}")
            }
            PipelineEvent::ProviderFailed {
                source,
                method,
                error,
            } => format!("provider_failed {source} {method} {}", error.kind()),
            PipelineEvent::SourceSucceeded {
                source,
                method,
                records,
            } => format!("source_succeeded {source} {method} {records}"),
            PipelineEvent::SourceExhausted { source, error } => {
                format!("source_exhausted {source} {}", error.kind())
            }
            PipelineEvent::RecordSkipped { source, reason } => {
                format!("record_skipped {source} {reason}")
            }
            PipelineEvent::MergeCompleted {
                input,
                duplicates,
                stale,
                unmatched,
                output,
            } => format!("merge_completed {input} {duplicates} {stale} {unmatched} {output}"),
            PipelineEvent::RunCompleted {
                jobs,
                failed_sources,
                ..
            } => format!("run_completed {jobs} {failed_sources}"),
        };
        self.events.lock().unwrap().push(line);
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// Sink that keeps every delivered result in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    pub delivered: Arc<Mutex<Vec<RunResult>>>,
    error: Arc<Mutex<Option<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose next delivery fails.
    pub fn failing(message: &str) -> Self {
        Self {
            delivered: Arc::new(Mutex::new(Vec::new())),
            error: Arc::new(Mutex::new(Some(message.to_string()))),
        }
    }

    pub fn last(&self) -> Option<RunResult> {
        self.delivered.lock().unwrap().last().cloned()
    }
}

impl ResultSink for MemorySink {
    async fn deliver(&self, result: &RunResult) -> Result<(), AppError> {
        if let Some(message) = self.error.lock().unwrap().take() {
            return Err(AppError::SinkError(message));
        }
        self.delivered.lock().unwrap().push(result.clone());
        Ok(())
    }
}
