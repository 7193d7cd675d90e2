//! Per-source fallback chain.
//!
//! A source is configured with one or more providers. They are tried one
//! at a time, cheapest and most reliable first (API, then browser scrape,
//! then LLM extraction), until one of them returns without error. An empty
//! result is a success and stops the chain; only errors and timeouts move
//! on to the next provider.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use url::Url;

use crate::error::ProviderError;
use crate::models::{ProviderAttempt, ProviderMethod, RawRecord, SearchCriteria, SourceId};
use crate::reporter::{PipelineEvent, PipelineReporter};
use crate::traits::SourceProvider;

/// The ordered providers of one source.
#[derive(Clone)]
pub struct FallbackChain {
    source: SourceId,
    providers: Vec<Arc<dyn SourceProvider>>,
}

impl FallbackChain {
    /// Build a chain, ordering providers by method priority.
    ///
    /// The sort is stable: providers sharing a method keep their configured
    /// relative order.
    pub fn new(source: impl Into<SourceId>, mut providers: Vec<Arc<dyn SourceProvider>>) -> Self {
        providers.sort_by_key(|p| p.method().priority());
        Self {
            source: source.into(),
            providers,
        }
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// Methods in the order they will be tried.
    pub fn methods(&self) -> Vec<ProviderMethod> {
        self.providers.iter().map(|p| p.method()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field("source", &self.source)
            .field("methods", &self.methods())
            .finish()
    }
}

/// Result of running one chain.
#[derive(Debug, Clone)]
pub enum FallbackOutcome {
    Succeeded {
        method: ProviderMethod,
        records: Vec<RawRecord>,
        base_url: Option<Url>,
        attempts: Vec<ProviderAttempt>,
    },
    /// Every provider failed; `error` is the last failure.
    Exhausted {
        error: ProviderError,
        attempts: Vec<ProviderAttempt>,
    },
}

/// Runs fallback chains with a per-call timeout.
#[derive(Debug, Clone, Copy)]
pub struct FallbackCoordinator {
    timeout: Duration,
}

impl FallbackCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Try each provider of `chain` in order until one succeeds.
    ///
    /// Provider errors are recorded, never returned.
    pub async fn run<R: PipelineReporter + ?Sized>(
        &self,
        chain: &FallbackChain,
        criteria: &SearchCriteria,
        reporter: &R,
    ) -> FallbackOutcome {
        let source = chain.source();
        let mut attempts = Vec::with_capacity(chain.len());
        let mut last_error = None;

        for provider in &chain.providers {
            let method = provider.method();
            reporter.report(PipelineEvent::ProviderAttempt { source, method });

            let started = Instant::now();
            let result = match tokio::time::timeout(self.timeout, provider.fetch(criteria)).await
            {
                Ok(inner) => inner,
                Err(_) => Err(ProviderError::Timeout(self.timeout.as_secs())),
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(mut records) => {
                    records.truncate(criteria.max_results);
                    attempts.push(ProviderAttempt {
                        method,
                        error: None,
                        elapsed_ms,
                    });
                    return FallbackOutcome::Succeeded {
                        method,
                        records,
                        base_url: provider.base_url(criteria),
                        attempts,
                    };
                }
                Err(error) => {
                    reporter.report(PipelineEvent::ProviderFailed {
                        source,
                        method,
                        error: &error,
                    });
                    attempts.push(ProviderAttempt {
                        method,
                        error: Some(error.clone()),
                        elapsed_ms,
                    });
                    last_error = Some(error);
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| ProviderError::Unsupported("no providers configured".into()));
        reporter.report(PipelineEvent::SourceExhausted {
            source,
            error: &error,
        });
        FallbackOutcome::Exhausted { error, attempts }
    }
}
