//! Runs every source's fallback chain concurrently and collects the results.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::ProviderError;
use crate::fallback::{FallbackChain, FallbackCoordinator, FallbackOutcome};
use crate::models::{JobRecord, SearchCriteria, SourceAttemptResult, SourceId};
use crate::normalize::Normalizer;
use crate::reporter::{PipelineEvent, PipelineReporter};

/// Normalized records plus the status of every source.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    pub records: Vec<JobRecord>,
    pub source_status: BTreeMap<SourceId, SourceAttemptResult>,
}

/// Fans sources out over a bounded task group.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    coordinator: FallbackCoordinator,
    max_concurrent: usize,
}

impl Aggregator {
    pub fn new(coordinator: FallbackCoordinator, max_concurrent: usize) -> Self {
        Self {
            coordinator,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Run all chains. Never fails: a source that errors, exhausts its
    /// providers or panics shows up as a failed entry in `source_status`.
    pub async fn collect<R>(
        &self,
        chains: &[FallbackChain],
        criteria: &SearchCriteria,
        normalizer: Normalizer,
        reporter: Arc<R>,
    ) -> Collected
    where
        R: PipelineReporter + ?Sized + 'static,
    {
        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        let mut task_sources = HashMap::new();

        for chain in chains {
            let chain = chain.clone();
            let criteria = criteria.clone();
            let permits = Arc::clone(&permits);
            let reporter = Arc::clone(&reporter);
            let coordinator = self.coordinator;
            let source = chain.source().clone();

            let handle = tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                run_source(coordinator, &chain, &criteria, normalizer, reporter.as_ref()).await
            });
            task_sources.insert(handle.id(), source);
        }

        let mut collected = Collected::default();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (source, status, records))) => {
                    collected.records.extend(records);
                    collected.source_status.insert(source, status);
                }
                Err(join_error) => {
                    let Some(source) = task_sources.get(&join_error.id()).cloned() else {
                        continue;
                    };
                    let reason = if join_error.is_panic() {
                        format!("source task panicked: {}", panic_message(join_error.into_panic()))
                    } else {
                        "source task was cancelled".to_string()
                    };
                    let error = ProviderError::Unsupported(reason);
                    reporter.report(PipelineEvent::SourceExhausted {
                        source: &source,
                        error: &error,
                    });
                    collected
                        .source_status
                        .insert(source, SourceAttemptResult::exhausted(error, Vec::new()));
                }
            }
        }

        collected
    }
}

async fn run_source<R: PipelineReporter + ?Sized>(
    coordinator: FallbackCoordinator,
    chain: &FallbackChain,
    criteria: &SearchCriteria,
    normalizer: Normalizer,
    reporter: &R,
) -> (SourceId, SourceAttemptResult, Vec<JobRecord>) {
    let source = chain.source().clone();
    reporter.report(PipelineEvent::SourceStarted {
        source: &source,
        providers: chain.len(),
    });

    match coordinator.run(chain, criteria, reporter).await {
        FallbackOutcome::Succeeded {
            method,
            records,
            base_url,
            attempts,
        } => {
            let normalized = normalizer.normalize(&source, method, records, base_url.as_ref());
            for skip in &normalized.skipped {
                reporter.report(PipelineEvent::RecordSkipped {
                    source: &source,
                    reason: skip.as_str(),
                });
            }
            reporter.report(PipelineEvent::SourceSucceeded {
                source: &source,
                method,
                records: normalized.records.len(),
            });
            let status = SourceAttemptResult::succeeded(
                method,
                normalized.records.len(),
                normalized.skipped.len(),
                attempts,
            );
            (source, status, normalized.records)
        }
        FallbackOutcome::Exhausted { error, attempts } => {
            (source, SourceAttemptResult::exhausted(error, attempts), Vec::new())
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
