//! One end-to-end run: validate → fan out → merge → deliver.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::aggregate::Aggregator;
use crate::dedup::{FilterConfig, merge};
use crate::error::AppError;
use crate::fallback::{FallbackChain, FallbackCoordinator};
use crate::models::{RunResult, SearchCriteria};
use crate::normalize::Normalizer;
use crate::reporter::{PipelineEvent, PipelineReporter};
use crate::traits::ResultSink;

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub criteria: SearchCriteria,
    pub filter: FilterConfig,
    pub per_provider_timeout: Duration,
    pub max_concurrent_sources: usize,
}

/// The job-hunting pipeline over a fixed set of sources.
pub struct Pipeline<S: ResultSink, R: PipelineReporter + 'static> {
    chains: Vec<FallbackChain>,
    settings: PipelineSettings,
    sink: S,
    reporter: Arc<R>,
}

impl<S: ResultSink, R: PipelineReporter + 'static> Pipeline<S, R> {
    pub fn new(chains: Vec<FallbackChain>, settings: PipelineSettings, sink: S, reporter: R) -> Self {
        Self {
            chains,
            settings,
            sink,
            reporter: Arc::new(reporter),
        }
    }

    pub fn chains(&self) -> &[FallbackChain] {
        &self.chains
    }

    /// Check the source set before anything runs.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.chains.is_empty() {
            return Err(AppError::ConfigError("no sources configured".into()));
        }
        let mut seen = HashSet::new();
        for chain in &self.chains {
            let id = chain.source().as_str();
            if id.trim().is_empty() {
                return Err(AppError::ConfigError("source id must not be blank".into()));
            }
            if !seen.insert(id) {
                return Err(AppError::ConfigError(format!("duplicate source id: {id}")));
            }
            if chain.is_empty() {
                return Err(AppError::ConfigError(format!(
                    "source {id} has no providers"
                )));
            }
        }
        if self.settings.per_provider_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "per-provider timeout must be positive".into(),
            ));
        }
        if self.settings.filter.recency_window() <= chrono::TimeDelta::zero() {
            return Err(AppError::ConfigError("recency window must be positive".into()));
        }
        if self.settings.max_concurrent_sources == 0 {
            return Err(AppError::ConfigError(
                "max_concurrent_sources must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Run once, starting now.
    pub async fn run(&self) -> Result<RunResult, AppError> {
        self.run_at(Utc::now()).await
    }

    /// Run once with an explicit start time. The recency window and
    /// relative dates are measured from `started_at`.
    pub async fn run_at(&self, started_at: DateTime<Utc>) -> Result<RunResult, AppError> {
        self.validate()?;

        let run_id = Uuid::new_v4();
        self.reporter.report(PipelineEvent::RunStarted {
            run_id,
            sources: self.chains.len(),
        });

        let aggregator = Aggregator::new(
            FallbackCoordinator::new(self.settings.per_provider_timeout),
            self.settings.max_concurrent_sources,
        );
        let collected = aggregator
            .collect(
                &self.chains,
                &self.settings.criteria,
                Normalizer::new(started_at),
                Arc::clone(&self.reporter),
            )
            .await;

        let (jobs, stats) = merge(collected.records, &self.settings.filter, started_at);
        self.reporter.report(PipelineEvent::MergeCompleted {
            input: stats.input,
            duplicates: stats.duplicates_removed,
            stale: stats.stale_removed,
            unmatched: stats.criteria_removed,
            output: stats.output,
        });

        let result = RunResult {
            run_id,
            started_at,
            finished_at: Utc::now().max(started_at),
            jobs,
            source_status: collected.source_status,
        };

        self.reporter.report(PipelineEvent::RunCompleted {
            run_id,
            jobs: result.jobs.len(),
            failed_sources: result.failed_sources().count(),
        });

        self.sink.deliver(&result).await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProviderMethod, SourceId};
    use crate::reporter::SilentReporter;
    use crate::testutil::*;
    use crate::traits::SourceProvider;
    use chrono::{TimeDelta, TimeZone};
    use std::collections::{BTreeMap, BTreeSet};

    fn settings() -> PipelineSettings {
        PipelineSettings {
            criteria: SearchCriteria {
                keywords: BTreeSet::new(),
                locations: BTreeSet::new(),
                max_results: 25,
            },
            filter: FilterConfig::new(
                &BTreeSet::new(),
                &BTreeSet::new(),
                &BTreeMap::new(),
                TimeDelta::hours(24),
            ),
            per_provider_timeout: Duration::from_secs(5),
            max_concurrent_sources: 3,
        }
    }

    fn chain(source: &str, provider: MockProvider) -> FallbackChain {
        FallbackChain::new(source, vec![Arc::new(provider) as Arc<dyn SourceProvider>])
    }

    #[tokio::test]
    async fn rejects_invalid_source_sets() {
        let ok = MockProvider::succeeding(ProviderMethod::Api, vec![]);

        let empty = Pipeline::new(vec![], settings(), MemorySink::new(), SilentReporter);
        assert!(matches!(empty.run().await, Err(AppError::ConfigError(_))));

        let dup = Pipeline::new(
            vec![chain("Indeed", ok.clone()), chain("Indeed", ok.clone())],
            settings(),
            MemorySink::new(),
            SilentReporter,
        );
        assert!(matches!(dup.validate(), Err(AppError::ConfigError(_))));

        let no_providers = Pipeline::new(
            vec![FallbackChain::new("Indeed", vec![])],
            settings(),
            MemorySink::new(),
            SilentReporter,
        );
        assert!(matches!(no_providers.validate(), Err(AppError::ConfigError(_))));

        let mut zero = settings();
        zero.per_provider_timeout = Duration::ZERO;
        let zero_timeout =
            Pipeline::new(vec![chain("Indeed", ok.clone())], zero, MemorySink::new(), SilentReporter);
        assert!(matches!(zero_timeout.run().await, Err(AppError::ConfigError(_))));

        // Rejected runs never reach a provider.
        assert_eq!(ok.calls(), 0);
    }

    #[tokio::test]
    async fn delivers_result_to_sink() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let provider = MockProvider::succeeding(
            ProviderMethod::Api,
            vec![scraped("Engineer", "Acme", "Pune", Some("1 hour ago"), "https://a.example/jobs/1")],
        );
        let sink = MemorySink::new();
        let reporter = RecordingReporter::new();
        let pipeline = Pipeline::new(
            vec![chain("Indeed", provider)],
            settings(),
            sink.clone(),
            reporter.clone(),
        );

        let result = pipeline.run_at(now).await.unwrap();

        assert_eq!(result.jobs.len(), 1);
        assert_eq!(result.started_at, now);
        assert_eq!(result.jobs[0].posted_at, Some(now - TimeDelta::hours(1)));
        assert_eq!(sink.last(), Some(result.clone()));
        assert!(result.source_status[&SourceId::new("Indeed")].succeeded);
        assert_eq!(reporter.count("run_started 1"), 1);
        assert_eq!(reporter.count("merge_completed 1 0 0 0 1"), 1);
        assert_eq!(reporter.count("run_completed 1 0"), 1);
    }

    #[tokio::test]
    async fn sink_failure_is_fatal() {
        let provider = MockProvider::succeeding(ProviderMethod::Api, vec![]);
        let pipeline = Pipeline::new(
            vec![chain("Indeed", provider)],
            settings(),
            MemorySink::failing("disk full"),
            SilentReporter,
        );

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, AppError::SinkError(_)));
    }
}
