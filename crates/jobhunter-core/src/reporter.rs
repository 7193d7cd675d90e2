use uuid::Uuid;

use crate::error::ProviderError;
use crate::models::{ProviderMethod, SourceId};

/// Events emitted by the pipeline for monitoring/logging.
#[derive(Debug, Clone)]
pub enum PipelineEvent<'a> {
    RunStarted {
        run_id: Uuid,
        sources: usize,
    },
    SourceStarted {
        source: &'a SourceId,
        providers: usize,
    },
    ProviderAttempt {
        source: &'a SourceId,
        method: ProviderMethod,
    },
    ProviderFailed {
        source: &'a SourceId,
        method: ProviderMethod,
        error: &'a ProviderError,
    },
    SourceSucceeded {
        source: &'a SourceId,
        method: ProviderMethod,
        records: usize,
    },
    SourceExhausted {
        source: &'a SourceId,
        error: &'a ProviderError,
    },
    RecordSkipped {
        source: &'a SourceId,
        reason: &'a str,
    },
    MergeCompleted {
        input: usize,
        duplicates: usize,
        stale: usize,
        unmatched: usize,
        output: usize,
    },
    RunCompleted {
        run_id: Uuid,
        jobs: usize,
        failed_sources: usize,
    },
}

/// Trait for receiving pipeline events (decoupled logging).
pub trait PipelineReporter: Send + Sync {
    fn report(&self, event: PipelineEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl PipelineReporter for TracingReporter {
    fn report(&self, event: PipelineEvent<'_>) {
        match event {
            PipelineEvent::RunStarted { run_id, sources } => {
                tracing::info!(%run_id, %sources, "Run started");
            }
            PipelineEvent::SourceStarted { source, providers } => {
                tracing::info!(%source, %providers, "Searching source");
            }
            PipelineEvent::ProviderAttempt { source, method } => {
                tracing::debug!(%source, %method, "Trying provider");
            }
            PipelineEvent::ProviderFailed {
                source,
                method,
                error,
            } => {
                tracing::warn!(%source, %method, %error, "Provider failed, falling back");
            }
            PipelineEvent::SourceSucceeded {
                source,
                method,
                records,
            } => {
                tracing::info!(%source, %method, %records, "Source completed");
            }
            PipelineEvent::SourceExhausted { source, error } => {
                tracing::warn!(%source, %error, "All providers failed");
            }
            PipelineEvent::RecordSkipped { source, reason } => {
                tracing::debug!(%source, %reason, "Skipped candidate");
            }
            PipelineEvent::MergeCompleted {
                input,
                duplicates,
                stale,
                unmatched,
                output,
            } => {
                tracing::info!(
                    %input,
                    %duplicates,
                    %stale,
                    %unmatched,
                    %output,
                    "Merged records"
                );
            }
            PipelineEvent::RunCompleted {
                run_id,
                jobs,
                failed_sources,
            } => {
                tracing::info!(%run_id, %jobs, %failed_sources, "Run completed");
            }
        }
    }
}

/// Reporter that swallows everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl PipelineReporter for SilentReporter {}
