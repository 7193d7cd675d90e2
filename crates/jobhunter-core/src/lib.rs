pub mod aggregate;
pub mod config;
pub mod dates;
pub mod dedup;
pub mod error;
pub mod extraction;
pub mod fallback;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod reporter;
pub mod session;
pub mod template;
pub mod throttle;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::HuntConfig;
pub use error::{AppError, ProviderError};
pub use fallback::{FallbackChain, FallbackCoordinator, FallbackOutcome};
pub use models::{
    JobRecord, ProviderMethod, RawRecord, RunResult, SearchCriteria, SourceAttemptResult,
    SourceId, compute_hash,
};
pub use pipeline::{Pipeline, PipelineSettings};
pub use reporter::{PipelineEvent, PipelineReporter, TracingReporter};
pub use traits::{Cleaner, Extractor, Fetcher, ResultSink, SourceProvider};
