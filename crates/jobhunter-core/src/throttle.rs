//! Per-host request spacing for polite fetching.
//!
//! Job boards block aggressive clients quickly. [`ThrottledFetcher`] wraps
//! any [`Fetcher`] and keeps requests to the same host at least `delay`
//! apart, even when several source tasks share one fetcher.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use jobhunter_core::throttle::{ThrottleConfig, ThrottledFetcher};
//!
//! # use jobhunter_core::traits::Fetcher;
//! # #[derive(Clone)] struct MyFetcher;
//! # impl Fetcher for MyFetcher {
//! #     async fn fetch(&self, _: &str) -> Result<String, jobhunter_core::error::ProviderError> { todo!() }
//! # }
//! let config = ThrottleConfig::new(Duration::from_secs(2))
//!     .with_jitter(Duration::from_millis(500));
//! let fetcher = ThrottledFetcher::new(MyFetcher, config);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

use crate::error::ProviderError;
use crate::traits::Fetcher;

/// Configuration for the throttled fetcher.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Minimum spacing between requests to the same host. Zero disables.
    pub delay: Duration,

    /// Maximum random jitter added on top of `delay` (uniform [0, jitter]).
    pub jitter: Duration,
}

impl ThrottleConfig {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    fn effective_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        let jitter_ms = rand_jitter_ms(self.jitter.as_millis() as u64);
        self.delay + Duration::from_millis(jitter_ms)
    }
}

impl Default for ThrottleConfig {
    /// 2 seconds between requests to one host, up to 500ms jitter.
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
            jitter: Duration::from_millis(500),
        }
    }
}

/// A [`Fetcher`] wrapper that spaces requests per host.
///
/// Each call reserves the next free slot for its host under the lock and
/// then sleeps until that slot outside of it, so concurrent callers queue
/// up instead of bursting and other hosts are never held up.
#[derive(Clone)]
pub struct ThrottledFetcher<F> {
    inner: F,
    config: ThrottleConfig,
    /// Latest reserved slot per host key.
    slots: Arc<Mutex<HashMap<String, Instant>>>,
}

impl<F: Fetcher> ThrottledFetcher<F> {
    pub fn new(inner: F, config: ThrottleConfig) -> Self {
        Self {
            inner,
            config,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// `scheme://host:port` of a URL.
    fn host_key(url_str: &str) -> Option<String> {
        let url = Url::parse(url_str).ok()?;
        let host = url.host_str()?;
        let port = url
            .port_or_known_default()
            .map(|p| format!(":{p}"))
            .unwrap_or_default();
        Some(format!("{}://{}{}", url.scheme(), host, port))
    }

    /// Reserve the next slot for `host` and return when it starts.
    async fn reserve(&self, host: &str) -> Instant {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        let slot = match slots.get(host) {
            Some(&last) => (last + self.config.effective_delay()).max(now),
            None => now,
        };
        slots.insert(host.to_string(), slot);
        slot
    }
}

impl<F: Fetcher> Fetcher for ThrottledFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<String, ProviderError> {
        if !self.config.delay.is_zero()
            && let Some(host) = Self::host_key(url)
        {
            let slot = self.reserve(&host).await;
            let wait = slot.saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                tracing::debug!(%host, wait_ms = %wait.as_millis(), "Throttling request");
                tokio::time::sleep_until(slot).await;
            }
        }
        self.inner.fetch(url).await
    }
}

// Jitter from a clock-seeded xorshift.
fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}
