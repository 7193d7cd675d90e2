//! Exclusive access to a stateful session such as a headless browser.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::error::ProviderError;
use crate::traits::Fetcher;

/// Shared handle to a session that only one task may drive at a time.
///
/// Clones point at the same session. The lock is held for the whole
/// operation and released when the guard drops, which includes the caller
/// being cancelled by a timeout.
#[derive(Debug)]
pub struct ExclusiveSession<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for ExclusiveSession<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> ExclusiveSession<T> {
    pub fn new(session: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Wait for exclusive use of the session.
    pub async fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().await
    }
}

impl<F: Fetcher> Fetcher for ExclusiveSession<F> {
    async fn fetch(&self, url: &str) -> Result<String, ProviderError> {
        let session = self.inner.lock().await;
        tracing::debug!(%url, "Session acquired");
        session.fetch(url).await
    }
}
