use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use jobhunter_core::error::ProviderError;
use jobhunter_core::traits::Fetcher;

/// Headless-browser fetcher using Chromium via the Chrome DevTools Protocol.
///
/// Renders JavaScript before returning the HTML, for boards whose listings
/// are built client-side. One Chromium process backs all clones; each fetch
/// opens a tab, reads the rendered DOM and closes the tab.
///
/// The browser is a stateful session: share it between sources through
/// [`jobhunter_core::session::ExclusiveSession`] so that only one fetch
/// drives it at a time.
///
/// # Example
///
/// ```rust,no_run
/// use jobhunter_client::BrowserFetcher;
/// use jobhunter_core::session::ExclusiveSession;
/// use jobhunter_core::traits::Fetcher;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let browser = ExclusiveSession::new(BrowserFetcher::new().await?);
/// let html = browser.fetch("https://example.com").await?;
/// println!("{}", &html[..200]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BrowserFetcher {
    browser: Arc<Browser>,
    timeout: Duration,
}

impl BrowserFetcher {
    /// Launches a headless Chromium browser with a **30 s** navigation timeout.
    pub async fn new() -> Result<Self, ProviderError> {
        Self::with_timeout(Duration::from_secs(30)).await
    }

    pub async fn with_timeout(timeout: Duration) -> Result<Self, ProviderError> {
        let mut builder = BrowserConfig::builder();
        builder = builder.no_sandbox().disable_default_args();

        // The snap wrapper at /snap/bin/chromium drops headless flags, so
        // look for a real binary first.
        if let Some(bin) = Self::find_chrome_binary() {
            tracing::info!(binary = %bin.display(), "Using Chrome binary");
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .build()
            .map_err(|e| ProviderError::Unsupported(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ProviderError::Unsupported(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!(error = %e, "Browser CDP handler error");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            timeout,
        })
    }

    fn find_chrome_binary() -> Option<PathBuf> {
        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(&p);
            if path.exists() {
                return Some(path);
            }
        }

        [
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    }
}

impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ProviderError> {
        let timeout = self.timeout;

        let result = tokio::time::timeout(timeout, async {
            let page = self.browser.new_page(url).await.map_err(|e| {
                ProviderError::Unsupported(format!("Failed to navigate to {url}: {e}"))
            })?;
            let page = CloseOnDrop::new(page, close_tab);

            // <body> present is the minimal signal that the page rendered.
            page.find_element("body").await.map_err(|e| {
                ProviderError::ParseError(format!("Page did not render body: {e}"))
            })?;

            let html = page.content().await.map_err(|e| {
                ProviderError::ParseError(format!("Failed to read page content: {e}"))
            })?;

            Ok::<String, ProviderError>(html)
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(ProviderError::Timeout(timeout.as_secs())),
        }
    }
}

fn close_tab(page: Page) -> BoxFuture<'static, ()> {
    async move {
        if let Err(e) = page.close().await {
            tracing::debug!(error = %e, "Failed to close browser tab");
        }
    }
    .boxed()
}

/// Runs an async cleanup for the wrapped value when dropped: after success,
/// after an early error return and when the owning future is cancelled.
struct CloseOnDrop<T: Clone> {
    value: T,
    close: Option<Box<dyn FnOnce(T) -> BoxFuture<'static, ()> + Send>>,
}

impl<T: Clone> CloseOnDrop<T> {
    fn new(value: T, close: impl FnOnce(T) -> BoxFuture<'static, ()> + Send + 'static) -> Self {
        Self {
            value,
            close: Some(Box::new(close)),
        }
    }
}

impl<T: Clone> std::ops::Deref for CloseOnDrop<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Clone> Drop for CloseOnDrop<T> {
    fn drop(&mut self) {
        let Some(close) = self.close.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(close(self.value.clone()));
            }
            Err(_) => tracing::warn!("No async runtime left to close a browser tab"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    fn guard(value: u32, tx: oneshot::Sender<u32>) -> CloseOnDrop<u32> {
        CloseOnDrop::new(value, move |v| {
            async move {
                let _ = tx.send(v);
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn closes_when_the_fetch_times_out() {
        let (tx, rx) = oneshot::channel();
        let work = async move {
            let _tab = guard(7, tx);
            std::future::pending::<()>().await;
        };

        assert!(tokio::time::timeout(Duration::from_millis(10), work).await.is_err());
        assert_eq!(rx.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn closes_on_early_error_return() {
        let (tx, rx) = oneshot::channel();
        let work = async move {
            let tab = guard(3, tx);
            Err::<u32, _>(ProviderError::ParseError(format!("no body in tab {}", *tab)))
        };

        assert!(work.await.is_err());
        assert_eq!(rx.await.unwrap(), 3);
    }
}
