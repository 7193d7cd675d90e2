//! Builds each source's fallback chain from configuration.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jobhunter_core::config::{HuntConfig, ProviderConfig, ScrapeConfig, resolve_env_refs};
use jobhunter_core::error::{AppError, ProviderError};
use jobhunter_core::extraction::LlmExtractionProvider;
use jobhunter_core::fallback::FallbackChain;
use jobhunter_core::models::{ProviderMethod, RawRecord, SearchCriteria};
use jobhunter_core::template::UrlTemplate;
use jobhunter_core::throttle::{ThrottleConfig, ThrottledFetcher};
use jobhunter_core::traits::SourceProvider;

use crate::api::JsonApiProvider;
use crate::cleaner::HtmdCleaner;
use crate::fetcher::ReqwestFetcher;
use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL, OpenAiExtractor};
use crate::scrape::HtmlScrapeProvider;

/// Credentials and defaults for LLM extraction providers.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// A configured provider that cannot run in this build or environment.
/// Every call fails with the stored error so the chain falls through.
struct Unavailable {
    method: ProviderMethod,
    error: ProviderError,
}

#[async_trait]
impl SourceProvider for Unavailable {
    fn method(&self) -> ProviderMethod {
        self.method
    }

    async fn fetch(&self, _criteria: &SearchCriteria) -> Result<Vec<RawRecord>, ProviderError> {
        Err(self.error.clone())
    }
}

type PageFetcher = ThrottledFetcher<ReqwestFetcher>;

#[cfg(feature = "browser")]
type RenderFetcher =
    ThrottledFetcher<jobhunter_core::session::ExclusiveSession<crate::browser_fetcher::BrowserFetcher>>;

/// Shared clients for every provider of a run.
struct Toolkit {
    http: ReqwestFetcher,
    pages: PageFetcher,
    cleaner: HtmdCleaner,
    llm: LlmSettings,
    timeout: Duration,
    #[cfg(feature = "browser")]
    rendered: Result<RenderFetcher, ProviderError>,
}

/// Build one chain per configured source, sharing HTTP clients, the page
/// throttle and (with the `browser` feature) one headless browser.
pub async fn build_chains(
    config: &HuntConfig,
    llm: &LlmSettings,
) -> Result<Vec<FallbackChain>, AppError> {
    let timeout = config.per_provider_timeout();
    let http = ReqwestFetcher::with_timeout(timeout)
        .map_err(|e| AppError::ConfigError(e.to_string()))?;

    let delay = config.request_delay();
    let throttle = ThrottleConfig::new(delay).with_jitter(delay / 4);

    let toolkit = Toolkit {
        pages: ThrottledFetcher::new(http.clone(), throttle.clone()),
        http,
        cleaner: HtmdCleaner::new(),
        llm: llm.clone(),
        timeout,
        #[cfg(feature = "browser")]
        rendered: launch_browser_if_needed(config, timeout, throttle).await,
    };

    Ok(config
        .sources
        .iter()
        .map(|source| {
            let providers = source
                .providers
                .iter()
                .map(|provider| toolkit.provider(provider))
                .collect();
            FallbackChain::new(source.id.trim(), providers)
        })
        .collect())
}

#[cfg(feature = "browser")]
async fn launch_browser_if_needed(
    config: &HuntConfig,
    timeout: Duration,
    throttle: ThrottleConfig,
) -> Result<RenderFetcher, ProviderError> {
    use crate::browser_fetcher::BrowserFetcher;
    use jobhunter_core::session::ExclusiveSession;

    let needed = config.sources.iter().flat_map(|s| &s.providers).any(|p| {
        matches!(p, ProviderConfig::BrowserScrape(ScrapeConfig { render: true, .. }))
    });
    if !needed {
        return Err(ProviderError::Unsupported("browser not started".into()));
    }
    match BrowserFetcher::with_timeout(timeout).await {
        Ok(browser) => Ok(ThrottledFetcher::new(ExclusiveSession::new(browser), throttle)),
        Err(e) => {
            tracing::warn!(error = %e, "Headless browser unavailable, rendered scrapes will fail");
            Err(e)
        }
    }
}

impl Toolkit {
    fn provider(&self, config: &ProviderConfig) -> Arc<dyn SourceProvider> {
        match config {
            ProviderConfig::Api(api) => Arc::new(JsonApiProvider::new(
                &self.http,
                api,
                resolve_headers(&api.headers),
            )),
            ProviderConfig::BrowserScrape(scrape) if scrape.render => self.rendered_scrape(scrape),
            ProviderConfig::BrowserScrape(scrape) => Arc::new(HtmlScrapeProvider::new(
                self.pages.clone(),
                &scrape.url_template,
                &scrape.selectors,
            )),
            ProviderConfig::LlmExtraction(llm) => {
                let Some(api_key) = &self.llm.api_key else {
                    return unavailable(
                        ProviderMethod::LlmExtraction,
                        ProviderError::AuthFailed("JOBHUNTER_API_KEY is not set".into()),
                    );
                };
                let model = llm
                    .model
                    .clone()
                    .unwrap_or_else(|| self.llm.default_model.clone());
                let extractor = OpenAiExtractor::with_base_url(api_key, &model, &self.llm.base_url)
                    .and_then(|e| e.with_timeout(self.timeout));
                match extractor {
                    Ok(extractor) => {
                        let model = extractor.model().to_string();
                        Arc::new(LlmExtractionProvider::new(
                            self.pages.clone(),
                            self.cleaner.clone(),
                            extractor,
                            UrlTemplate::new(llm.url_template.clone()),
                            model,
                        ))
                    }
                    Err(e) => unavailable(ProviderMethod::LlmExtraction, e),
                }
            }
        }
    }

    #[cfg(feature = "browser")]
    fn rendered_scrape(&self, scrape: &ScrapeConfig) -> Arc<dyn SourceProvider> {
        match &self.rendered {
            Ok(fetcher) => Arc::new(HtmlScrapeProvider::new(
                fetcher.clone(),
                &scrape.url_template,
                &scrape.selectors,
            )),
            Err(e) => unavailable(ProviderMethod::BrowserScrape, e.clone()),
        }
    }

    #[cfg(not(feature = "browser"))]
    fn rendered_scrape(&self, _scrape: &ScrapeConfig) -> Arc<dyn SourceProvider> {
        unavailable(
            ProviderMethod::BrowserScrape,
            ProviderError::Unsupported(
                "rendering requires a build with the `browser` feature".into(),
            ),
        )
    }
}

fn unavailable(method: ProviderMethod, error: ProviderError) -> Arc<dyn SourceProvider> {
    Arc::new(Unavailable { method, error })
}

/// Resolve `${VAR}` references in header values from the environment.
fn resolve_headers(
    headers: &BTreeMap<String, String>,
) -> Result<Vec<(String, String)>, ProviderError> {
    headers
        .iter()
        .map(|(name, value)| {
            resolve_env_refs(value, |var| std::env::var(var).ok())
                .map(|resolved| (name.clone(), resolved))
                .map_err(|var| {
                    ProviderError::AuthFailed(format!(
                        "environment variable {var} for header {name} is not set"
                    ))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: &str) -> HuntConfig {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn builds_chains_in_priority_order() {
        let config = config(
            r#"{
            "request_delay_ms": 0,
            "sources": [
                {"id": " Indeed ", "providers": [
                    {"method": "llm_extraction", "url_template": "https://in.indeed.com/jobs?q={keywords}"},
                    {"method": "browser_scrape", "url_template": "https://in.indeed.com/jobs?q={keywords}"},
                    {"method": "api", "url_template": "https://api.example.com/jobs?q={keywords}"}
                ]},
                {"id": "Naukri", "providers": [
                    {"method": "browser_scrape", "url_template": "https://www.naukri.com/{keywords}-jobs"}
                ]}
            ]
        }"#,
        );

        let chains = build_chains(&config, &LlmSettings::default()).await.unwrap();

        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].source().as_str(), "Indeed");
        assert_eq!(
            chains[0].methods(),
            vec![
                ProviderMethod::Api,
                ProviderMethod::BrowserScrape,
                ProviderMethod::LlmExtraction
            ]
        );
        assert_eq!(chains[1].methods(), vec![ProviderMethod::BrowserScrape]);
    }

    #[tokio::test]
    async fn llm_without_key_fails_as_auth() {
        let config = config(
            r#"{"sources": [{"id": "Careers", "providers": [
                {"method": "llm_extraction", "url_template": "https://careers.example.com/jobs"}
            ]}]}"#,
        );
        let chains = build_chains(&config, &LlmSettings::default()).await.unwrap();

        let outcome = jobhunter_core::FallbackCoordinator::new(Duration::from_secs(1))
            .run(
                &chains[0],
                &SearchCriteria::default(),
                &jobhunter_core::reporter::SilentReporter,
            )
            .await;
        assert!(matches!(
            outcome,
            jobhunter_core::FallbackOutcome::Exhausted {
                error: ProviderError::AuthFailed(_),
                ..
            }
        ));
    }

    #[cfg(not(feature = "browser"))]
    #[tokio::test]
    async fn rendering_without_browser_feature_is_unsupported() {
        let provider = Toolkit {
            http: ReqwestFetcher::new().unwrap(),
            pages: ThrottledFetcher::new(
                ReqwestFetcher::new().unwrap(),
                ThrottleConfig::new(Duration::ZERO),
            ),
            cleaner: HtmdCleaner::new(),
            llm: LlmSettings::default(),
            timeout: Duration::from_secs(5),
        }
        .provider(&ProviderConfig::BrowserScrape(ScrapeConfig {
            url_template: "https://in.indeed.com/jobs".into(),
            render: true,
            selectors: Default::default(),
        }));

        assert_eq!(provider.method(), ProviderMethod::BrowserScrape);
        let err = provider.fetch(&SearchCriteria::default()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported(_)));
    }

    #[test]
    fn missing_header_variable_is_auth_failure() {
        let headers = BTreeMap::from([(
            "X-Api-Key".to_string(),
            "${JOBHUNTER_TEST_SURELY_UNSET_VAR}".to_string(),
        )]);
        assert!(matches!(
            resolve_headers(&headers),
            Err(ProviderError::AuthFailed(_))
        ));

        let plain = BTreeMap::from([("Accept-Language".to_string(), "en-IN".to_string())]);
        assert_eq!(
            resolve_headers(&plain).unwrap(),
            vec![("Accept-Language".to_string(), "en-IN".to_string())]
        );
    }
}
