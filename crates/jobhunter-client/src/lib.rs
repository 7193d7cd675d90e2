pub mod api;
pub mod cleaner;
pub mod fetcher;
pub mod llm;
pub mod registry;
pub mod scrape;

#[cfg(feature = "browser")]
pub mod browser_fetcher;

pub use api::JsonApiProvider;
pub use cleaner::HtmdCleaner;
pub use fetcher::ReqwestFetcher;
pub use llm::OpenAiExtractor;
pub use registry::{LlmSettings, build_chains};
pub use scrape::HtmlScrapeProvider;

#[cfg(feature = "browser")]
pub use browser_fetcher::BrowserFetcher;
