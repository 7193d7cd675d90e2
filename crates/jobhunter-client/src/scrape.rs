use async_trait::async_trait;
use jobhunter_core::config::SelectorConfig;
use jobhunter_core::error::ProviderError;
use jobhunter_core::models::{ProviderMethod, RawRecord, ScrapedFields, SearchCriteria};
use jobhunter_core::template::UrlTemplate;
use jobhunter_core::traits::{Fetcher, SourceProvider};
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

/// Compiled card selectors.
#[derive(Debug, Clone)]
struct CardSelectors {
    card: Selector,
    title: Option<Selector>,
    company: Option<Selector>,
    location: Option<Selector>,
    posted: Option<Selector>,
    link: Option<Selector>,
    description: Option<Selector>,
}

impl CardSelectors {
    /// `Ok(None)` when no card selector is configured.
    fn compile(config: &SelectorConfig) -> Result<Option<Self>, ProviderError> {
        let Some(card) = &config.card else {
            return Ok(None);
        };
        let opt = |s: &Option<String>| s.as_deref().map(parse_selector).transpose();
        Ok(Some(Self {
            card: parse_selector(card)?,
            title: opt(&config.title)?,
            company: opt(&config.company)?,
            location: opt(&config.location)?,
            posted: opt(&config.posted)?,
            link: opt(&config.link)?,
            description: opt(&config.description)?,
        }))
    }
}

fn parse_selector(s: &str) -> Result<Selector, ProviderError> {
    Selector::parse(s).map_err(|e| ProviderError::ParseError(format!("invalid selector '{s}': {e}")))
}

/// Provider that scrapes a listing page: schema.org `JobPosting` JSON-LD
/// when the page carries it, configured card selectors otherwise.
///
/// The fetcher decides whether the page is rendered: plain HTTP, or a
/// shared headless browser.
pub struct HtmlScrapeProvider<F: Fetcher> {
    fetcher: F,
    template: UrlTemplate,
    selectors: Result<Option<CardSelectors>, ProviderError>,
}

impl<F: Fetcher> HtmlScrapeProvider<F> {
    pub fn new(fetcher: F, url_template: &str, selectors: &SelectorConfig) -> Self {
        Self {
            fetcher,
            template: UrlTemplate::new(url_template),
            selectors: CardSelectors::compile(selectors),
        }
    }
}

#[async_trait]
impl<F: Fetcher + 'static> SourceProvider for HtmlScrapeProvider<F> {
    fn method(&self) -> ProviderMethod {
        ProviderMethod::BrowserScrape
    }

    async fn fetch(&self, criteria: &SearchCriteria) -> Result<Vec<RawRecord>, ProviderError> {
        let selectors = self.selectors.as_ref().map_err(Clone::clone)?;
        let url = self.template.expand(criteria)?;

        tracing::info!(%url, "Scraping listing page");
        let html = self.fetcher.fetch(&url).await?;

        let records = scrape_page(&html, selectors.as_ref(), criteria.max_results);
        tracing::debug!(%url, candidates = records.len(), "Scraped page");
        Ok(records)
    }

    fn base_url(&self, criteria: &SearchCriteria) -> Option<Url> {
        self.template.base_url(criteria)
    }
}

fn scrape_page(html: &str, selectors: Option<&CardSelectors>, max_results: usize) -> Vec<RawRecord> {
    let document = Html::parse_document(html);

    let postings = json_ld_postings(&document);
    if !postings.is_empty() {
        return postings
            .into_iter()
            .take(max_results)
            .map(RawRecord::Structured)
            .collect();
    }

    let Some(selectors) = selectors else {
        return Vec::new();
    };
    document
        .select(&selectors.card)
        .take(max_results)
        .map(|card| RawRecord::Scraped(read_card(card, selectors)))
        .collect()
}

fn json_ld_postings(document: &Html) -> Vec<Value> {
    let Ok(script) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };
    let mut postings = Vec::new();
    for block in document.select(&script) {
        let text: String = block.text().collect();
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => collect_postings(value, &mut postings),
            Err(e) => tracing::debug!(error = %e, "Ignoring malformed JSON-LD block"),
        }
    }
    postings
}

fn collect_postings(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|v| collect_postings(v, out)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                collect_postings(graph, out);
            }
            let is_posting = match map.get("@type") {
                Some(Value::String(t)) => t == "JobPosting",
                Some(Value::Array(types)) => types.iter().any(|t| t == "JobPosting"),
                _ => false,
            };
            if is_posting {
                out.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

fn read_card(card: ElementRef<'_>, selectors: &CardSelectors) -> ScrapedFields {
    let text_of = |sel: &Option<Selector>| {
        sel.as_ref()
            .and_then(|s| card.select(s).next())
            .map(element_text)
            .filter(|t| !t.is_empty())
    };

    let link = match &selectors.link {
        Some(sel) => card.select(sel).next().and_then(href_of),
        None => selectors
            .title
            .as_ref()
            .and_then(|sel| card.select(sel).next())
            .and_then(href_of)
            .or_else(|| href_of(card)),
    };

    ScrapedFields {
        title: text_of(&selectors.title),
        company: text_of(&selectors.company),
        location: text_of(&selectors.location),
        posted: text_of(&selectors.posted),
        link,
        description: text_of(&selectors.description),
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// `href` of the element itself or of its first anchor descendant.
fn href_of(element: ElementRef<'_>) -> Option<String> {
    if let Some(href) = element.value().attr("href") {
        return Some(href.to_string());
    }
    let anchor = Selector::parse("a[href]").ok()?;
    element
        .select(&anchor)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}
