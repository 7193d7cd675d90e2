use std::sync::Arc;

use htmd::HtmlToMarkdown;
use jobhunter_core::error::ProviderError;
use jobhunter_core::traits::Cleaner;

/// Default prompt budget, in characters of Markdown.
pub const DEFAULT_MAX_CHARS: usize = 10_000;

/// HTML-to-Markdown cleaner using htmd.
///
/// Strips non-content elements (script, style, nav, etc.) and truncates
/// the result to a character budget to bound LLM token usage.
pub struct HtmdCleaner {
    converter: Arc<HtmlToMarkdown>,
    max_chars: usize,
}

impl Clone for HtmdCleaner {
    fn clone(&self) -> Self {
        Self {
            converter: Arc::clone(&self.converter),
            max_chars: self.max_chars,
        }
    }
}

impl HtmdCleaner {
    pub fn new() -> Self {
        Self::with_max_chars(DEFAULT_MAX_CHARS)
    }

    pub fn with_max_chars(max_chars: usize) -> Self {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(vec![
                "script", "style", "nav", "footer", "header", "aside", "noscript", "iframe", "svg",
                "form",
            ])
            .build();

        Self {
            converter: Arc::new(converter),
            max_chars,
        }
    }
}

impl Default for HtmdCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl Cleaner for HtmdCleaner {
    fn clean(&self, html: &str) -> Result<String, ProviderError> {
        let markdown = self
            .converter
            .convert(html)
            .map_err(|e| ProviderError::ParseError(format!("HTML conversion failed: {e}")))?;

        match markdown.char_indices().nth(self.max_chars) {
            Some((cut, _)) => Ok(markdown[..cut].to_string()),
            None => Ok(markdown),
        }
    }
}
