use thiserror::Error;

/// Failure of a single provider call.
///
/// Provider errors never escape the fallback coordinator: they decide
/// whether the next provider in the chain is tried and end up in the
/// per-source status report.
#[derive(Error, Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderError {
    /// The remote side throttled us (HTTP 429 or an equivalent signal).
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Credentials missing or rejected (HTTP 401/403).
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The response could not be decoded into candidate records.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The call did not finish within its budget.
    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    /// The provider cannot serve this request at all.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl ProviderError {
    /// Short, stable tag used in reports and CSV output.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::RateLimited(_) => "RATE_LIMITED",
            ProviderError::AuthFailed(_) => "AUTH_FAILED",
            ProviderError::ParseError(_) => "PARSE_ERROR",
            ProviderError::Timeout(_) => "TIMEOUT",
            ProviderError::Unsupported(_) => "UNSUPPORTED",
        }
    }

    /// Returns true if this error is transient and the same provider could
    /// succeed on a later run.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited(_) | ProviderError::Timeout(_)
        )
    }

    /// Map an HTTP status code to the provider taxonomy.
    pub fn from_status(status: u16, context: &str) -> Self {
        match status {
            429 => ProviderError::RateLimited(format!("HTTP 429 for {context}")),
            401 | 403 => ProviderError::AuthFailed(format!("HTTP {status} for {context}")),
            _ => ProviderError::Unsupported(format!("HTTP {status} for {context}")),
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::ParseError(e.to_string())
    }
}

/// Application-wide errors. Only configuration and sink failures are fatal.
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid or missing configuration, detected before the pipeline runs.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The result sink could not deliver the run result.
    #[error("Sink error: {0}")]
    SinkError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// File or stream I/O failed.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(ProviderError::RateLimited("slow down".into()).is_retryable());
        assert!(ProviderError::Timeout(30).is_retryable());
        assert!(!ProviderError::AuthFailed("bad key".into()).is_retryable());
        assert!(!ProviderError::ParseError("bad json".into()).is_retryable());
        assert!(!ProviderError::Unsupported("no browser".into()).is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ProviderError::from_status(429, "x"),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            ProviderError::from_status(401, "x"),
            ProviderError::AuthFailed(_)
        ));
        assert!(matches!(
            ProviderError::from_status(403, "x"),
            ProviderError::AuthFailed(_)
        ));
        assert!(matches!(
            ProviderError::from_status(500, "x"),
            ProviderError::Unsupported(_)
        ));
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(ProviderError::Timeout(5).kind(), "TIMEOUT");
        assert_eq!(ProviderError::RateLimited(String::new()).kind(), "RATE_LIMITED");
        assert_eq!(
            ProviderError::Timeout(5).to_string(),
            "Timed out after 5 seconds"
        );
    }
}
