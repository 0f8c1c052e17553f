// src/error.rs
//! Fetch error taxonomy. The retry policy needs a real classification here,
//! so this is an explicit enum rather than an opaque `anyhow::Error`.

use std::fmt;

/// Classified failure of a single HTTP attempt (or of payload parsing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// DNS, connect, TLS or other transport-level failure.
    Network(String),
    /// The request exceeded the configured deadline.
    Timeout,
    /// Non-success HTTP status.
    Status(u16),
    /// Payload was not recognizable as a feed or article.
    Parse(String),
}

impl FetchError {
    /// Transient failures are eligible for retry: network/timeout errors plus
    /// HTTP 429 and 5xx. Other 4xx and parse failures are terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout => true,
            FetchError::Status(code) => *code == 429 || (500..=599).contains(code),
            FetchError::Parse(_) => false,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Timeout => "timeout",
            FetchError::Status(_) => "status",
            FetchError::Parse(_) => "parse",
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Network(msg) => write!(f, "network error: {msg}"),
            FetchError::Timeout => write!(f, "request timed out"),
            FetchError::Status(code) => write!(f, "http status {code}"),
            FetchError::Parse(msg) => write!(f, "unparseable payload: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Per-source configuration problem found while preparing a source.
/// Fatal for that source only; other sources keep running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingEndpoint,
    InvalidUrl(String),
    BadPattern(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingEndpoint => write!(f, "source has no feed or seed URL"),
            ConfigError::InvalidUrl(u) => write!(f, "invalid URL: {u}"),
            ConfigError::BadPattern(p) => write!(f, "invalid regex pattern: {p}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(FetchError::Timeout.is_transient());
        assert!(FetchError::Network("refused".into()).is_transient());
        assert!(FetchError::Status(429).is_transient());
        assert!(FetchError::Status(503).is_transient());
        assert!(!FetchError::Status(404).is_transient());
        assert!(!FetchError::Status(403).is_transient());
        assert!(!FetchError::Parse("empty".into()).is_transient());
    }
}
