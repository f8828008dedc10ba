// for error definitions
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// How bad an error is, used for log routing and aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag that retry and circuit breaker logic inspect instead of matching on types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Transient failure explicitly marked as safe to retry
    Retryable,
    /// Terminal condition, e.g. malformed input parameters
    NonRetryable,
    /// Returned without invoking the operation while a breaker is open
    CircuitBreakerOpen,
    /// Remote service signaled throttling
    RateLimit,
    /// Response body is not the shape we expect
    DataFormat,
    /// Response is well formed but statistically suspect
    DataQuality,
    /// Connectivity-level failure
    Network,
    /// Request did not complete in time
    Timeout,
    /// Client session was released before or during the call
    ClientClosed,
    /// Invalid configuration
    Config,
    /// Local cache or file errors
    Storage,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Retryable => "RetryableError",
            ErrorKind::NonRetryable => "NonRetryableError",
            ErrorKind::CircuitBreakerOpen => "CircuitBreakerOpenError",
            ErrorKind::RateLimit => "RateLimitError",
            ErrorKind::DataFormat => "DataFormatError",
            ErrorKind::DataQuality => "DataQualityError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::ClientClosed => "ClientClosedError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Storage => "StorageError",
        }
    }

    /// Kinds that no retry policy may ever retry
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ErrorKind::NonRetryable
                | ErrorKind::CircuitBreakerOpen
                | ErrorKind::ClientClosed
                | ErrorKind::Config
        )
    }

    /// Kinds that are worth another attempt after a backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::Retryable
                | ErrorKind::RateLimit
                | ErrorKind::DataFormat
                | ErrorKind::Network
                | ErrorKind::Timeout
        )
    }

    fn default_severity(&self) -> Severity {
        match self {
            ErrorKind::DataQuality | ErrorKind::RateLimit | ErrorKind::Storage => Severity::Low,
            ErrorKind::Config | ErrorKind::CircuitBreakerOpen => Severity::High,
            _ => Severity::Medium,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Domain error carried through every client and resilience component
#[derive(Error, Debug, Clone, Serialize)]
#[error("{kind}: {message}")]
pub struct SeismicError {
    pub kind: ErrorKind,
    pub message: String,
    pub severity: Severity,
    pub error_code: Option<String>,
    pub details: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl SeismicError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            severity: kind.default_severity(),
            error_code: None,
            details: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Retryable, message)
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NonRetryable, message)
    }

    pub fn circuit_open(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CircuitBreakerOpen, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, message)
    }

    pub fn data_format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DataFormat, message)
    }

    pub fn data_quality(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DataQuality, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn client_closed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ClientClosed, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.insert(key.into(), value.to_string());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

// implement conversions from std::io::Error to SeismicError
impl From<std::io::Error> for SeismicError {
    fn from(err: std::io::Error) -> Self {
        SeismicError::storage(err.to_string()).with_detail("io_kind", format!("{:?}", err.kind()))
    }
}

// implement conversions from serde_json::Error to SeismicError
impl From<serde_json::Error> for SeismicError {
    fn from(err: serde_json::Error) -> Self {
        SeismicError::data_format(format!("Invalid JSON: {}", err))
            .with_detail("line", err.line())
            .with_detail("column", err.column())
    }
}

// Implement conversions from reqwest::Error to SeismicError
impl From<reqwest::Error> for SeismicError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string());
        let converted = if err.is_timeout() {
            SeismicError::timeout(format!("Request timed out: {}", err))
        } else if err.is_builder() {
            // Malformed URL or parameters: retrying cannot help
            SeismicError::non_retryable(format!("Invalid request: {}", err))
        } else if err.is_decode() {
            SeismicError::data_format(format!("Failed to decode response: {}", err))
        } else if let Some(status) = err.status() {
            SeismicError::network(format!("HTTP error: {}", err)).with_code(status.as_str())
        } else {
            SeismicError::network(format!("Connection error: {}", err))
        };
        match url {
            Some(url) => converted.with_detail("url", url),
            None => converted,
        }
    }
}

// define a Result type alias for convenience
pub type Result<T> = std::result::Result<T, SeismicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_and_transient_are_disjoint() {
        let kinds = [
            ErrorKind::Retryable,
            ErrorKind::NonRetryable,
            ErrorKind::CircuitBreakerOpen,
            ErrorKind::RateLimit,
            ErrorKind::DataFormat,
            ErrorKind::DataQuality,
            ErrorKind::Network,
            ErrorKind::Timeout,
            ErrorKind::ClientClosed,
            ErrorKind::Config,
            ErrorKind::Storage,
        ];
        for kind in kinds {
            assert!(
                !(kind.is_terminal() && kind.is_transient()),
                "{} cannot be both terminal and transient",
                kind
            );
        }
        assert!(!ErrorKind::DataQuality.is_transient());
        assert!(ErrorKind::RateLimit.is_transient());
    }

    #[test]
    fn test_display_keeps_kind_and_message() {
        let err = SeismicError::rate_limit("API rate limit exceeded").with_code("429");
        assert_eq!(err.to_string(), "RateLimitError: API rate limit exceeded");
        assert_eq!(err.error_code.as_deref(), Some("429"));
        assert_eq!(err.severity, Severity::Low);
    }

    #[test]
    fn test_json_error_maps_to_data_format() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: SeismicError = parse_err.into();
        assert_eq!(err.kind, ErrorKind::DataFormat);
        assert!(err.details.contains_key("line"));
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let err: SeismicError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        assert_eq!(err.kind, ErrorKind::Storage);
        assert_eq!(err.details.get("io_kind").map(String::as_str), Some("NotFound"));
    }
}
