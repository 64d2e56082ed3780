//! Error types for resilient request execution
//!
//! Every call made through [`crate::RequestExecutor`] ends in either a
//! [`crate::Response`] or an [`ErrorInfo`]. `ErrorInfo` carries the
//! classified reason ([`ErrorKind`]), an optional server-supplied detail
//! message, and enough bookkeeping (`attempts`, `exhausted`) for the
//! caller to tell "gave up after N tries" apart from "rejected by the
//! breaker" or "rejected on the first try".

use std::time::Duration;
use thiserror::Error;

/// Engine result type alias
pub type Result<T> = std::result::Result<T, ErrorInfo>;

/// Classified failure reasons
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// Connection refused, DNS failure, reset, malformed response, ...
    #[error("network error")]
    NetworkError,

    /// The per-attempt deadline elapsed before a response arrived
    #[error("request timed out")]
    Timeout,

    /// HTTP 5xx
    #[error("server error (HTTP {0})")]
    ServerError(u16),

    /// HTTP 4xx other than 401 and 429
    #[error("client error (HTTP {0})")]
    ClientError(u16),

    /// HTTP 401; callers usually redirect to re-authentication
    #[error("unauthorized")]
    Unauthorized,

    /// HTTP 429 on the final attempt
    #[error("rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    /// Breaker is open; no network attempt was made
    #[error("system in degraded mode, request blocked")]
    DegradedMode,

    /// Outer cancellation scope fired
    #[error("request cancelled")]
    Cancelled,

    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),
}

impl ErrorKind {
    /// Kinds the executor retries locally while budget remains.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkError
                | ErrorKind::Timeout
                | ErrorKind::ServerError(_)
                | ErrorKind::RateLimited { .. }
        )
    }
}

/// Error surfaced to callers of the executor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}{}", self.suffix())]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    /// Server-supplied detail (JSON `error` field) or transport message
    pub details: Option<String>,
    /// Number of transport attempts made; 0 when rejected at the gate
    pub attempts: u32,
    /// True when the retry budget ran out on a retryable reason
    pub exhausted: bool,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            details: None,
            attempts: 0,
            exhausted: false,
        }
    }

    pub fn degraded() -> Self {
        Self::new(ErrorKind::DegradedMode)
    }

    pub fn cancelled(attempts: u32) -> Self {
        Self::new(ErrorKind::Cancelled).with_attempts(attempts)
    }

    pub fn invalid_policy(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidPolicy(reason.into()))
    }

    pub fn with_details(mut self, details: Option<String>) -> Self {
        self.details = details;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub(crate) fn exhausted(mut self) -> Self {
        self.exhausted = true;
        self
    }

    pub fn is_degraded(&self) -> bool {
        self.kind == ErrorKind::DegradedMode
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == ErrorKind::Unauthorized
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    fn suffix(&self) -> String {
        let mut suffix = String::new();
        if let Some(details) = &self.details {
            suffix.push_str(": ");
            suffix.push_str(details);
        }
        if self.exhausted {
            let plural = if self.attempts == 1 { "" } else { "s" };
            suffix.push_str(&format!(" (gave up after {} attempt{plural})", self.attempts));
        }
        suffix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::NetworkError.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::ServerError(503).is_retryable());
        assert!(ErrorKind::RateLimited { retry_after: None }.is_retryable());

        assert!(!ErrorKind::Unauthorized.is_retryable());
        assert!(!ErrorKind::ClientError(404).is_retryable());
        assert!(!ErrorKind::DegradedMode.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
    }

    #[test]
    fn display_includes_details_and_attempts() {
        let err = ErrorInfo::new(ErrorKind::ServerError(500))
            .with_details(Some("database unavailable".to_string()))
            .with_attempts(3)
            .exhausted();

        assert_eq!(
            err.to_string(),
            "server error (HTTP 500): database unavailable (gave up after 3 attempts)"
        );
    }

    #[test]
    fn display_single_attempt_without_details() {
        let err = ErrorInfo::new(ErrorKind::Timeout)
            .with_attempts(1)
            .exhausted();
        assert_eq!(err.to_string(), "request timed out (gave up after 1 attempt)");

        let err = ErrorInfo::new(ErrorKind::Unauthorized).with_attempts(1);
        assert_eq!(err.to_string(), "unauthorized");

        let source: &dyn std::error::Error = &err;
        assert!(source.source().is_none());
    }

    #[test]
    fn degraded_has_no_attempts() {
        let err = ErrorInfo::degraded();
        assert!(err.is_degraded());
        assert_eq!(err.attempts, 0);
        assert!(!err.exhausted);
        assert_eq!(err.to_string(), "system in degraded mode, request blocked");
    }
}
