//! Failure classification for retry decisions
//!
//! Maps one attempt's raw result (transport error, deadline expiry, or HTTP
//! status) onto an [`AttemptOutcome`]. The executor only ever branches on
//! the outcome variant; the wrapped [`ErrorKind`] is what eventually
//! surfaces to the caller.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;

use crate::error::ErrorKind;
use crate::transport::TransportError;
use crate::types::RawResponse;

/// Classified reason plus optional detail text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub details: Option<String>,
}

impl Failure {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            details: None,
        }
    }

    pub fn with_details(kind: ErrorKind, details: impl Into<String>) -> Self {
        Self {
            kind,
            details: Some(details.into()),
        }
    }
}

/// Disposition of exactly one attempt
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Success(RawResponse),
    RetryableFailure(Failure),
    RateLimited {
        retry_after: Option<Duration>,
        details: Option<String>,
    },
    TerminalFailure(Failure),
}

impl AttemptOutcome {
    /// The response on success, otherwise the failure this outcome would
    /// surface as if no attempts remained.
    pub fn into_result(self) -> Result<RawResponse, Failure> {
        match self {
            AttemptOutcome::Success(raw) => Ok(raw),
            AttemptOutcome::RetryableFailure(failure) | AttemptOutcome::TerminalFailure(failure) => {
                Err(failure)
            }
            AttemptOutcome::RateLimited {
                retry_after,
                details,
            } => Err(Failure {
                kind: ErrorKind::RateLimited { retry_after },
                details,
            }),
        }
    }
}

/// Classify a response that arrived before the deadline.
pub fn classify_response(response: RawResponse) -> AttemptOutcome {
    let status = response.status;
    match status {
        s if s < 400 => AttemptOutcome::Success(response),
        401 => AttemptOutcome::TerminalFailure(Failure {
            kind: ErrorKind::Unauthorized,
            details: error_details(&response),
        }),
        429 => AttemptOutcome::RateLimited {
            retry_after: parse_retry_after(&response.headers),
            details: error_details(&response),
        },
        s if s >= 500 => AttemptOutcome::RetryableFailure(Failure {
            kind: ErrorKind::ServerError(s),
            details: error_details(&response),
        }),
        s => AttemptOutcome::TerminalFailure(Failure {
            kind: ErrorKind::ClientError(s),
            details: error_details(&response),
        }),
    }
}

/// Classify a transport-level failure. Always retryable.
pub fn classify_transport_error(err: &TransportError) -> AttemptOutcome {
    let kind = match err {
        TransportError::Timeout => ErrorKind::Timeout,
        _ => ErrorKind::NetworkError,
    };
    AttemptOutcome::RetryableFailure(Failure::with_details(kind, err.to_string()))
}

/// Outcome used when the per-attempt deadline fires first.
pub fn deadline_elapsed(timeout: Duration) -> AttemptOutcome {
    AttemptOutcome::RetryableFailure(Failure::with_details(
        ErrorKind::Timeout,
        format!("no response after {}ms", timeout.as_millis()),
    ))
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Pull the JSON `error` field out of an error body, falling back to
/// `HTTP Error <status>` when the body is absent or not shaped that way.
pub fn error_details(response: &RawResponse) -> Option<String> {
    let from_body = serde_json::from_slice::<ErrorBody>(&response.body)
        .ok()
        .and_then(|body| body.error)
        .filter(|msg| !msg.is_empty());
    Some(from_body.unwrap_or_else(|| format!("HTTP Error {}", response.status)))
}

/// Parse a `Retry-After` header.
///
/// Accepts delta-seconds (`Retry-After: 5`) and the HTTP-date form. Dates
/// in the past resolve to a zero wait. Anything unparseable, or too large
/// to represent as a `Duration`, is treated as no hint at all.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if let Ok(secs) = value.parse::<f64>()
        && secs.is_finite()
        && secs >= 0.0
    {
        return Duration::try_from_secs_f64(secs).ok();
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    let wait = at.with_timezone(&Utc) - Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reqwest::header::HeaderValue;

    fn response(status: u16) -> RawResponse {
        RawResponse::new(status)
    }

    #[test]
    fn success_below_400() {
        for status in [200, 201, 204, 301, 304, 399] {
            assert!(
                matches!(classify_response(response(status)), AttemptOutcome::Success(_)),
                "expected Success for {status}"
            );
        }
    }

    #[test]
    fn unauthorized_is_terminal() {
        let outcome = classify_response(response(401));
        let AttemptOutcome::TerminalFailure(failure) = outcome else {
            panic!("expected terminal failure, got {outcome:?}");
        };
        assert_eq!(failure.kind, ErrorKind::Unauthorized);
    }

    #[test]
    fn rate_limit_reads_retry_after() {
        let raw = response(429).with_header(RETRY_AFTER, HeaderValue::from_static("5"));
        let outcome = classify_response(raw);
        assert!(matches!(
            outcome,
            AttemptOutcome::RateLimited { retry_after: Some(d), .. } if d == Duration::from_secs(5)
        ));
    }

    #[test]
    fn rate_limit_without_hint() {
        let outcome = classify_response(response(429));
        assert!(matches!(
            outcome,
            AttemptOutcome::RateLimited {
                retry_after: None,
                ..
            }
        ));
    }

    #[test]
    fn server_errors_are_retryable() {
        for status in [500, 502, 503, 504, 599] {
            let outcome = classify_response(response(status));
            let AttemptOutcome::RetryableFailure(failure) = outcome else {
                panic!("expected retryable failure for {status}");
            };
            assert_eq!(failure.kind, ErrorKind::ServerError(status));
        }
    }

    #[test]
    fn other_client_errors_are_terminal() {
        for status in [400, 403, 404, 405, 409, 422] {
            let outcome = classify_response(response(status));
            let AttemptOutcome::TerminalFailure(failure) = outcome else {
                panic!("expected terminal failure for {status}");
            };
            assert_eq!(failure.kind, ErrorKind::ClientError(status));
        }
    }

    #[test]
    fn details_from_json_error_field() {
        let raw = response(404).with_body(r#"{"error": "Item not found"}"#);
        assert_eq!(error_details(&raw), Some("Item not found".to_string()));
    }

    #[test]
    fn details_fall_back_to_status() {
        assert_eq!(
            error_details(&response(500).with_body("<html>oops</html>")),
            Some("HTTP Error 500".to_string())
        );
        assert_eq!(
            error_details(&response(400).with_body("{}")),
            Some("HTTP Error 400".to_string())
        );
    }

    #[test]
    fn transport_errors_are_retryable() {
        let outcome = classify_transport_error(&TransportError::Timeout);
        assert!(matches!(
            outcome,
            AttemptOutcome::RetryableFailure(Failure { kind: ErrorKind::Timeout, .. })
        ));

        let outcome =
            classify_transport_error(&TransportError::Connect("connection refused".to_string()));
        let AttemptOutcome::RetryableFailure(failure) = outcome else {
            panic!("expected retryable failure");
        };
        assert_eq!(failure.kind, ErrorKind::NetworkError);
        assert!(
            failure
                .details
                .as_deref()
                .is_some_and(|d| d.contains("connection refused"))
        );
    }

    #[test]
    fn parse_retry_after_variants() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static(" 12 "));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("1.5"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_millis(1500)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("18446744073709551615"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(u64::MAX)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("1e300"));
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("-3"));
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));
    }

    #[test]
    fn rate_limited_outcome_carries_its_hint() {
        let outcome = AttemptOutcome::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
            details: None,
        };
        assert_eq!(
            outcome.into_result().map_err(|f| f.kind).err(),
            Some(ErrorKind::RateLimited {
                retry_after: Some(Duration::from_secs(2))
            })
        );
    }

    #[test]
    fn success_outcome_yields_the_response() {
        let outcome = classify_response(RawResponse::new(204));
        assert_eq!(outcome.into_result().ok().map(|raw| raw.status), Some(204));
    }
}
