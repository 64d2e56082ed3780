//! Fault injection
//!
//! [`ScriptedTransport`] replays a fixed sequence of attempt outcomes so
//! the executor can be driven deterministically without a server. Scripts
//! can be built in code or parsed from a compact string:
//!
//! ```text
//! 500,500,429@5,200      two 5xx, a 429 with Retry-After: 5, then OK
//! drop,hang,200          connection reset, no response at all, then OK
//! ```
//!
//! Once the script is used up the final entry repeats, unless the
//! transport was made [`strict`](ScriptedTransport::strict).

use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderValue, RETRY_AFTER};
use thiserror::Error;

use crate::transport::{Transport, TransportError};
use crate::types::{RawResponse, RequestSpec};

/// One scripted attempt outcome
#[derive(Debug, Clone)]
pub enum Fault {
    /// Reply with this response
    Respond(RawResponse),
    /// Fail at the transport level, as if the connection was reset
    Disconnect,
    /// Never reply; the per-attempt deadline has to fire
    Hang,
}

impl Fault {
    pub fn status(status: u16) -> Self {
        Fault::Respond(RawResponse::new(status))
    }

    /// A 429 carrying `Retry-After: <secs>`.
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::with_retry_after(429, retry_after_secs)
    }

    pub fn with_retry_after(status: u16, retry_after_secs: u64) -> Self {
        Fault::Respond(
            RawResponse::new(status).with_header(RETRY_AFTER, HeaderValue::from(retry_after_secs)),
        )
    }

    /// An error response with a JSON `{"error": message}` body.
    pub fn error(status: u16, message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Fault::Respond(
            RawResponse::new(status)
                .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .with_body(body),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FaultParseError {
    #[error("fault script is empty")]
    Empty,

    #[error("invalid fault `{0}` (expected a status, status@retry_after, drop or hang)")]
    InvalidToken(String),
}

impl FromStr for Fault {
    type Err = FaultParseError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        match token.to_ascii_lowercase().as_str() {
            "drop" | "disconnect" => return Ok(Fault::Disconnect),
            "hang" | "timeout" => return Ok(Fault::Hang),
            _ => {}
        }

        let invalid = || FaultParseError::InvalidToken(token.to_string());
        let (status, retry_after) = match token.split_once('@') {
            Some((status, secs)) => (status, Some(secs.parse::<u64>().map_err(|_| invalid())?)),
            None => (token, None),
        };
        let status = status
            .parse::<u16>()
            .ok()
            .filter(|s| (100..=999).contains(s))
            .ok_or_else(invalid)?;

        Ok(match retry_after {
            Some(secs) => Fault::with_retry_after(status, secs),
            None => Fault::status(status),
        })
    }
}

/// [`Transport`] that replays a script instead of touching the network
#[derive(Debug)]
pub struct ScriptedTransport {
    script: Vec<Fault>,
    strict: bool,
    calls: AtomicU32,
    request_ids: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Fault>) -> Self {
        Self {
            script,
            strict: false,
            calls: AtomicU32::new(0),
            request_ids: Mutex::new(Vec::new()),
        }
    }

    /// Parse a comma-separated script such as `"500,429@5,200"`.
    pub fn parse(script: &str) -> Result<Self, FaultParseError> {
        let faults = script
            .split(',')
            .filter(|token| !token.trim().is_empty())
            .map(Fault::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        if faults.is_empty() {
            return Err(FaultParseError::Empty);
        }
        Ok(Self::new(faults))
    }

    /// Fail with a transport error once the script is used up instead of
    /// repeating the final entry.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Number of `send` calls so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Request ids in the order attempts were made.
    pub fn request_ids(&self) -> Vec<String> {
        self.request_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_fault(&self, index: usize) -> Option<&Fault> {
        match self.script.get(index) {
            Some(fault) => Some(fault),
            None if self.strict => None,
            None => self.script.last(),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, spec: &RequestSpec) -> Result<RawResponse, TransportError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        self.request_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(spec.request_id.clone());

        let Some(fault) = self.next_fault(index) else {
            return Err(TransportError::Request(format!(
                "fault script exhausted after {} calls",
                self.script.len()
            )));
        };
        tracing::trace!(index, ?fault, url = %spec.target, "Scripted attempt");

        match fault {
            Fault::Respond(response) => Ok(response.clone()),
            Fault::Disconnect => Err(TransportError::Connect(
                "connection reset by peer".to_string(),
            )),
            Fault::Hang => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::classifier::parse_retry_after;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn status_of(fault: &Fault) -> Option<u16> {
        match fault {
            Fault::Respond(response) => Some(response.status),
            _ => None,
        }
    }

    #[test]
    fn parses_mixed_script() {
        let transport = ScriptedTransport::parse("500, 429@5 ,drop,hang,200").expect("valid script");
        assert_eq!(transport.script.len(), 5);
        assert_eq!(status_of(&transport.script[0]), Some(500));
        assert!(matches!(transport.script[2], Fault::Disconnect));
        assert!(matches!(transport.script[3], Fault::Hang));
        assert_eq!(status_of(&transport.script[4]), Some(200));

        let Fault::Respond(rate_limited) = &transport.script[1] else {
            panic!("expected a response");
        };
        assert_eq!(rate_limited.status, 429);
        assert_eq!(
            parse_retry_after(&rate_limited.headers),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn rejects_bad_tokens() {
        assert_eq!(
            ScriptedTransport::parse("500,teapot").err(),
            Some(FaultParseError::InvalidToken("teapot".to_string()))
        );
        assert!(ScriptedTransport::parse("429@soon").is_err());
        assert!(ScriptedTransport::parse("42").is_err());
        assert_eq!(
            ScriptedTransport::parse(" , ").err(),
            Some(FaultParseError::Empty)
        );
    }

    #[tokio::test]
    async fn replays_in_order_then_repeats_last() {
        let transport = ScriptedTransport::new(vec![Fault::status(503), Fault::status(200)]);
        let spec = RequestSpec::get("http://scripted/");

        let mut statuses = Vec::new();
        for _ in 0..4 {
            statuses.push(transport.send(&spec).await.expect("scripted response").status);
        }
        assert_eq!(statuses, vec![503, 200, 200, 200]);
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn strict_script_runs_dry() {
        let transport = ScriptedTransport::new(vec![Fault::status(200)]).strict();
        let spec = RequestSpec::get("http://scripted/");

        assert!(transport.send(&spec).await.is_ok());
        assert!(matches!(
            transport.send(&spec).await,
            Err(TransportError::Request(_))
        ));
    }

    #[tokio::test]
    async fn disconnect_is_a_connect_error() {
        let transport = ScriptedTransport::new(vec![Fault::Disconnect]);
        let err = transport
            .send(&RequestSpec::get("http://scripted/"))
            .await
            .expect_err("scripted disconnect");
        assert!(matches!(err, TransportError::Connect(_)));
    }

    #[tokio::test]
    async fn error_fault_carries_json_body() {
        let transport = ScriptedTransport::new(vec![Fault::error(503, "maintenance")]);
        let raw = transport
            .send(&RequestSpec::get("http://scripted/"))
            .await
            .expect("scripted response");
        assert_eq!(raw.status, 503);
        assert_eq!(&raw.body[..], br#"{"error":"maintenance"}"#);
    }

    #[tokio::test]
    async fn records_request_ids() {
        let transport = ScriptedTransport::new(vec![Fault::status(200)]);
        let spec = RequestSpec::get("http://scripted/").with_request_id("abc");
        transport.send(&spec).await.expect("ok");
        transport.send(&spec).await.expect("ok");
        assert_eq!(transport.request_ids(), vec!["abc", "abc"]);
    }
}
