//! Transport boundary
//!
//! The executor never talks to the network directly. It hands a
//! [`RequestSpec`] to a [`Transport`] and gets back either the raw
//! `(status, headers, body)` triple or a [`TransportError`]. Deadlines are
//! enforced by the executor, which drops the `send` future when the
//! per-attempt timeout elapses.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use thiserror::Error;

use crate::config::TransportConfig;
use crate::types::{RawResponse, RequestSpec};

/// Transport-level failures (no HTTP status available)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Performs one attempt of an outbound call
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, spec: &RequestSpec) -> Result<RawResponse, TransportError>;
}

/// [`Transport`] over a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    request_id_header: Option<HeaderName>,
}

impl ReqwestTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(ms) = config.connect_timeout_ms {
            builder = builder.connect_timeout(Duration::from_millis(ms));
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Request(format!("failed to build HTTP client: {e}")))?;

        let request_id_header = match config.request_id_header.as_deref() {
            Some(name) if !name.is_empty() => Some(
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| TransportError::Request(format!("invalid header {name}: {e}")))?,
            ),
            _ => None,
        };

        Ok(Self {
            client,
            request_id_header,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, spec: &RequestSpec) -> Result<RawResponse, TransportError> {
        let mut request = self
            .client
            .request(spec.method.clone(), &spec.target)
            .headers(spec.headers.clone());

        if let Some(name) = &self.request_id_header
            && !spec.headers.contains_key(name)
            && let Ok(value) = HeaderValue::from_str(&spec.request_id)
        {
            request = request.header(name.clone(), value);
        }
        if let Some(body) = &spec.body {
            request = request.body(body.clone());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
