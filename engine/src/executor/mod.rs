//! Request Executor
//!
//! Orchestrates one logical call end to end:
//!
//! ```text
//! caller ─► breaker gate ─► send (deadline) ─► classify ─┬─► return
//!                              ▲                         │
//!                              └──── backoff / 429 wait ◄┘
//! ```
//!
//! - The breaker is consulted once, at entry. Calls flagged
//!   `bypass_breaker` skip the gate but still report their outcome.
//! - Each attempt is bounded by `timeout_per_attempt`; an expired deadline
//!   drops the in-flight send and counts as a retryable `Timeout`.
//! - A 429 with a `Retry-After` hint waits exactly that long; without a
//!   hint it falls back to the computed backoff for that attempt.
//! - Only exhaustion of the whole budget counts toward the breaker.
//!   `Unauthorized` and client errors return immediately without counting
//!   (client errors count when `count_client_errors` is set).
//! - An outer `CancellationToken` stops the call between or during
//!   attempts and leaves the breaker untouched.

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cancel::{OrCancelExt, sleep_or_cancel};
use crate::config::EngineConfig;
use crate::error::{ErrorInfo, ErrorKind, Result};
use crate::retry::classifier::{
    classify_response, classify_transport_error, deadline_elapsed,
};
use crate::retry::{Backoff, CircuitBreaker, Failure, RetryPolicy, RetryStatus};
use crate::transport::{ReqwestTransport, Transport, TransportError};
use crate::types::{RequestSpec, Response};

/// Resilient executor for outbound calls
///
/// Cheap to clone; clones share the transport, breaker and jitter source.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    breaker: CircuitBreaker,
    backoff: Backoff,
}

impl RequestExecutor {
    /// Executor with a default breaker and OS-seeded jitter.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            breaker: CircuitBreaker::default(),
            backoff: Backoff::default(),
        }
    }

    /// Build a reqwest-backed executor from loaded configuration.
    pub fn from_config(config: &EngineConfig) -> std::result::Result<Self, TransportError> {
        let transport = ReqwestTransport::new(&config.transport)?;
        Ok(Self::new(Arc::new(transport))
            .with_breaker(CircuitBreaker::new(config.breaker.to_policy())))
    }

    /// Share an existing breaker (e.g. one per backend host).
    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// True while new non-bypass calls are being rejected.
    pub fn is_degraded(&self) -> bool {
        self.breaker.is_degraded()
    }

    /// Execute `spec` under `policy` with no outer cancellation scope.
    pub async fn execute(&self, spec: &RequestSpec, policy: &RetryPolicy) -> Result<Response> {
        self.execute_cancellable(spec, policy, &CancellationToken::new(), |_| {})
            .await
    }

    /// Execute `spec` under `policy`.
    ///
    /// `on_retry` is invoked before every wait with the attempt that just
    /// failed and how long the executor is about to sleep. Cancelling
    /// `cancel` aborts promptly with [`ErrorKind::Cancelled`]; `attempts`
    /// then counts only the attempts that completed.
    pub async fn execute_cancellable<F>(
        &self,
        spec: &RequestSpec,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        mut on_retry: F,
    ) -> Result<Response>
    where
        F: FnMut(RetryStatus) + Send,
    {
        policy.validate().map_err(ErrorInfo::invalid_policy)?;

        if spec.bypass_breaker {
            debug!(url = %spec.target, request_id = %spec.request_id, "Bypassing circuit breaker");
        } else if self.breaker.is_degraded() {
            warn!(
                url = %spec.target,
                request_id = %spec.request_id,
                "Request blocked, system in degraded mode"
            );
            return Err(ErrorInfo::degraded());
        }

        let started = Instant::now();
        for attempt in 0..policy.max_attempts {
            let attempt_no = attempt + 1;

            let sent = tokio::time::timeout(policy.timeout_per_attempt, self.transport.send(spec))
                .or_cancel(cancel)
                .await;
            let outcome = match sent {
                Err(_) => return Err(self.cancelled(spec, attempt)),
                Ok(Err(_elapsed)) => deadline_elapsed(policy.timeout_per_attempt),
                Ok(Ok(Err(err))) => classify_transport_error(&err),
                Ok(Ok(Ok(raw))) => classify_response(raw),
            };

            let failure = match outcome.into_result() {
                Ok(raw) => {
                    self.breaker.record_success();
                    debug!(
                        url = %spec.target,
                        request_id = %spec.request_id,
                        status = raw.status,
                        attempt = attempt_no,
                        "Request succeeded"
                    );
                    return Ok(Response::from_raw(raw, attempt_no, &spec.request_id));
                }
                Err(failure) if !failure.kind.is_retryable() => {
                    return Err(self.terminal(spec, failure, attempt_no));
                }
                Err(failure) => failure,
            };

            if attempt_no >= policy.max_attempts {
                return Err(self.exhausted(spec, failure, attempt_no));
            }

            let (is_rate_limit, retry_after) = match failure.kind {
                ErrorKind::RateLimited { retry_after } => (true, retry_after),
                _ => (false, None),
            };
            let sleep = retry_after.unwrap_or_else(|| {
                self.backoff
                    .delay(attempt, policy.base_delay, policy.max_delay)
            });
            let reason = match &failure.details {
                Some(details) => format!("{}: {details}", failure.kind),
                None => failure.kind.to_string(),
            };

            if is_rate_limit {
                info!(
                    url = %spec.target,
                    request_id = %spec.request_id,
                    attempt = attempt_no,
                    wait_ms = sleep.as_millis() as u64,
                    server_hint = retry_after.is_some(),
                    "Rate limited, waiting before retry"
                );
            } else {
                warn!(
                    url = %spec.target,
                    request_id = %spec.request_id,
                    attempt = attempt_no,
                    max_attempts = policy.max_attempts,
                    wait_ms = sleep.as_millis() as u64,
                    %reason,
                    "Attempt failed, retrying"
                );
            }

            on_retry(RetryStatus {
                attempt: attempt_no,
                max_attempts: policy.max_attempts,
                elapsed: started.elapsed(),
                sleep,
                reason,
                is_rate_limit,
            });

            if sleep_or_cancel(sleep, cancel).await.is_err() {
                return Err(self.cancelled(spec, attempt_no));
            }
        }

        // validate() guarantees at least one attempt, so the loop always returns.
        Err(ErrorInfo::invalid_policy("max_attempts must be at least 1"))
    }

    fn terminal(&self, spec: &RequestSpec, failure: Failure, attempts: u32) -> ErrorInfo {
        if matches!(failure.kind, ErrorKind::ClientError(_))
            && self.breaker.policy().count_client_errors
        {
            self.breaker.record_failure();
        }
        info!(
            url = %spec.target,
            request_id = %spec.request_id,
            attempt = attempts,
            kind = %failure.kind,
            "Request failed, not retrying"
        );
        ErrorInfo::new(failure.kind)
            .with_details(failure.details)
            .with_attempts(attempts)
    }

    fn exhausted(&self, spec: &RequestSpec, failure: Failure, attempts: u32) -> ErrorInfo {
        let tripped = self.breaker.record_failure();
        warn!(
            url = %spec.target,
            request_id = %spec.request_id,
            attempts,
            kind = %failure.kind,
            tripped,
            "Retry budget exhausted"
        );
        ErrorInfo::new(failure.kind)
            .with_details(failure.details)
            .with_attempts(attempts)
            .exhausted()
    }

    fn cancelled(&self, spec: &RequestSpec, completed: u32) -> ErrorInfo {
        info!(
            url = %spec.target,
            request_id = %spec.request_id,
            attempts = completed,
            "Request cancelled"
        );
        ErrorInfo::cancelled(completed)
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("breaker", &self.breaker)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}
