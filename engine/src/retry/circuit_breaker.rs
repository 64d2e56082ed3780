//! Circuit breaker ("degraded mode")
//!
//! ```text
//! CLOSED ──[threshold exhausted calls]──► OPEN ──[cooldown elapsed]──► CLOSED
//! ```
//!
//! Only a call that used up its whole retry budget counts as a failure; a
//! call that retried three times and then gave up counts once. There is no
//! half-open probing: after `cooldown` the breaker closes unconditionally
//! and the failure counter starts over from zero.
//!
//! The handle is cheap to clone and every clone observes the same state.
//! All read-modify-write sequences run under one mutex, so concurrent calls
//! exhausting at the same moment cannot lose increments or trip twice.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Breaker state as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Rejecting non-bypass calls until the cooldown elapses
    Open,
}

/// Runtime breaker parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerPolicy {
    /// Exhausted calls in a row needed to trip (>= 1)
    pub threshold: u32,
    pub cooldown: Duration,
    /// Count 4xx responses other than 401/429 as breaker failures
    pub count_client_errors: bool,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            threshold: 3,
            cooldown: Duration::from_secs(10),
            count_client_errors: false,
        }
    }
}

/// Point-in-time view of the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at: Option<Instant>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
struct Shared {
    policy: BreakerPolicy,
    inner: Mutex<BreakerInner>,
    state_tx: watch::Sender<CircuitState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a pending OPEN -> CLOSED transition. Returns true if it fired.
    fn expire(&self, inner: &mut BreakerInner, now: Instant) -> bool {
        let Some(opened_at) = inner.opened_at else {
            return false;
        };
        if now < opened_at + self.policy.cooldown {
            return false;
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        self.state_tx.send_replace(CircuitState::Closed);
        tracing::info!(
            cooldown_ms = self.policy.cooldown.as_millis() as u64,
            "Circuit breaker closed, degraded mode off"
        );
        true
    }
}

/// Shared degraded-mode controller
#[derive(Clone, Debug)]
pub struct CircuitBreaker {
    shared: Arc<Shared>,
}

impl CircuitBreaker {
    pub fn new(policy: BreakerPolicy) -> Self {
        let (state_tx, _) = watch::channel(CircuitState::Closed);
        Self {
            shared: Arc::new(Shared {
                policy,
                inner: Mutex::new(BreakerInner {
                    state: CircuitState::Closed,
                    consecutive_failures: 0,
                    opened_at: None,
                }),
                state_tx,
            }),
        }
    }

    pub fn policy(&self) -> &BreakerPolicy {
        &self.shared.policy
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut inner = self.shared.lock();
        self.shared.expire(&mut inner, Instant::now());
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            opened_at: inner.opened_at,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.snapshot().state
    }

    /// True while the breaker is open.
    pub fn is_degraded(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Receive every state transition. The current value is the state at
    /// the time of the last transition.
    pub fn subscribe(&self) -> watch::Receiver<CircuitState> {
        self.shared.state_tx.subscribe()
    }

    /// A call completed successfully.
    ///
    /// Resets the failure streak. An open breaker stays open until its
    /// cooldown elapses.
    pub fn record_success(&self) {
        let mut inner = self.shared.lock();
        self.shared.expire(&mut inner, Instant::now());
        inner.consecutive_failures = 0;
    }

    /// A call exhausted its retry budget. Returns true if this failure
    /// tripped the breaker.
    pub fn record_failure(&self) -> bool {
        let now = Instant::now();
        let mut inner = self.shared.lock();
        self.shared.expire(&mut inner, now);
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        if inner.state == CircuitState::Open
            || inner.consecutive_failures < self.shared.policy.threshold
        {
            tracing::debug!(
                consecutive_failures = inner.consecutive_failures,
                threshold = self.shared.policy.threshold,
                "Breaker failure recorded"
            );
            return false;
        }

        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        self.shared.state_tx.send_replace(CircuitState::Open);
        tracing::warn!(
            consecutive_failures = inner.consecutive_failures,
            cooldown_ms = self.shared.policy.cooldown.as_millis() as u64,
            "System overloaded, circuit breaker open (degraded mode)"
        );
        drop(inner);

        self.schedule_close(now + self.shared.policy.cooldown);
        true
    }

    /// Close the breaker once `deadline` passes, whether or not any call
    /// arrives in the meantime. Without a runtime the transition is still
    /// applied lazily by the next read.
    fn schedule_close(&self, deadline: Instant) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let shared = Arc::downgrade(&self.shared);
        handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(shared) = shared.upgrade() {
                let mut inner = shared.lock();
                shared.expire(&mut inner, Instant::now());
            }
        });
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerPolicy::default())
    }
}
