//! Backoff strategy implementations
//!
//! Exponential backoff with additive full jitter:
//!
//! ```text
//! raw    = base * 2^attempt
//! jitter = uniform(0, raw)
//! delay  = min(raw + jitter, cap)
//! ```
//!
//! The random source is pluggable through [`JitterSource`] so tests can pin
//! the exact delay instead of asserting on ranges.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of the jitter fraction applied on top of the exponential term
pub trait JitterSource: Send {
    /// A value in `[0.0, 1.0]`.
    fn fraction(&mut self) -> f64;
}

/// Jitter backed by a seedable PRNG
#[derive(Debug)]
pub struct SeededJitter {
    rng: StdRng,
}

impl SeededJitter {
    /// Seeded from the OS, for production use.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible sequence for tests and simulations.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl JitterSource for SeededJitter {
    fn fraction(&mut self) -> f64 {
        self.rng.random_range(0.0..=1.0)
    }
}

/// Constant jitter fraction (0.0 disables jitter entirely)
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn fraction(&mut self) -> f64 {
        self.0
    }
}

/// Computes retry delays; cheap to clone, clones share one jitter source
#[derive(Clone)]
pub struct Backoff {
    jitter: Arc<Mutex<Box<dyn JitterSource>>>,
}

impl Backoff {
    pub fn new(jitter: impl JitterSource + 'static) -> Self {
        Self {
            jitter: Arc::new(Mutex::new(Box::new(jitter))),
        }
    }

    /// Backoff without any random component.
    pub fn deterministic() -> Self {
        Self::new(FixedJitter(0.0))
    }

    /// Delay before retrying after attempt index `attempt` (0-indexed).
    pub fn delay(&self, attempt: u32, base: Duration, cap: Duration) -> Duration {
        let fraction = {
            let mut source = self.jitter.lock().unwrap_or_else(PoisonError::into_inner);
            source.fraction()
        };
        delay_with_fraction(attempt, base, cap, fraction)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(SeededJitter::from_entropy())
    }
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backoff").finish_non_exhaustive()
    }
}

/// Pure form of [`Backoff::delay`] with the jitter fraction supplied.
pub fn delay_with_fraction(attempt: u32, base: Duration, cap: Duration, fraction: f64) -> Duration {
    let Some(raw) = 2u32
        .checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
    else {
        return cap;
    };
    if raw >= cap {
        return cap;
    }
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    raw.saturating_add(raw.mul_f64(fraction)).min(cap)
}
