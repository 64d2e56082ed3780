//! Backstop resilient request engine
//!
//! Wraps a single outbound HTTP call with retry, exponential backoff with
//! jitter, `Retry-After` compliance and a shared circuit breaker that puts
//! the client into degraded mode after repeated exhausted calls.
//!
//! ```no_run
//! use backstop_engine::{ConfigLoader, RequestExecutor, RequestSpec};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ConfigLoader::load_default()?;
//! let executor = RequestExecutor::from_config(&config)?;
//! let response = executor
//!     .execute(&RequestSpec::get("http://localhost:8000/items/"), &config.retry.to_policy())
//!     .await?;
//! println!("{} after {} attempt(s)", response.status, response.attempts);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod cancel;
pub mod config;
pub mod error;
pub mod executor;
pub mod faults;
pub mod retry;
pub mod transport;
pub mod types;

pub use config::{ConfigLoader, EngineConfig};
pub use error::{ErrorInfo, ErrorKind, Result};
pub use executor::RequestExecutor;
pub use retry::{BreakerPolicy, CircuitBreaker, CircuitState, RetryPolicy, RetryStatus};
pub use transport::{ReqwestTransport, Transport, TransportError};
pub use types::{RawResponse, RequestSpec, Response};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
