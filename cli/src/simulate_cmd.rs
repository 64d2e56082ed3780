//! `backstop simulate`
//!
//! Drives the executor against a [`ScriptedTransport`] so the retry and
//! degraded-mode behavior can be observed without a server. All calls share
//! one transport (the script keeps advancing across calls) and one breaker.
//! The exit code follows the last call that ran, so a run ending in degraded
//! mode exits 2.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use backstop_engine::faults::ScriptedTransport;
use backstop_engine::retry::{Backoff, SeededJitter};
use backstop_engine::{
    BreakerPolicy, CircuitBreaker, CircuitState, EngineConfig, RequestExecutor, RequestSpec,
};
use clap::Args;

use crate::{EXIT_INFRA, EXIT_OK, RetryOverrides, exit_code_for};
use crate::fetch_cmd::cancel_on_ctrl_c;

/// Arguments for `backstop simulate`
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Comma-separated outcomes, e.g. `500,500,429@5,200` (also `drop`, `hang`)
    pub script: String,

    /// Number of logical calls to run
    #[arg(long = "calls", short = 'n', default_value = "1")]
    pub calls: u32,

    /// Pause between calls in milliseconds
    #[arg(long = "interval-ms", value_name = "MS", default_value = "0")]
    pub interval_ms: u64,

    /// Breaker threshold override
    #[arg(long = "threshold", value_name = "N")]
    pub threshold: Option<u32>,

    /// Breaker cooldown override in milliseconds
    #[arg(long = "cooldown-ms", value_name = "MS")]
    pub cooldown_ms: Option<u64>,

    /// Seed for the jitter source (reproducible delays)
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    #[command(flatten)]
    pub retry: RetryOverrides,
}

pub async fn run_simulate(config: &EngineConfig, args: SimulateArgs) -> anyhow::Result<i32> {
    let transport = match ScriptedTransport::parse(&args.script) {
        Ok(transport) => Arc::new(transport),
        Err(err) => {
            eprintln!("Error: {err}");
            return Ok(EXIT_INFRA);
        }
    };
    let policy = args.retry.apply(&config.retry)?;

    let breaker_policy = BreakerPolicy {
        threshold: args.threshold.unwrap_or(config.breaker.failure_threshold),
        cooldown: Duration::from_millis(args.cooldown_ms.unwrap_or(config.breaker.cooldown_ms)),
        count_client_errors: config.breaker.count_client_errors,
    };
    if breaker_policy.threshold == 0 {
        anyhow::bail!("--threshold must be at least 1");
    }

    let backoff = match args.seed {
        Some(seed) => Backoff::new(SeededJitter::from_seed(seed)),
        None => Backoff::default(),
    };
    let executor = RequestExecutor::new(transport.clone())
        .with_breaker(CircuitBreaker::new(breaker_policy))
        .with_backoff(backoff);

    let cancel = cancel_on_ctrl_c();
    let mut exit_code = EXIT_OK;
    for call in 1..=args.calls {
        if call > 1 && args.interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        }

        let spec = RequestSpec::get("scripted://simulation");
        let before = transport.calls();
        let result = executor
            .execute_cancellable(&spec, &policy, &cancel, |status| {
                println!(
                    "  attempt {} failed ({}), waiting {}ms",
                    status.attempt,
                    status.reason,
                    status.sleep.as_millis()
                );
            })
            .await;
        let sent = transport.calls().saturating_sub(before);

        exit_code = match result {
            Ok(response) => {
                println!(
                    "call {call}: ok HTTP {} after {} attempt(s)",
                    response.status, response.attempts
                );
                EXIT_OK
            }
            Err(err) => {
                println!("call {call}: failed ({sent} sent): {err}");
                exit_code_for(&err)
            }
        };
        if cancel.is_cancelled() {
            break;
        }
    }

    let snapshot = executor.breaker().snapshot();
    let state = match snapshot.state {
        CircuitState::Closed => "closed",
        CircuitState::Open => "open (degraded mode)",
    };
    println!(
        "breaker: {state}, consecutive failures {}, transport calls {}",
        snapshot.consecutive_failures,
        transport.calls()
    );
    Ok(exit_code)
}
