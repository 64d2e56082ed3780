//! `backstop fetch` and `backstop health`

use std::time::Duration;

use anyhow::{Context, bail};
use backstop_engine::{EngineConfig, RequestExecutor, RequestSpec, RetryPolicy, RetryStatus};
use clap::Args;
use reqwest::Method;
use reqwest::header::{HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;

use crate::{EXIT_OK, RetryOverrides, exit_code_for};

/// Arguments for `backstop fetch`
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Target URL
    pub url: String,

    /// HTTP method
    #[arg(long = "method", short = 'X', default_value = "GET")]
    pub method: String,

    /// Request body
    #[arg(long = "data", short = 'd', value_name = "BODY")]
    pub data: Option<String>,

    /// Extra header as `Name: value` (repeatable)
    #[arg(long = "header", short = 'H', value_name = "NAME:VALUE")]
    pub headers: Vec<String>,

    #[command(flatten)]
    pub retry: RetryOverrides,
}

/// Arguments for `backstop health`
#[derive(Debug, Args)]
pub struct HealthArgs {
    /// Health endpoint URL
    pub url: String,

    /// Probe deadline in milliseconds (defaults to the configured timeout)
    #[arg(long = "timeout-ms", value_name = "MS")]
    pub timeout_ms: Option<u64>,
}

pub async fn run_fetch(config: &EngineConfig, args: FetchArgs) -> anyhow::Result<i32> {
    let policy = args.retry.apply(&config.retry)?;
    let spec = build_spec(&args)?;
    let executor = RequestExecutor::from_config(config).context("failed to build HTTP client")?;

    let cancel = cancel_on_ctrl_c();
    let result = executor
        .execute_cancellable(&spec, &policy, &cancel, report_retry)
        .await;

    match result {
        Ok(response) => {
            eprintln!(
                "HTTP {} after {} attempt(s) [request id {}]",
                response.status, response.attempts, response.request_id
            );
            println!("{}", response.text());
            Ok(EXIT_OK)
        }
        Err(err) => {
            eprintln!("Error: {err}");
            Ok(exit_code_for(&err))
        }
    }
}

pub async fn run_health(config: &EngineConfig, args: HealthArgs) -> anyhow::Result<i32> {
    let timeout = Duration::from_millis(args.timeout_ms.unwrap_or(config.retry.timeout_ms));
    if timeout.is_zero() {
        bail!("--timeout-ms must be non-zero");
    }
    let executor = RequestExecutor::from_config(config).context("failed to build HTTP client")?;
    let spec = RequestSpec::health_probe(args.url);

    match executor.execute(&spec, &RetryPolicy::no_retry(timeout)).await {
        Ok(response) => {
            println!("healthy (HTTP {})", response.status);
            Ok(EXIT_OK)
        }
        Err(err) => {
            println!("unhealthy: {err}");
            Ok(exit_code_for(&err))
        }
    }
}

fn build_spec(args: &FetchArgs) -> anyhow::Result<RequestSpec> {
    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method `{}`", args.method))?;
    let mut spec = RequestSpec::new(method, args.url.clone());

    for raw in &args.headers {
        let (name, value) = parse_header(raw)?;
        spec = spec.header(name, value);
    }
    if let Some(data) = &args.data {
        spec = spec.body(data.clone());
    }
    Ok(spec)
}

fn parse_header(raw: &str) -> anyhow::Result<(HeaderName, HeaderValue)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("invalid header `{raw}`, expected `Name: value`");
    };
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .with_context(|| format!("invalid header name in `{raw}`"))?;
    let value = HeaderValue::from_str(value.trim())
        .with_context(|| format!("invalid header value in `{raw}`"))?;
    Ok((name, value))
}

fn report_retry(status: RetryStatus) {
    eprintln!(
        "attempt {}/{} failed ({}), retrying in {}ms",
        status.attempt,
        status.max_attempts,
        status.reason,
        status.sleep.as_millis()
    );
}

/// Token cancelled on the first Ctrl+C.
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling request");
            trigger.cancel();
        }
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fetch_args(method: &str, headers: &[&str]) -> FetchArgs {
        FetchArgs {
            url: "http://localhost:8000/items/create/".to_string(),
            method: method.to_string(),
            data: Some(r#"{"name":"lamp"}"#.to_string()),
            headers: headers.iter().map(|h| (*h).to_string()).collect(),
            retry: RetryOverrides::default(),
        }
    }

    #[test]
    fn builds_spec_from_arguments() {
        let spec = build_spec(&fetch_args("post", &["Authorization: Bearer t0ken"]))
            .expect("valid arguments");
        assert_eq!(spec.method, Method::POST);
        assert_eq!(
            spec.headers.get("authorization"),
            Some(&HeaderValue::from_static("Bearer t0ken"))
        );
        assert_eq!(spec.body.as_deref(), Some(&br#"{"name":"lamp"}"#[..]));
        assert!(!spec.bypass_breaker);
    }

    #[test]
    fn rejects_malformed_header() {
        assert!(build_spec(&fetch_args("GET", &["no-colon-here"])).is_err());
        assert!(build_spec(&fetch_args("GET", &["bad name: x"])).is_err());
    }

    #[test]
    fn rejects_malformed_method() {
        assert!(build_spec(&fetch_args("GE T", &[])).is_err());
    }
}
