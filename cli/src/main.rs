use backstop_cli::{BackstopCli, EXIT_INFRA};
use clap::Parser;

fn main() {
    let cli = BackstopCli::parse();

    // Logs go to stderr so stdout carries only command output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to start runtime: {err}");
            std::process::exit(EXIT_INFRA);
        }
    };

    let code = match runtime.block_on(cli.run()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            EXIT_INFRA
        }
    };
    std::process::exit(code);
}
