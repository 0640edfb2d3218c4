use clap::Parser;
use shipwright_config::BuilderConfig;
use shipwright_core::install_signal_handler;
use shipwright_executor::{check_prereqs, format_missing, select_executor};
use shipwright_server::{run_server, ApiState, ServerError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(
    name = "shipwright-server",
    version,
    about = "Shipwright build-and-deploy API server"
)]
struct Cli {
    /// Path to the builder configuration (default: shipwright.toml).
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides server.port).
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind (overrides server.bind).
    #[arg(long)]
    bind: Option<String>,

    /// Build executor to use.
    #[arg(long, default_value = "docker", value_parser = ["docker", "mock"])]
    executor: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SHIPWRIGHT_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), ServerError> {
    let mut config = BuilderConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    config.validate()?;

    if cli.executor == "docker" {
        let missing = check_prereqs();
        if !missing.is_empty() {
            warn!("{}", format_missing(&missing));
        }
    }
    let executor = select_executor(&cli.executor, &config)?;

    install_signal_handler();

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    info!(
        "starting shipwright-server {} on {addr} (executor: {}, {} components)",
        env!("CARGO_PKG_VERSION"),
        executor.name(),
        config.components.len()
    );

    let state = Arc::new(ApiState::from_config(&config, executor));
    run_server(&state, &addr)?;
    info!("shutdown complete");
    Ok(())
}
