mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CONFIG_ERROR, EXIT_EXECUTOR_ERROR, EXIT_FAILURE};
use shipwright_config::BuilderConfig;
use shipwright_core::install_signal_handler;
use shipwright_executor::{check_prereqs, format_missing, select_executor};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "shipwright",
    version,
    about = "Build container images, push them and deploy to Kubernetes"
)]
struct Cli {
    /// Path to the builder configuration (default: shipwright.toml).
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Build executor to use.
    #[arg(long, default_value = "docker", value_parser = ["docker", "mock"], global = true)]
    executor: String,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build and push component images.
    Build {
        /// Components to build, in order. Defaults to every non-external component.
        components: Vec<String>,
    },
    /// Apply the cluster configuration for a cloud provider.
    Deploy {
        /// Cloud provider (defaults to kubernetes.default_provider).
        #[arg(long)]
        provider: Option<String>,
    },
    /// Show component image status and cluster status.
    Status {
        /// Kubernetes namespace (defaults to kubernetes.namespace).
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Run diagnostic checks on tools and configuration.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SHIPWRIGHT_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Completions { shell } => return finish(commands::completions::run::<Cli>(shell)),
        Commands::ManPages { ref dir } => return finish(commands::man_pages::run::<Cli>(dir)),
        _ => {}
    }

    let config = match BuilderConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: configuration: {e}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    if matches!(cli.command, Commands::Doctor) {
        return finish(commands::doctor::run(&config, &cli.executor, cli.json));
    }

    if cli.executor == "docker" && std::env::var("SHIPWRIGHT_SKIP_PREREQS").as_deref() != Ok("1")
    {
        let missing = check_prereqs();
        if !missing.is_empty() {
            eprintln!("error: {}", format_missing(&missing));
            return ExitCode::from(EXIT_FAILURE);
        }
    }

    let executor = match select_executor(&cli.executor, &config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_EXECUTOR_ERROR);
        }
    };

    install_signal_handler();

    let json_output = cli.json;
    let result = match cli.command {
        Commands::Build { components } => {
            commands::build::run(executor.as_ref(), &config, &components, json_output)
        }
        Commands::Deploy { provider } => commands::deploy::run(
            executor.as_ref(),
            provider
                .as_deref()
                .unwrap_or(&config.kubernetes.default_provider),
            json_output,
        ),
        Commands::Status { namespace } => {
            commands::status::run(executor.as_ref(), namespace.as_deref(), json_output)
        }
        Commands::Doctor | Commands::Completions { .. } | Commands::ManPages { .. } => {
            unreachable!("handled before executor selection")
        }
    };

    finish(result)
}

fn finish(result: Result<u8, String>) -> ExitCode {
    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("configuration") {
                EXIT_CONFIG_ERROR
            } else if msg.starts_with("executor") {
                EXIT_EXECUTOR_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
