//! ordergate operator CLI - Entry Point
//!
//! `preview` runs the safety and risk stages against a batch of orders with
//! the simulated executor forced, and prints the result as JSON.
//! Exit codes: 0 no denial, 1 at least one denial, 2 input or config error.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ordergate_cli::{load_orders, load_portfolio_or_default, AppConfig, Application};
use ordergate_telemetry::Metrics;
use tracing::info;

/// Order admission-control and execution-safety pipeline
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a batch through the pipeline with the simulated executor
    Preview {
        /// JSON array of orders
        #[arg(short, long)]
        orders: PathBuf,

        /// JSON portfolio snapshot (empty portfolio when omitted)
        #[arg(short, long)]
        portfolio: Option<PathBuf>,

        /// Configuration file path (can also be set via ORDERGATE_CONFIG env var)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print Prometheus metrics to stderr after the run
        #[arg(long)]
        metrics: bool,
    },
    /// Validate a configuration file
    CheckConfig {
        /// Configuration file path (can also be set via ORDERGATE_CONFIG env var)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

const EXIT_DENIED: u8 = 1;
const EXIT_INPUT_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_INPUT_ERROR)
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    match args.command {
        Command::Preview {
            orders,
            portfolio,
            config,
            metrics,
        } => {
            let config = load_config(config)?;
            let app = Application::new(config)?;

            let orders = load_orders(&orders)?;
            let portfolio = load_portfolio_or_default(portfolio.as_deref())?;
            info!(orders = orders.len(), "Running preview");

            let result = app.preview(&orders, portfolio).await?;
            let json = serde_json::to_string_pretty(&result)
                .context("failed to serialize execution result")?;
            println!("{json}");

            if metrics {
                eprintln!("{}", Metrics::gather_text()?);
            }

            Ok(if result.has_denials() {
                ExitCode::from(EXIT_DENIED)
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::CheckConfig { config } => {
            let config = load_config(config)?;
            config.validate()?;
            println!(
                "ok: mode={} route={}",
                config.environment.mode_label(),
                config.executor.route
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Resolve, load and start logging with the configured filter.
fn load_config(flag: Option<PathBuf>) -> Result<AppConfig> {
    let path = AppConfig::resolve_path(flag);
    let config = AppConfig::from_file(&path)
        .with_context(|| format!("loading {}", path.display()))?;

    ordergate_telemetry::init_logging(&config.telemetry.log_filter)?;
    info!(
        "Starting ordergate v{} (config {})",
        env!("CARGO_PKG_VERSION"),
        path.display()
    );
    info!(
        mode = config.environment.mode_label(),
        route = %config.executor.route,
        "Configuration loaded"
    );
    Ok(config)
}
