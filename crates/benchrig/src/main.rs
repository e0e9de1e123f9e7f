//! benchrig - containerized benchmark runner
//!
//! Expands a benchmark configuration into test runs (one per test and tool)
//! and executes them one after another against the docker engine.

mod summary;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use libbenchrig_core::{build_test_runs, BuildOptions, Config};
use libbenchrig_docker::DockerCli;
use libbenchrig_metrics::CollectorRegistry;
use libbenchrig_runner::{run_all, RunEngine};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Exit code for unreadable or invalid configuration
const EXIT_CONFIG: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "benchrig")]
#[command(about = "Run containerized benchmarks and collect their metrics", version)]
struct Cli {
    /// Benchmark configuration file (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Directory under which run directories are created
    #[arg(short, long, default_value = "./results")]
    out: PathBuf,

    /// Only run this test (repeatable)
    #[arg(long = "test", value_name = "NAME")]
    tests: Vec<String>,

    /// Only run this tool (repeatable)
    #[arg(long = "tool", value_name = "NAME")]
    tools: Vec<String>,

    /// Print the planned runs and exit without starting anything
    #[arg(long)]
    list: bool,

    /// Docker client binary
    #[arg(long, default_value = "docker")]
    docker: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let options = BuildOptions::new(&cli.out)
        .with_tests(cli.tests)
        .with_tools(cli.tools);

    let runs = build_test_runs(&config, &options);
    if runs.is_empty() {
        eprintln!("error: no runs match the selected tests and tools");
        return ExitCode::from(EXIT_CONFIG);
    }

    if cli.list {
        println!("{}", summary::plan_table(&runs));
        return ExitCode::SUCCESS;
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let engine = RunEngine::new(
        Arc::new(DockerCli::new(cli.docker)),
        Arc::new(CollectorRegistry::with_builtin()),
    );
    let report = run_all(&engine, &config, &options, &cancel).await;

    if !report.runs.is_empty() {
        println!("{}", summary::report_table(&report));
    }
    println!("{} of {} runs executed", report.runs.len(), report.planned);

    match report.error {
        None => {
            info!(runs = report.runs.len(), "All runs passed");
            ExitCode::SUCCESS
        }
        Some(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

/// Install the fmt subscriber; `RUST_LOG` wins over `--log-level`
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Cancel the batch on Ctrl+C or SIGTERM
///
/// The running stage unwinds and every acquired resource is released before
/// the process exits.
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, cancelling"),
        _ = terminate => info!("Received SIGTERM, cancelling"),
    }
    cancel.cancel();
}
