//! Spectre server binary.
//!
//! One process, one long-running command:
//!
//! ```bash
//! # Start capturing the kinds named in watch.yaml
//! spectre server --data-dir ./data --config watch.yaml
//!
//! # Bulk-import previously exported events at startup
//! spectre server --data-dir ./data --config watch.yaml --import backup.bin
//! ```
//!
//! Exit codes: 0 clean shutdown, 1 unrecoverable startup failure, 2 the
//! data directory is locked by another instance.

mod import;
mod lock;
mod logging;
mod server;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

/// Spectre — event-sourced causal graphs for Kubernetes incidents.
#[derive(Parser)]
#[command(name = "spectre")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Run the capture and analysis server.
    Server(ServerArgs),
}

#[derive(Debug, clap::Args)]
pub struct ServerArgs {
    /// Data directory (segments, graph snapshot, lock file).
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Watched-kinds document. Without it no watches run (import-only).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// File or directory to bulk-import at startup.
    #[arg(long)]
    pub import: Option<PathBuf>,

    /// Base log level.
    #[arg(long, default_value = "info", value_parser = ["debug", "info", "warn", "error", "fatal"])]
    pub log_level: String,

    /// Per-package log levels, comma separated (`spectre_log=debug,kube=warn`).
    #[arg(long)]
    pub package_log_levels: Option<String>,

    /// Seconds between watch-config polls.
    #[arg(long, default_value_t = 15)]
    pub poll_interval: u64,

    /// Watcher event buffer size (mutations).
    #[arg(long, default_value_t = 1024)]
    pub buffer: usize,

    /// Retention horizon in hours; 0 disables the sweep.
    #[arg(long, default_value_t = 0)]
    pub retention_hours: u64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Commands::Version => {
            println!("spectre {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Commands::Server(args) => run_server(args),
    }
}

fn run_server(args: ServerArgs) -> ExitCode {
    if let Err(e) = logging::init(&args.log_level, args.package_log_levels.as_deref()) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::from(1);
    }

    // The exclusive lock outlives the whole run; refusing to start while
    // another instance holds it is what keeps the segment files single-owner.
    let _lock = match lock::acquire(&args.data_dir) {
        Ok(lock) => lock,
        Err(lock::LockError::Held { path }) => {
            tracing::error!(path = %path.display(), "data directory is locked by another instance");
            return ExitCode::from(2);
        }
        Err(e) => {
            tracing::error!(error = %e, "cannot acquire data directory lock");
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to start async runtime");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(server::run(args)) {
        Ok(()) => {
            tracing::info!("clean shutdown");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "server failed");
            ExitCode::from(1)
        }
    }
}
