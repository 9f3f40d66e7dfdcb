#![deny(unsafe_code)]

mod exit_code;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use oxsync_core::WalletProvider;
use oxsync_engine::{ShutdownSignal, Supervisor, SupervisorError, SyncConfig, WatchError};

/// How often the main thread checks whether both sessions ended on their own.
const LIVENESS_INTERVAL: Duration = Duration::from_secs(1);

/// Mirror a plaintext directory into an encrypted one and back
#[derive(Parser)]
#[command(name = "oxsync")]
#[command(author, version)]
#[command(after_help = "EXAMPLES:
    # Mirror ~/Documents/plain into ~/Documents/enc until Ctrl-C
    oxsync run Documents/plain Documents/enc

    # More detail on classification decisions
    RUST_LOG=oxsync_engine=debug oxsync run plain enc
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch both directories and keep them in sync until interrupted
    Run {
        /// Plaintext directory, relative to the home directory
        source: PathBuf,

        /// Ciphertext directory, relative to the home directory
        dest: PathBuf,
    },
}

/// How `run` ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Both sessions stopped because their watches became invalid.
    SessionsEnded,
    Interrupted,
}

fn main() -> ExitCode {
    match run() {
        Ok(Outcome::SessionsEnded) => ExitCode::from(exit_code::SUCCESS),
        Ok(Outcome::Interrupted) => ExitCode::from(exit_code::INTERRUPTED),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(categorize_error(&e))
        }
    }
}

fn run() -> Result<Outcome> {
    let cli = Cli::parse();
    setup_tracing();

    match cli.command {
        Commands::Run { source, dest } => run_sync(&source, &dest),
    }
}

fn run_sync(source: &Path, dest: &Path) -> Result<Outcome> {
    let home = home_dir()?;
    let source = home.join(source);
    let dest = home.join(dest);

    let config = SyncConfig::from_env();
    let provider = Arc::new(WalletProvider::new());
    let handle = Supervisor::start(&source, &dest, config, provider).with_context(|| {
        format!(
            "Failed to start sync between {} and {}",
            source.display(),
            dest.display()
        )
    })?;

    let signal = ShutdownSignal::install().context("Failed to install signal handlers")?;
    info!("Syncing {} <-> {} (Ctrl-C to stop)", source.display(), dest.display());

    let mut interrupted = false;
    loop {
        if signal.wait_timeout(LIVENESS_INTERVAL) {
            interrupted = true;
            break;
        }
        if handle.is_finished() {
            warn!("Both sessions stopped; their watched directories are gone");
            break;
        }
    }

    handle.shutdown();
    let report = handle.join().context("Failed to join sync sessions")?;
    info!(
        encrypting = ?report.encrypting,
        decrypting = ?report.decrypting,
        "Sync stopped"
    );

    Ok(if interrupted {
        Outcome::Interrupted
    } else {
        Outcome::SessionsEnded
    })
}

fn home_dir() -> Result<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .context("Could not determine the home directory")
}

fn setup_tracing() {
    // Per-file lines are logged at info
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();
}

/// Categorize an error into an exit code using typed error downcasting.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(sup_err) = cause.downcast_ref::<SupervisorError>() {
            match sup_err {
                SupervisorError::Root { .. }
                | SupervisorError::Watch(WatchError::NotADirectory(_)) => {
                    return exit_code::INVALID_ROOT;
                }
                _ => {}
            }
        }

        if let Some(WatchError::NotADirectory(_)) = cause.downcast_ref::<WatchError>() {
            return exit_code::INVALID_ROOT;
        }
    }

    exit_code::GENERAL
}
