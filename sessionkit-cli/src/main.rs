//! `sessionkit` developer CLI.
//!
//! Drives a [`sessionkit_core::Session`] against the in-memory identity SDK,
//! with a simulated server answering every request, and inspects the
//! preference file a session leaves behind.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use eyre::WrapErr;
use sessionkit_core::logger::{set_logger, LogLevel, Logger};
use sessionkit_core::{Environment, SessionConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

mod commands;
mod counterpart;

/// Top-level CLI.
#[derive(Parser)]
#[command(name = "sessionkit")]
#[command(about = "SessionKit - identity session orchestration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Environment whose discovery payloads are accepted
    #[arg(long, global = true, env = "SESSIONKIT_ENVIRONMENT", default_value = "sandbox")]
    environment: Environment,

    /// Directory holding account storage and preferences
    #[arg(long, global = true, env = "SESSIONKIT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// JSON session config; overrides --environment
    #[arg(long, global = true, env = "SESSIONKIT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run server flows end to end against a simulated server
    Demo(commands::demo::DemoArgs),

    /// Back up an account and restore it into a fresh one
    BackupRestore(commands::backup::BackupRestoreArgs),

    /// Inspect or clear the persisted server preference
    Prefs {
        #[command(subcommand)]
        command: commands::prefs::PrefsCommand,
    },
}

/// Shared context resolved from the global flags.
pub struct Context {
    /// Session configuration.
    pub config: SessionConfig,
    /// Data directory.
    pub data_dir: PathBuf,
}

impl Context {
    /// Path of the preference file.
    #[must_use]
    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join("preferences.json")
    }
}

/// Routes core log records into `tracing`.
struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: String) {
        match level {
            LogLevel::Trace => tracing::trace!(target: "sessionkit", "{message}"),
            LogLevel::Debug => tracing::debug!(target: "sessionkit", "{message}"),
            LogLevel::Info => tracing::info!(target: "sessionkit", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "sessionkit", "{message}"),
            LogLevel::Error => tracing::error!(target: "sessionkit", "{message}"),
        }
    }
}

fn init_tracing(verbose: bool) -> eyre::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    tracing::subscriber::set_global_default(subscriber)
        .wrap_err("failed to install tracing subscriber")?;
    set_logger(Arc::new(TracingLogger));
    Ok(())
}

fn resolve_context(cli: &Cli) -> eyre::Result<Context> {
    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => dirs::data_dir()
            .ok_or_else(|| eyre::eyre!("no data directory on this platform; pass --data-dir"))?
            .join("sessionkit"),
    };

    let config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("failed to read config '{}'", path.display()))?;
            SessionConfig::from_json(&json)?
        }
        None => SessionConfig::from_environment(
            &cli.environment,
            data_dir.join("account").display().to_string(),
        ),
    };

    Ok(Context { config, data_dir })
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    let context = resolve_context(&cli)?;

    match cli.command {
        Commands::Demo(args) => commands::demo::run(&context, &args).await,
        Commands::BackupRestore(args) => commands::backup::run(&context, &args).await,
        Commands::Prefs { command } => commands::prefs::run(&context, &command),
    }
}
