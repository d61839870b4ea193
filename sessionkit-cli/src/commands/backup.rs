//! `sessionkit backup-restore`: back up one account and restore it into a
//! fresh SDK, the way a reinstalled app would.

use std::path::PathBuf;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Args;
use eyre::WrapErr;
use sessionkit_core::preferences::MemoryPreferences;
use sessionkit_core::sdk::memory::MemoryIdentitySdk;
use sessionkit_core::{Session, SessionConfig};
use tracing::{info, warn};

use super::{FixedSelfie, LogObserver, SELFIE};
use crate::counterpart;
use crate::Context;

/// Arguments for `sessionkit backup-restore`.
#[derive(Args)]
pub struct BackupRestoreArgs {
    /// Also write the base64 backup to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Restore from this base64 backup file instead of producing one
    #[arg(short, long, conflicts_with = "output")]
    input: Option<PathBuf>,

    /// Restore with someone else's selfie
    #[arg(long)]
    wrong_selfie: bool,
}

/// Runs the backup/restore round trip.
///
/// # Errors
///
/// Returns an error if the backup cannot be produced, encoded or decoded,
/// or if the restore fails.
pub async fn run(context: &Context, args: &BackupRestoreArgs) -> eyre::Result<()> {
    let encoded = match &args.input {
        Some(path) => std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read backup '{}'", path.display()))?,
        None => produce_backup(&context.config).await?,
    };

    if let Some(path) = &args.output {
        std::fs::write(path, &encoded)
            .wrap_err_with(|| format!("failed to write backup '{}'", path.display()))?;
        info!("backup written to {}", path.display());
    }

    let backup = STANDARD
        .decode(encoded.trim())
        .wrap_err("backup is not valid base64")?;

    let session = Session::new(
        context.config.clone(),
        Arc::new(MemoryIdentitySdk::new()),
        Arc::new(MemoryPreferences::new()),
    );
    session.set_observer(Arc::new(LogObserver));
    session.initialize().await?;

    let selfie: &[u8] = if args.wrong_selfie {
        b"someone-else"
    } else {
        SELFIE
    };
    match session
        .restore_with_liveness(backup, FixedSelfie::new(selfie))
        .await
    {
        Ok(credentials) => {
            info!(
                registered = session.identity().registered,
                "restored {} credential(s)",
                credentials.len()
            );
            println!(
                "{}",
                serde_json::json!({
                    "state": session.snapshot().backup_restore.to_string(),
                    "credentials": credentials.iter().map(|c| &c.id).collect::<Vec<_>>(),
                })
            );
            Ok(())
        }
        Err(error) => {
            warn!(state = %session.snapshot().backup_restore, "restore failed");
            Err(error.into())
        }
    }
}

async fn produce_backup(config: &SessionConfig) -> eyre::Result<String> {
    let sdk = Arc::new(
        MemoryIdentitySdk::new().with_credentials(vec![counterpart::email_credential()]),
    );
    let session = Session::new(config.clone(), sdk, Arc::new(MemoryPreferences::new()));
    session.initialize().await?;
    session
        .register(SELFIE.to_vec(), vec![counterpart::liveness_credential()])
        .await?;

    let backup = session.backup().await?;
    info!(bytes = backup.len(), "backup produced");
    Ok(STANDARD.encode(backup))
}
