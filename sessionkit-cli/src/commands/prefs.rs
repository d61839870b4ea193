//! `sessionkit prefs`: the server preference a session persists.

use std::sync::Arc;

use clap::Subcommand;
use sessionkit_core::preferences::FilePreferences;
use sessionkit_core::ServerPreferences;
use tracing::info;

use crate::Context;

/// Preference subcommands.
#[derive(Subcommand)]
pub enum PrefsCommand {
    /// Print the stored server preference
    Show,
    /// Forget the stored server
    Clear,
}

/// Runs a preference subcommand.
///
/// # Errors
///
/// Returns an error if the preference file cannot be read or written.
pub fn run(context: &Context, command: &PrefsCommand) -> eyre::Result<()> {
    let store = Arc::new(FilePreferences::new(context.preferences_path())?);
    let path = store.path().display().to_string();
    let preferences = ServerPreferences::new(store);

    match command {
        PrefsCommand::Show => {
            println!(
                "{}",
                serde_json::json!({
                    "path": path,
                    "server_connected": preferences.is_server_connected()?,
                    "server_address": preferences.server_address()?,
                })
            );
        }
        PrefsCommand::Clear => {
            preferences.clear()?;
            info!("cleared server preference in {path}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use sessionkit_core::{Environment, PreferencesStore, SessionConfig};

    use super::*;

    #[test]
    fn test_clear_forgets_server() {
        let dir = tempfile::tempdir().unwrap();
        let context = Context {
            config: SessionConfig::from_environment(&Environment::Sandbox, "/tmp/unused"),
            data_dir: dir.path().to_path_buf(),
        };
        let store: Arc<dyn PreferencesStore> =
            Arc::new(FilePreferences::new(context.preferences_path()).unwrap());
        let preferences = ServerPreferences::new(store);
        preferences.record_connection("server-inbox").unwrap();

        run(&context, &PrefsCommand::Show).unwrap();
        run(&context, &PrefsCommand::Clear).unwrap();

        assert!(!preferences.is_server_connected().unwrap());
        assert_eq!(preferences.server_address().unwrap(), None);
    }
}
