//! Key-value app preferences.
//!
//! The session persists only two values: whether a server connection was
//! established and the last connected server address. Platforms back
//! [`PreferencesStore`] with `SharedPreferences` / `UserDefaults`; the CLI
//! uses [`FilePreferences`].

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::error::SessionKitError;

/// Result type for preference operations.
pub type PreferencesResult<T> = Result<T, PreferencesError>;

/// Errors raised by preference stores.
#[derive(Debug, Error, uniffi::Error)]
pub enum PreferencesError {
    /// Reading or writing the backing file failed.
    #[error("io error: {0}")]
    Io(String),

    /// The stored data could not be parsed or encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored value has an unexpected shape.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Preference key.
        key: String,
        /// Stored value.
        value: String,
    },

    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for PreferencesError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

impl From<PreferencesError> for SessionKitError {
    fn from(error: PreferencesError) -> Self {
        Self::Preferences {
            reason: error.to_string(),
        }
    }
}

/// Simple string key-value store.
#[uniffi::export(with_foreign)]
pub trait PreferencesStore: Send + Sync {
    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, key: String) -> PreferencesResult<Option<String>>;

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn set(&self, key: String, value: String) -> PreferencesResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn remove(&self, key: String) -> PreferencesResult<()>;
}

const SERVER_CONNECTED_KEY: &str = "server_connected";
const SERVER_ADDRESS_KEY: &str = "server_address";

/// Typed access to the session's persisted server preference.
#[derive(Clone)]
pub struct ServerPreferences {
    store: Arc<dyn PreferencesStore>,
}

impl ServerPreferences {
    /// Wraps a store.
    #[must_use]
    pub fn new(store: Arc<dyn PreferencesStore>) -> Self {
        Self { store }
    }

    /// Whether a server connection was established and not since cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or holds a non-boolean flag.
    pub fn is_server_connected(&self) -> PreferencesResult<bool> {
        match self.store.get(SERVER_CONNECTED_KEY.to_string())? {
            None => Ok(false),
            Some(value) => value.parse().map_err(|_| PreferencesError::InvalidValue {
                key: SERVER_CONNECTED_KEY.to_string(),
                value,
            }),
        }
    }

    /// The last connected server address.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn server_address(&self) -> PreferencesResult<Option<String>> {
        self.store.get(SERVER_ADDRESS_KEY.to_string())
    }

    /// The server a previous run was connected to and never disconnected
    /// from.
    ///
    /// A set flag without an address is inconsistent; the pair is cleared
    /// and `None` returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or holds a non-boolean flag.
    pub fn resumable_server(&self) -> PreferencesResult<Option<String>> {
        if !self.is_server_connected()? {
            return Ok(None);
        }
        match self.server_address()? {
            Some(address) if !address.is_empty() => Ok(Some(address)),
            _ => {
                log::warn!("server flag set without an address, clearing it");
                self.clear()?;
                Ok(None)
            }
        }
    }

    /// Records a successful connection to `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn record_connection(&self, address: &str) -> PreferencesResult<()> {
        self.store
            .set(SERVER_ADDRESS_KEY.to_string(), address.to_string())?;
        self.store
            .set(SERVER_CONNECTED_KEY.to_string(), true.to_string())
    }

    /// Forgets the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn clear(&self) -> PreferencesResult<()> {
        self.store.remove(SERVER_CONNECTED_KEY.to_string())?;
        self.store.remove(SERVER_ADDRESS_KEY.to_string())
    }
}

/// In-memory preferences, for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryPreferences {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryPreferences {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferencesStore for MemoryPreferences {
    fn get(&self, key: String) -> PreferencesResult<Option<String>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(&key).cloned())
    }

    fn set(&self, key: String, value: String) -> PreferencesResult<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key, value);
        drop(values);
        Ok(())
    }

    fn remove(&self, key: String) -> PreferencesResult<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(&key);
        drop(values);
        Ok(())
    }
}

/// Preferences kept in a JSON object file.
///
/// Every write replaces the file atomically: the new content goes to a
/// temporary sibling, is synced, and is renamed over the target.
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FilePreferences {
    /// Opens (or prepares to create) the preference file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub fn new<P: AsRef<Path>>(path: P) -> PreferencesResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                PreferencesError::Io(format!(
                    "failed to create preferences directory '{}': {e}",
                    parent.display()
                ))
            })?;
        }
        Ok(Self {
            path,
            guard: Mutex::new(()),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> PreferencesResult<BTreeMap<String, String>> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| PreferencesError::Serialization(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(PreferencesError::Io(format!(
                "failed to read '{}': {e}",
                self.path.display()
            ))),
        }
    }

    fn store(&self, values: &BTreeMap<String, String>) -> PreferencesResult<()> {
        let bytes = serde_json::to_vec_pretty(values)
            .map_err(|e| PreferencesError::Serialization(e.to_string()))?;
        let temp_path = self.path.with_extension("json.tmp");
        let io = |context: &str, e: std::io::Error| {
            PreferencesError::Io(format!("{context} '{}': {e}", temp_path.display()))
        };

        let mut file = fs::File::create(&temp_path).map_err(|e| io("failed to create", e))?;
        file.write_all(&bytes).map_err(|e| io("failed to write", e))?;
        file.sync_all().map_err(|e| io("failed to sync", e))?;
        drop(file);

        fs::rename(&temp_path, &self.path).map_err(|e| io("failed to rename", e))
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> PreferencesResult<()> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.load()?;
        apply(&mut values);
        self.store(&values)
    }
}

impl PreferencesStore for FilePreferences {
    fn get(&self, key: String) -> PreferencesResult<Option<String>> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.remove(&key))
    }

    fn set(&self, key: String, value: String) -> PreferencesResult<()> {
        self.update(|values| {
            values.insert(key, value);
        })
    }

    fn remove(&self, key: String) -> PreferencesResult<()> {
        self.update(|values| {
            values.remove(&key);
        })
    }
}
