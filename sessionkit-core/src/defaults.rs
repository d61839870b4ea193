use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{error::SessionKitError, Environment, RequestKind};

/// Deadline for a counterpart to answer a server-notification flow.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

/// Deadline for the initial server connection handshake.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Message the flow moves to when a pending request expires.
pub const REQUEST_TIMED_OUT_MESSAGE: &str = "request timed out";

/// Session configuration.
///
/// Build it with [`SessionConfig::from_environment`] for SDK defaults or
/// [`SessionConfig::from_json`] for an override file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct SessionConfig {
    /// Environment whose discovery payloads are accepted.
    pub environment: Environment,
    /// Directory handed to the identity SDK for its account storage.
    pub storage_path: String,
    /// Seconds to wait for the counterpart to answer a request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Seconds to wait for the connection handshake.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl SessionConfig {
    /// Returns the default configuration for `environment`.
    #[must_use]
    pub fn from_environment(environment: &Environment, storage_path: impl Into<String>) -> Self {
        Self {
            environment: *environment,
            storage_path: storage_path.into(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }

    /// Parses a configuration from JSON. Missing timeouts take the defaults.
    ///
    /// # Errors
    /// Returns [`SessionKitError::InvalidInput`] if the JSON is malformed or a
    /// timeout is zero.
    pub fn from_json(json: &str) -> Result<Self, SessionKitError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SessionKitError::invalid_input("config", e.to_string()))?;
        if config.request_timeout_secs == 0 || config.connect_timeout_secs == 0 {
            return Err(SessionKitError::invalid_input(
                "config",
                "timeouts must be greater than zero",
            ));
        }
        Ok(config)
    }

    /// Deadline for server-notification flows.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Deadline for the connection handshake.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Chat commands a client sends to the demo server to ask it to start a flow.
///
/// The server answers each command with a request (or, for
/// `GetCustomCredential`, a credential message) which resolves the pending
/// request parked by the client.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, uniffi::Enum,
)]
pub enum ServerRequest {
    /// Ask the server for a liveness authentication request.
    #[strum(serialize = "REQUEST_CREDENTIAL_AUTH")]
    Auth,
    /// Ask the server to request the stored email credential.
    #[strum(serialize = "PROVIDE_CREDENTIAL_EMAIL")]
    ShareEmail,
    /// Ask the server to request the stored document credential.
    #[strum(serialize = "PROVIDE_CREDENTIAL_DOCUMENT")]
    ShareDocument,
    /// Ask the server to request a stored custom credential.
    #[strum(serialize = "PROVIDE_CREDENTIAL_CUSTOM")]
    ShareCustom,
    /// Ask the server for an agreement to sign.
    #[strum(serialize = "REQUEST_DOCUMENT_SIGNING")]
    DocumentSigning,
    /// Ask the server to issue custom credentials to this account.
    #[strum(serialize = "REQUEST_GET_CUSTOM_CREDENTIAL")]
    GetCustomCredential,
}

impl ServerRequest {
    /// The chat body understood by the server.
    #[must_use]
    pub fn as_message(self) -> String {
        self.to_string()
    }

    /// The pending request kind parked while waiting for the server's answer.
    #[must_use]
    pub const fn kind(self) -> RequestKind {
        match self {
            Self::Auth => RequestKind::Auth,
            Self::ShareEmail | Self::ShareDocument | Self::ShareCustom => {
                RequestKind::CredentialShare
            }
            Self::DocumentSigning => RequestKind::DocumentSign,
            Self::GetCustomCredential => RequestKind::CustomCredential,
        }
    }
}
