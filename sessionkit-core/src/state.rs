//! Session state axes and the action gate.
//!
//! Three independent axes (initialization, registration, connection) compose
//! to decide which actions are valid. Within a connection a nested flow
//! sub-machine tracks the current exchange:
//!
//! ```text
//! None ─notify─► RequestSent ─inbound─► RequestReceived ─respond─► ResponseSent
//!                     │                                                 │
//!                     └─timeout / send error─► RequestError             │
//!  ▲                                               │                    │
//!  └────────────────────── reset_flow ◄────────────┴────────────────────┘
//! ```

use strum::{Display, EnumString};

use crate::{
    error::SessionKitError, CredentialRequest, PendingRequest, RequestKind, ResponseStatus,
    SigningRequest, VerificationRequest,
};

/// Initialization axis.
#[derive(Debug, Clone, PartialEq, Eq, Default, Display, uniffi::Enum)]
#[strum(serialize_all = "snake_case")]
pub enum InitState {
    /// `initialize` has not been called.
    #[default]
    Uninitialized,
    /// Waiting for the SDK status event.
    Initializing,
    /// The SDK reported status `0`.
    Ready,
    /// The SDK reported a non-zero status.
    InitError {
        /// Reported status code.
        code: i64,
    },
}

/// Registration axis. Registration is never revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, uniffi::Enum)]
#[strum(serialize_all = "snake_case")]
pub enum RegistrationState {
    /// No registered account; the user may register or restore.
    #[default]
    Unregistered,
    /// A registration or restore is in progress.
    Registering,
    /// The account is registered.
    Registered,
}

/// Connection axis.
#[derive(Debug, Clone, PartialEq, Eq, Default, Display, uniffi::Enum)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    /// No connection.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Connected to a counterpart.
    Connected {
        /// Counterpart inbox address.
        peer_address: String,
        /// Group address returned by the handshake.
        group_address: String,
    },
}

/// The exchange currently driven within a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, uniffi::Enum)]
#[strum(serialize_all = "snake_case")]
pub enum Flow {
    /// Liveness authentication requested by the server.
    Authentication,
    /// Document signing.
    DocumentSigning,
    /// Sharing stored credentials.
    CredentialSharing,
    /// Receiving server-issued custom credentials.
    CustomCredential,
    /// Account backup.
    Backup,
    /// Account restore.
    Restore,
}

impl Flow {
    /// The flow a request of `kind` belongs to.
    #[must_use]
    pub const fn for_request(kind: RequestKind) -> Self {
        match kind {
            RequestKind::Auth => Self::Authentication,
            RequestKind::CredentialShare => Self::CredentialSharing,
            RequestKind::DocumentSign | RequestKind::Verification => Self::DocumentSigning,
            RequestKind::CustomCredential => Self::CustomCredential,
        }
    }
}

/// Progress of the current flow.
#[derive(Debug, Clone, PartialEq, Eq, Default, Display, uniffi::Enum)]
#[strum(serialize_all = "snake_case")]
pub enum FlowState {
    /// Back at action selection.
    #[default]
    None,
    /// The counterpart was notified; its answer is pending.
    RequestSent {
        /// Kind of the pending request.
        kind: RequestKind,
    },
    /// The counterpart's request (or credentials) arrived.
    RequestReceived {
        /// Identifier of the received request or message.
        request_id: String,
    },
    /// This account answered.
    ResponseSent {
        /// Status of the answer.
        status: ResponseStatus,
    },
    /// The flow failed; the user must restart it.
    RequestError {
        /// Error shown to the user.
        message: String,
    },
}

/// Backup/restore progress.
#[derive(Debug, Clone, PartialEq, Eq, Default, Display, uniffi::Enum)]
#[strum(serialize_all = "snake_case")]
pub enum BackupRestoreState {
    /// Nothing started.
    #[default]
    None,
    /// Backup or restore in progress.
    Processing,
    /// Backup or restore finished.
    Success,
    /// Backup or restore failed for another reason.
    Error {
        /// Error shown to the user.
        message: String,
    },
    /// Restore could not verify the identity.
    VerificationFailed,
    /// Restore verified the identity but could not recover the data.
    DataRecoveryFailed,
}

/// User actions gated by the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, uniffi::Enum)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    /// Start the account.
    Initialize,
    /// Register the account.
    Register,
    /// Connect to a server.
    Connect,
    /// Drop the connection.
    Disconnect,
    /// Ask the server to start a flow.
    NotifyServer,
    /// Answer an incoming request.
    Respond,
    /// Store received credentials.
    StoreCredentials,
    /// Back up the account.
    Backup,
    /// Restore the account.
    Restore,
}

/// Point-in-time view of the whole session.
#[derive(Debug, Clone, PartialEq, Eq, Default, uniffi::Record)]
pub struct SessionSnapshot {
    /// Initialization axis.
    pub init: InitState,
    /// Registration axis.
    pub registration: RegistrationState,
    /// Connection axis.
    pub connection: ConnectionState,
    /// Current flow, if any.
    pub flow: Option<Flow>,
    /// Progress of the current flow.
    pub flow_state: FlowState,
    /// Backup/restore progress.
    pub backup_restore: BackupRestoreState,
    /// Request in flight.
    pub pending: Option<PendingRequest>,
    /// Last received credential request.
    pub credential_request: Option<CredentialRequest>,
    /// Last received verification request.
    pub verification_request: Option<VerificationRequest>,
    /// Last received signing request.
    pub signing_request: Option<SigningRequest>,
    /// Number of credentials received in the current custom-credential flow.
    pub received_credentials: u32,
    /// Message of the most recent error.
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    /// Whether the connection axis is `Connected`.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self.connection, ConnectionState::Connected { .. })
    }

    /// Checks that `action` is valid in this state.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::InvalidState`] naming the blocking state.
    pub fn check(&self, action: Action) -> Result<(), SessionKitError> {
        let blocked_by = match action {
            Action::Initialize => match self.init {
                InitState::Uninitialized | InitState::InitError { .. } => None,
                ref init => Some(init.to_string()),
            },
            Action::Register | Action::Restore => self
                .require_ready()
                .or_else(|| {
                    (self.registration != RegistrationState::Unregistered)
                        .then(|| self.registration.to_string())
                })
                .or_else(|| self.require_idle_backup_restore()),
            Action::Connect => self
                .require_ready()
                .or_else(|| self.require_registered())
                .or_else(|| {
                    (self.connection != ConnectionState::Disconnected)
                        .then(|| self.connection.to_string())
                }),
            Action::Disconnect | Action::NotifyServer => {
                (!self.is_connected()).then(|| self.connection.to_string())
            }
            // A failed flow stays failed until it is reset.
            Action::Respond => (!self.is_connected())
                .then(|| self.connection.to_string())
                .or_else(|| {
                    matches!(self.flow_state, FlowState::RequestError { .. })
                        .then(|| self.flow_state.to_string())
                }),
            Action::StoreCredentials => self.require_registered(),
            Action::Backup => self
                .require_registered()
                .or_else(|| self.require_idle_backup_restore()),
        };
        blocked_by.map_or(Ok(()), |state| {
            Err(SessionKitError::invalid_state(action, state))
        })
    }

    fn require_ready(&self) -> Option<String> {
        (self.init != InitState::Ready).then(|| self.init.to_string())
    }

    fn require_registered(&self) -> Option<String> {
        (self.registration != RegistrationState::Registered)
            .then(|| self.registration.to_string())
    }

    fn require_idle_backup_restore(&self) -> Option<String> {
        (self.backup_restore == BackupRestoreState::Processing)
            .then(|| self.backup_restore.to_string())
    }
}
