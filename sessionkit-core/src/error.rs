use thiserror::Error;

use crate::{Action, RequestKind};

/// Error outputs from `SessionKit`.
///
/// Every variant is surfaced to the UI as a user-visible state. None of them
/// is retried internally; each has a user-initiated retry path that re-enters
/// the relevant flow from its start.
#[derive(Debug, Clone, PartialEq, Eq, Error, uniffi::Error)]
pub enum SessionKitError {
    /// The SDK failed to reach ready status.
    #[error("initialization_error: sdk reported status {code}")]
    Initialization {
        /// Status code reported by the SDK (non-zero).
        code: i64,
    },
    /// Registration inputs were empty or the SDK rejected the registration.
    #[error("registration_error: {reason}")]
    Registration {
        /// Why registration failed.
        reason: String,
    },
    /// The connection handshake failed or produced an empty group address.
    #[error("connection_error: {reason}")]
    Connection {
        /// Why the connection failed.
        reason: String,
    },
    /// No counterpart response arrived before the deadline.
    #[error("request_timeout: {kind} request timed out")]
    RequestTimeout {
        /// Kind of the request that timed out.
        kind: RequestKind,
    },
    /// A message acknowledgement carried an error.
    #[error("send_error: {reason}")]
    Send {
        /// Error reported by the acknowledgement.
        reason: String,
    },
    /// Restore failed because the identity could not be verified.
    #[error("restore_verification_error: {reason}")]
    RestoreVerification {
        /// Why verification failed.
        reason: String,
    },
    /// Identity verification succeeded but the account data could not be recovered.
    #[error("restore_data_error: {reason}")]
    RestoreData {
        /// Why data recovery failed.
        reason: String,
    },
    /// The account backup could not be produced.
    #[error("backup_error: {reason}")]
    Backup {
        /// Why the backup failed.
        reason: String,
    },
    /// A request is already in flight; only one may be pending per session.
    #[error("already_pending: a {kind} request is already in flight")]
    AlreadyPending {
        /// Kind of the request currently in flight.
        kind: RequestKind,
    },
    /// The action is not valid in the current session state.
    #[error("invalid_state: cannot {action} while {state}")]
    InvalidState {
        /// The rejected action.
        action: Action,
        /// Human-readable description of the blocking state.
        state: String,
    },
    /// There is no current incoming request of the requested kind.
    #[error("no_incoming_request: no current {kind}")]
    NoIncomingRequest {
        /// Kind of incoming request that was expected.
        kind: String,
    },
    /// The incoming request was superseded or cleared before the response.
    #[error("request_superseded: request {request_id} is no longer current")]
    RequestSuperseded {
        /// Identifier of the stale request.
        request_id: String,
    },
    /// The presented input is not valid for the requested operation.
    #[error("invalid_input: {attribute}: {reason}")]
    InvalidInput {
        /// Name of the offending input.
        attribute: String,
        /// Description of the issue.
        reason: String,
    },
    /// Unclassified failure reported by the identity SDK.
    #[error("sdk_error: {reason}")]
    Sdk {
        /// Error reported by the SDK.
        reason: String,
    },
    /// The preference store failed.
    #[error("preferences_error: {reason}")]
    Preferences {
        /// Error reported by the store.
        reason: String,
    },
}

impl SessionKitError {
    pub(crate) fn invalid_input(attribute: &str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_state(action: Action, state: impl Into<String>) -> Self {
        Self::InvalidState {
            action,
            state: state.into(),
        }
    }
}
