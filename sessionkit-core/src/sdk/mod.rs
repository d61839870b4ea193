//! Interfaces to the external identity SDK.
//!
//! The SDK owns key management, encrypted group messaging and the credential
//! protocol. This crate only drives it through [`IdentitySdk`]; platform code
//! implements the trait over the vendor SDK, tests use [`memory`].

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::{
    ClaimConstraint, Credential, DiscoveryData, EventClass, ListenerDispatcher,
    LivenessResult, OutboundMessage, SendAck,
};

pub mod memory;

/// Errors reported by SDK adapters.
#[derive(Debug, Error, uniffi::Error)]
pub enum SdkError {
    /// The SDK call failed.
    #[error("sdk call failed: {reason}")]
    Failed {
        /// Error reported by the SDK.
        reason: String,
    },
    /// Restore could not verify the identity behind the backup.
    #[error("verification failed: {reason}")]
    VerificationFailed {
        /// Error reported by the SDK.
        reason: String,
    },
    /// Restore verified the identity but could not recover the account data.
    #[error("data recovery failed: {reason}")]
    DataRecoveryFailed {
        /// Error reported by the SDK.
        reason: String,
    },
    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for SdkError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

/// The identity SDK, as seen by the session layer.
///
/// Every network-facing call completes exactly once, with either a value or
/// an error.
#[uniffi::export(with_foreign)]
#[async_trait::async_trait]
pub trait IdentitySdk: Send + Sync {
    /// Whether the local account has been registered.
    fn is_registered(&self) -> bool;

    /// Network address of the local account; empty until initialized.
    fn address(&self) -> String;

    /// Starts the account. Readiness is reported later as a status event.
    ///
    /// # Errors
    ///
    /// Returns an error if the SDK refuses to start.
    async fn initialize(&self) -> Result<(), SdkError>;

    /// Registers the account with a liveness selfie and its credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the SDK call fails.
    async fn register(
        &self,
        selfie: Vec<u8>,
        credentials: Vec<Credential>,
    ) -> Result<bool, SdkError>;

    /// Connects to a counterpart by inbox address and returns the group
    /// address of the new connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails.
    async fn connect_with_address(
        &self,
        address: String,
        info: HashMap<String, String>,
    ) -> Result<String, SdkError>;

    /// Connects to a counterpart from a QR discovery payload and returns the
    /// group address of the new connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails.
    async fn connect_with_qr(&self, qr: Vec<u8>) -> Result<String, SdkError>;

    /// Decodes a QR discovery payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a discovery payload.
    fn decode_qr(&self, qr: Vec<u8>) -> Result<DiscoveryData, SdkError>;

    /// Sends a message and returns its acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns an error if the SDK could not hand the message to the transport.
    async fn send(&self, message: OutboundMessage) -> Result<SendAck, SdkError>;

    /// Produces an encrypted account backup.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup cannot be produced.
    async fn backup(&self) -> Result<Vec<u8>, SdkError>;

    /// Restores an account from a backup, gated by a liveness selfie.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::VerificationFailed`] if the selfie does not match
    /// the backed-up identity and [`SdkError::DataRecoveryFailed`] if the
    /// account data cannot be recovered.
    async fn restore(
        &self,
        backup: Vec<u8>,
        selfie: Vec<u8>,
    ) -> Result<Vec<Credential>, SdkError>;

    /// Returns the stored credentials satisfying the constraints. The SDK
    /// evaluates each constraint's comparison operator.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential store cannot be read.
    fn look_up_credentials(
        &self,
        constraints: Vec<ClaimConstraint>,
    ) -> Result<Vec<Credential>, SdkError>;

    /// Adds credentials to the local store.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials cannot be stored.
    fn store_credentials(&self, credentials: Vec<Credential>) -> Result<(), SdkError>;

    /// Routes every event of `class` to `dispatcher`. Subscribing a class
    /// again replaces the previous listener.
    fn subscribe(&self, class: EventClass, dispatcher: Arc<ListenerDispatcher>);
}

/// The biometric liveness capture flow.
///
/// A black box owned by the host UI: it shows the camera flow and produces a
/// selfie plus the credentials derived from it.
#[uniffi::export(with_foreign)]
#[async_trait::async_trait]
pub trait LivenessCapture: Send + Sync {
    /// Runs the capture flow.
    ///
    /// # Errors
    ///
    /// Returns an error if the user aborts or the check fails.
    async fn capture(&self) -> Result<LivenessResult, SdkError>;
}
