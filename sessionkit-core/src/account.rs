use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::SessionKitError, ClaimConstraint, Credential, DiscoveryData, IdentitySdk,
    OutboundMessage, SdkError,
};

impl From<SdkError> for SessionKitError {
    fn from(error: SdkError) -> Self {
        Self::Sdk {
            reason: error.to_string(),
        }
    }
}

/// Uniform asynchronous facade over the identity SDK.
///
/// Validates inputs, maps SDK outcomes into [`SessionKitError`] and reports
/// exactly one outcome per call. It holds no session state.
#[derive(Clone)]
pub struct AccountFacade {
    sdk: Arc<dyn IdentitySdk>,
}

impl AccountFacade {
    /// Wraps an SDK.
    #[must_use]
    pub fn new(sdk: Arc<dyn IdentitySdk>) -> Self {
        Self { sdk }
    }

    /// The wrapped SDK.
    #[must_use]
    pub fn sdk(&self) -> &dyn IdentitySdk {
        self.sdk.as_ref()
    }

    /// Whether the account is registered.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.sdk.is_registered()
    }

    /// Network address of the account.
    #[must_use]
    pub fn address(&self) -> String {
        self.sdk.address()
    }

    /// Starts the account.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::Initialization`] with code `-1` if the SDK
    /// refuses to start.
    pub async fn initialize(&self) -> Result<(), SessionKitError> {
        self.sdk.initialize().await.map_err(|e| {
            log::error!("sdk initialization failed: {e}");
            SessionKitError::Initialization { code: -1 }
        })
    }

    /// Registers the account.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::Registration`] if `selfie` or `credentials`
    /// is empty, or if the SDK rejects the registration.
    pub async fn register(
        &self,
        selfie: Vec<u8>,
        credentials: Vec<Credential>,
    ) -> Result<(), SessionKitError> {
        if selfie.is_empty() {
            return Err(registration("selfie is empty"));
        }
        if credentials.is_empty() {
            return Err(registration("no liveness credentials"));
        }
        match self.sdk.register(selfie, credentials).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(registration("rejected by the identity sdk")),
            Err(e) => Err(registration(&e.to_string())),
        }
    }

    /// Connects to a counterpart by address and returns the group address.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::Connection`] if `address` is empty, the
    /// handshake fails or yields an empty group address.
    pub async fn connect(
        &self,
        address: String,
        info: HashMap<String, String>,
    ) -> Result<String, SessionKitError> {
        if address.trim().is_empty() {
            return Err(connection("server address is empty"));
        }
        let group = self
            .sdk
            .connect_with_address(address, info)
            .await
            .map_err(|e| connection(&e.to_string()))?;
        non_empty_group(group)
    }

    /// Connects to a counterpart from a QR discovery payload and returns the
    /// group address.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::Connection`] if the handshake fails or
    /// yields an empty group address.
    pub async fn connect_with_qr(&self, qr: Vec<u8>) -> Result<String, SessionKitError> {
        let group = self
            .sdk
            .connect_with_qr(qr)
            .await
            .map_err(|e| connection(&e.to_string()))?;
        non_empty_group(group)
    }

    /// Decodes a QR discovery payload.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::Connection`] if the payload is invalid.
    pub fn decode_qr(&self, qr: Vec<u8>) -> Result<DiscoveryData, SessionKitError> {
        self.sdk
            .decode_qr(qr)
            .map_err(|e| connection(&e.to_string()))
    }

    /// Sends a message and returns its message id.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::Send`] if the SDK fails or the
    /// acknowledgement carries an error.
    pub async fn send(&self, message: OutboundMessage) -> Result<String, SessionKitError> {
        let ack = self.sdk.send(message).await.map_err(|e| SessionKitError::Send {
            reason: e.to_string(),
        })?;
        match ack.error {
            Some(reason) => Err(SessionKitError::Send { reason }),
            None => Ok(ack.message_id),
        }
    }

    /// Produces an account backup.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::Backup`] if the SDK fails or returns an
    /// empty backup.
    pub async fn backup(&self) -> Result<Vec<u8>, SessionKitError> {
        let backup = self.sdk.backup().await.map_err(|e| SessionKitError::Backup {
            reason: e.to_string(),
        })?;
        if backup.is_empty() {
            return Err(SessionKitError::Backup {
                reason: "identity sdk returned an empty backup".to_string(),
            });
        }
        Ok(backup)
    }

    /// Restores the account and returns its credentials.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::RestoreVerification`] if the identity could
    /// not be verified, [`SessionKitError::RestoreData`] if verification
    /// passed but no account data was recovered, and
    /// [`SessionKitError::InvalidInput`] for empty inputs.
    pub async fn restore(
        &self,
        backup: Vec<u8>,
        selfie: Vec<u8>,
    ) -> Result<Vec<Credential>, SessionKitError> {
        if backup.is_empty() {
            return Err(SessionKitError::invalid_input("backup", "backup is empty"));
        }
        if selfie.is_empty() {
            return Err(SessionKitError::invalid_input("selfie", "selfie is empty"));
        }
        let credentials = self
            .sdk
            .restore(backup, selfie)
            .await
            .map_err(|e| match e {
                SdkError::VerificationFailed { reason } => {
                    SessionKitError::RestoreVerification { reason }
                }
                SdkError::DataRecoveryFailed { reason } => SessionKitError::RestoreData { reason },
                other => other.into(),
            })?;
        if credentials.is_empty() {
            return Err(SessionKitError::RestoreData {
                reason: "no credentials recovered".to_string(),
            });
        }
        Ok(credentials)
    }

    /// Looks up stored credentials; the SDK evaluates the operators.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::Sdk`] if the store cannot be read.
    pub fn look_up_credentials(
        &self,
        constraints: Vec<ClaimConstraint>,
    ) -> Result<Vec<Credential>, SessionKitError> {
        Ok(self.sdk.look_up_credentials(constraints)?)
    }

    /// Adds credentials to the local store.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::Sdk`] if the credentials cannot be stored.
    pub fn store_credentials(&self, credentials: Vec<Credential>) -> Result<(), SessionKitError> {
        Ok(self.sdk.store_credentials(credentials)?)
    }
}

fn registration(reason: &str) -> SessionKitError {
    SessionKitError::Registration {
        reason: reason.to_string(),
    }
}

fn connection(reason: &str) -> SessionKitError {
    SessionKitError::Connection {
        reason: reason.to_string(),
    }
}

fn non_empty_group(group: String) -> Result<String, SessionKitError> {
    if group.is_empty() {
        return Err(connection("handshake returned an empty group address"));
    }
    Ok(group)
}
