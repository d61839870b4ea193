//! Common test utilities shared across integration tests.

use std::collections::HashMap;
use std::sync::Arc;

use sessionkit_core::preferences::MemoryPreferences;
use sessionkit_core::sdk::memory::MemoryIdentitySdk;
use sessionkit_core::{
    Claim, ClaimConstraint, Credential, CredentialRequest, CredentialType, Environment,
    LivenessCapture, LivenessResult, PreferencesStore, SdkError, SdkEvent, Session,
    SessionConfig,
};

pub const SELFIE: &[u8] = b"selfie-bytes";
pub const SERVER: &str = "server-inbox";

pub fn liveness_credential() -> Credential {
    Credential {
        id: "liveness-1".to_string(),
        issuer: "liveness-issuer".to_string(),
        claims: vec![Claim {
            types: vec![CredentialType::Liveness, CredentialType::Verifiable],
            subject: "sourceImageHash".to_string(),
            value: "f00d".to_string(),
        }],
        payload: vec![1, 2, 3],
    }
}

pub fn email_credential(address: &str) -> Credential {
    Credential {
        id: format!("email-{address}"),
        issuer: "email-issuer".to_string(),
        claims: vec![Claim {
            types: vec![CredentialType::Email, CredentialType::Verifiable],
            subject: "emailAddress".to_string(),
            value: address.to_string(),
        }],
        payload: vec![4, 5, 6],
    }
}

pub fn credential_request(id: &str, constraints: Vec<ClaimConstraint>) -> SdkEvent {
    SdkEvent::CredentialRequest {
        request: CredentialRequest {
            id: id.to_string(),
            from: SERVER.to_string(),
            to: "me".to_string(),
            constraints,
        },
    }
}

pub fn session_with(
    sdk: Arc<MemoryIdentitySdk>,
    preferences: Arc<dyn PreferencesStore>,
) -> Arc<Session> {
    Session::new(
        SessionConfig::from_environment(&Environment::Sandbox, "/tmp/sessionkit-test"),
        sdk,
        preferences,
    )
}

/// Initialized, registered and connected to [`SERVER`].
pub async fn connected_session() -> (Arc<MemoryIdentitySdk>, Arc<Session>) {
    let sdk = Arc::new(MemoryIdentitySdk::new());
    let session = session_with(sdk.clone(), Arc::new(MemoryPreferences::new()));
    session.initialize().await.expect("initialize");
    session
        .register(SELFIE.to_vec(), vec![liveness_credential()])
        .await
        .expect("register");
    session
        .connect(SERVER.to_string(), HashMap::new())
        .await
        .expect("connect");
    (sdk, session)
}

pub struct StaticLiveness {
    pub result: Option<LivenessResult>,
}

#[async_trait::async_trait]
impl LivenessCapture for StaticLiveness {
    async fn capture(&self) -> Result<LivenessResult, SdkError> {
        self.result.clone().ok_or_else(|| SdkError::Failed {
            reason: "user cancelled".to_string(),
        })
    }
}
