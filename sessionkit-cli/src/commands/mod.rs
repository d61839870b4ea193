//! Subcommand implementations.

pub mod backup;
pub mod demo;
pub mod prefs;

use std::sync::Arc;

use sessionkit_core::{LivenessCapture, LivenessResult, SdkError, SessionObserver, SessionSnapshot};

use crate::counterpart;

/// Selfie every demo account is registered with.
pub const SELFIE: &[u8] = b"sessionkit-demo-selfie";

/// Logs every state change at debug level.
pub struct LogObserver;

impl SessionObserver for LogObserver {
    fn on_state_changed(&self, snapshot: SessionSnapshot) {
        tracing::debug!(
            init = %snapshot.init,
            registration = %snapshot.registration,
            connection = %snapshot.connection,
            flow = ?snapshot.flow,
            flow_state = %snapshot.flow_state,
            backup_restore = %snapshot.backup_restore,
            "session state changed"
        );
    }
}

/// Liveness capture that always returns the same selfie.
pub struct FixedSelfie {
    selfie: Vec<u8>,
}

impl FixedSelfie {
    /// Capture returning `selfie` with the demo liveness credential.
    pub fn new(selfie: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            selfie: selfie.to_vec(),
        })
    }
}

#[async_trait::async_trait]
impl LivenessCapture for FixedSelfie {
    async fn capture(&self) -> Result<LivenessResult, SdkError> {
        Ok(LivenessResult {
            selfie: self.selfie.clone(),
            credentials: vec![counterpart::liveness_credential()],
        })
    }
}
