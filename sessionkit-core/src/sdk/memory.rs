//! In-process implementation of [`IdentitySdk`] for tests and the developer
//! CLI.
//!
//! NOT an identity SDK: there is no cryptography and no transport. Messages
//! are recorded, events are injected with [`MemoryIdentitySdk::emit`], and an
//! optional send hook plays the counterpart.

#![allow(clippy::significant_drop_tightening)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{IdentitySdk, SdkError};
use crate::{
    Claim, ClaimConstraint, ComparisonOperator, Credential, DiscoveryData, EventClass,
    ListenerDispatcher, OutboundMessage, SdkEvent, SendAck,
};

/// Counterpart simulation: receives every sent message and returns the
/// events the counterpart answers with.
pub type SendHook = Arc<dyn Fn(&OutboundMessage) -> Vec<SdkEvent> + Send + Sync>;

#[derive(Serialize, Deserialize)]
struct BackupEnvelope {
    selfie: Vec<u8>,
    data: String,
}

#[derive(Serialize, Deserialize)]
struct DiscoveryPayload {
    address: String,
    sandbox: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory identity SDK.
pub struct MemoryIdentitySdk {
    address: String,
    init_status: Mutex<i64>,
    registered: AtomicBool,
    register_selfie: Mutex<Vec<u8>>,
    register_result: Mutex<bool>,
    connect_error: Mutex<Option<String>>,
    connect_delay: Mutex<Option<Duration>>,
    send_delay: Mutex<Option<Duration>>,
    next_group_address: Mutex<Option<String>>,
    ack_error: Mutex<Option<String>>,
    lookup_error: Mutex<Option<String>>,
    credentials: Mutex<Vec<Credential>>,
    sent: Mutex<Vec<OutboundMessage>>,
    listeners: Mutex<HashMap<EventClass, Arc<ListenerDispatcher>>>,
    send_hook: Mutex<Option<SendHook>>,
}

impl MemoryIdentitySdk {
    /// Creates an unregistered account that reports ready on initialize.
    #[must_use]
    pub fn new() -> Self {
        Self {
            address: format!("account-{}", uuid::Uuid::new_v4().simple()),
            init_status: Mutex::new(0),
            registered: AtomicBool::new(false),
            register_selfie: Mutex::new(Vec::new()),
            register_result: Mutex::new(true),
            connect_error: Mutex::new(None),
            connect_delay: Mutex::new(None),
            send_delay: Mutex::new(None),
            next_group_address: Mutex::new(None),
            ack_error: Mutex::new(None),
            lookup_error: Mutex::new(None),
            credentials: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            listeners: Mutex::new(HashMap::new()),
            send_hook: Mutex::new(None),
        }
    }

    /// Seeds the credential store.
    #[must_use]
    pub fn with_credentials(self, credentials: Vec<Credential>) -> Self {
        lock(&self.credentials).extend(credentials);
        self
    }

    /// Encodes a discovery payload the way a server's QR code carries it.
    #[must_use]
    pub fn discovery_qr(address: &str, sandbox: bool) -> Vec<u8> {
        serde_json::to_vec(&DiscoveryPayload {
            address: address.to_string(),
            sandbox,
        })
        .unwrap_or_default()
    }

    /// Status code the next `initialize` reports.
    pub fn set_init_status(&self, code: i64) {
        *lock(&self.init_status) = code;
    }

    /// Result the next `register` reports.
    pub fn set_register_result(&self, accepted: bool) {
        *lock(&self.register_result) = accepted;
    }

    /// Makes every connection handshake fail with `reason`.
    pub fn set_connect_error(&self, reason: Option<String>) {
        *lock(&self.connect_error) = reason;
    }

    /// Delays every connection handshake.
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        *lock(&self.connect_delay) = delay;
    }

    /// Delays every acknowledgement.
    pub fn set_send_delay(&self, delay: Option<Duration>) {
        *lock(&self.send_delay) = delay;
    }

    /// Group address returned by the next handshake instead of a fresh one.
    pub fn set_next_group_address(&self, group_address: String) {
        *lock(&self.next_group_address) = Some(group_address);
    }

    /// Error carried by every acknowledgement.
    pub fn set_ack_error(&self, error: Option<String>) {
        *lock(&self.ack_error) = error;
    }

    /// Makes every credential lookup fail with `reason`.
    pub fn set_lookup_error(&self, reason: Option<String>) {
        *lock(&self.lookup_error) = reason;
    }

    /// Installs the counterpart simulation.
    pub fn set_send_hook(&self, hook: SendHook) {
        *lock(&self.send_hook) = Some(hook);
    }

    /// Messages sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<OutboundMessage> {
        lock(&self.sent).clone()
    }

    /// Credentials in the store.
    #[must_use]
    pub fn stored_credentials(&self) -> Vec<Credential> {
        lock(&self.credentials).clone()
    }

    /// Number of subscribed event classes.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Delivers `event` to the listener of its class. Returns `false` if no
    /// listener is subscribed.
    pub fn emit(&self, event: SdkEvent) -> bool {
        let Some(listener) = lock(&self.listeners).get(&event.class()).cloned() else {
            return false;
        };
        listener.dispatch(event);
        true
    }

    fn matches(credential: &Credential, constraint: &ClaimConstraint) -> bool {
        credential.claims.iter().any(|claim| {
            claim.subject == constraint.subject
                && constraint.types.iter().all(|t| claim.types.contains(t))
                && evaluate(claim, constraint.operator, &constraint.value)
        })
    }
}

impl Default for MemoryIdentitySdk {
    fn default() -> Self {
        Self::new()
    }
}

/// Numeric when both sides parse as numbers, lexicographic otherwise.
fn evaluate(claim: &Claim, operator: ComparisonOperator, value: &str) -> bool {
    let ordering = match (claim.value.parse::<f64>(), value.parse::<f64>()) {
        (Ok(lhs), Ok(rhs)) => lhs.partial_cmp(&rhs),
        _ => Some(claim.value.as_str().cmp(value)),
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match operator {
        ComparisonOperator::Equals => ordering.is_eq(),
        ComparisonOperator::NotEquals => ordering.is_ne(),
        ComparisonOperator::GreaterThan => ordering.is_gt(),
        ComparisonOperator::GreaterThanOrEquals => ordering.is_ge(),
        ComparisonOperator::LessThan => ordering.is_lt(),
        ComparisonOperator::LessThanOrEquals => ordering.is_le(),
    }
}

#[async_trait::async_trait]
impl IdentitySdk for MemoryIdentitySdk {
    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    async fn initialize(&self) -> Result<(), SdkError> {
        let code = *lock(&self.init_status);
        self.emit(SdkEvent::Status { code });
        Ok(())
    }

    async fn register(
        &self,
        selfie: Vec<u8>,
        credentials: Vec<Credential>,
    ) -> Result<bool, SdkError> {
        if !*lock(&self.register_result) {
            return Ok(false);
        }
        *lock(&self.register_selfie) = selfie;
        lock(&self.credentials).extend(credentials);
        self.registered.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn connect_with_address(
        &self,
        address: String,
        _info: HashMap<String, String>,
    ) -> Result<String, SdkError> {
        let delay = *lock(&self.connect_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = lock(&self.connect_error).clone() {
            return Err(SdkError::Failed { reason });
        }
        Ok(lock(&self.next_group_address)
            .take()
            .unwrap_or_else(|| format!("group-{address}")))
    }

    async fn connect_with_qr(&self, qr: Vec<u8>) -> Result<String, SdkError> {
        let discovery = self.decode_qr(qr)?;
        self.connect_with_address(discovery.address, HashMap::new())
            .await
    }

    fn decode_qr(&self, qr: Vec<u8>) -> Result<DiscoveryData, SdkError> {
        let payload: DiscoveryPayload =
            serde_json::from_slice(&qr).map_err(|e| SdkError::Failed {
                reason: format!("not a discovery payload: {e}"),
            })?;
        Ok(DiscoveryData {
            address: payload.address,
            sandbox: payload.sandbox,
        })
    }

    async fn send(&self, message: OutboundMessage) -> Result<SendAck, SdkError> {
        let delay = *lock(&self.send_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.sent).push(message.clone());
        let error = if message.recipient().is_empty() {
            Some("message has no recipient".to_string())
        } else {
            lock(&self.ack_error).clone()
        };
        let ack = SendAck {
            message_id: uuid::Uuid::new_v4().to_string(),
            error,
        };
        if ack.error.is_none() {
            let hook = lock(&self.send_hook).clone();
            if let Some(hook) = hook {
                for event in hook(&message) {
                    self.emit(event);
                }
            }
        }
        Ok(ack)
    }

    async fn backup(&self) -> Result<Vec<u8>, SdkError> {
        if !self.is_registered() {
            return Err(SdkError::Failed {
                reason: "account is not registered".to_string(),
            });
        }
        let data = serde_json::to_string(&*lock(&self.credentials)).map_err(|e| {
            SdkError::Failed {
                reason: e.to_string(),
            }
        })?;
        let envelope = BackupEnvelope {
            selfie: lock(&self.register_selfie).clone(),
            data,
        };
        serde_json::to_vec(&envelope).map_err(|e| SdkError::Failed {
            reason: e.to_string(),
        })
    }

    async fn restore(
        &self,
        backup: Vec<u8>,
        selfie: Vec<u8>,
    ) -> Result<Vec<Credential>, SdkError> {
        let envelope: BackupEnvelope = serde_json::from_slice(&backup).map_err(|e| {
            SdkError::DataRecoveryFailed {
                reason: format!("malformed backup: {e}"),
            }
        })?;
        if envelope.selfie != selfie {
            return Err(SdkError::VerificationFailed {
                reason: "selfie does not match the backed-up identity".to_string(),
            });
        }
        let credentials: Vec<Credential> =
            serde_json::from_str(&envelope.data).map_err(|e| {
                SdkError::DataRecoveryFailed {
                    reason: format!("account data unreadable: {e}"),
                }
            })?;
        *lock(&self.register_selfie) = selfie;
        *lock(&self.credentials) = credentials.clone();
        self.registered.store(true, Ordering::SeqCst);
        Ok(credentials)
    }

    fn look_up_credentials(
        &self,
        constraints: Vec<ClaimConstraint>,
    ) -> Result<Vec<Credential>, SdkError> {
        if let Some(reason) = lock(&self.lookup_error).clone() {
            return Err(SdkError::Failed { reason });
        }
        Ok(lock(&self.credentials)
            .iter()
            .filter(|credential| {
                constraints
                    .iter()
                    .all(|constraint| Self::matches(credential, constraint))
            })
            .cloned()
            .collect())
    }

    fn store_credentials(&self, credentials: Vec<Credential>) -> Result<(), SdkError> {
        lock(&self.credentials).extend(credentials);
        Ok(())
    }

    fn subscribe(&self, class: EventClass, dispatcher: Arc<ListenerDispatcher>) {
        lock(&self.listeners).insert(class, dispatcher);
    }
}
