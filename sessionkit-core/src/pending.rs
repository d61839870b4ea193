//! Single-slot tracker for outbound requests awaiting a counterpart.
//!
//! ```text
//! start(kind) ──► Pending ──resolve(kind)──► Resolved
//!                   │  └──────fail()───────► Errored
//!                   ├──deadline elapses────► TimedOut
//!                   └──cancel()────────────► (cleared, unmarked)
//! ```
//!
//! Only one request may be pending at a time. The timeout task is cancelled
//! exactly once: by resolution, failure or cancellation (abort), or by
//! firing. Whichever of resolve and timeout reaches the tracker first wins;
//! the other becomes a no-op.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use strum::{Display, EnumString};
use tokio::task::JoinHandle;

use crate::error::SessionKitError;

/// Kind of an outbound request.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    uniffi::Enum,
)]
#[strum(serialize_all = "kebab-case")]
pub enum RequestKind {
    /// Liveness authentication; resolved by any inbound request.
    Auth,
    /// Credential sharing; resolved by any inbound request.
    CredentialShare,
    /// Document signing; resolved by any inbound request.
    DocumentSign,
    /// Custom credential issuance; resolved by a credential message.
    CustomCredential,
    /// Verification; resolved by any inbound request.
    Verification,
}

impl RequestKind {
    /// Whether an inbound request of any type resolves this kind.
    #[must_use]
    pub const fn awaits_any_request(self) -> bool {
        !matches!(self, Self::CustomCredential)
    }
}

/// Resolution state of a [`PendingRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, uniffi::Enum)]
#[strum(serialize_all = "kebab-case")]
pub enum Resolution {
    /// Awaiting the counterpart.
    Pending,
    /// The counterpart answered.
    Resolved,
    /// The deadline elapsed first.
    TimedOut,
    /// Sending the request failed.
    Errored,
}

/// An outbound request awaiting the counterpart's reply.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct PendingRequest {
    /// Correlation identifier (UUID v4).
    pub correlation_id: String,
    /// Kind of the request.
    pub kind: RequestKind,
    /// Unix timestamp (seconds) the request was issued at.
    pub issued_at: u64,
    /// Seconds until the request times out.
    pub deadline_secs: u64,
    /// Current resolution state.
    pub resolution: Resolution,
}

/// Invoked with the correlation id once a request's deadline elapses.
pub type TimeoutCallback = Arc<dyn Fn(String) + Send + Sync>;

struct Active {
    request: PendingRequest,
    timer: Option<JoinHandle<()>>,
}

impl Active {
    fn settle(mut self, resolution: Resolution) -> PendingRequest {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.request.resolution = resolution;
        self.request
    }
}

/// Owns the single in-flight request slot and its timeout task.
///
/// The tracker is not synchronized; it lives inside the session's serialized
/// context. The timeout task only reports the elapsed deadline through the
/// callback, and the owner feeds it back via [`Self::handle_timeout`].
pub struct PendingRequestTracker {
    active: Option<Active>,
    on_timeout: TimeoutCallback,
}

impl PendingRequestTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new(on_timeout: TimeoutCallback) -> Self {
        Self {
            active: None,
            on_timeout,
        }
    }

    /// The request currently in flight.
    #[must_use]
    pub fn active(&self) -> Option<&PendingRequest> {
        self.active.as_ref().map(|active| &active.request)
    }

    /// Parks a new request and schedules its timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::AlreadyPending`] if a request is already in
    /// flight, or [`SessionKitError::Sdk`] when called outside a tokio runtime.
    pub fn start(
        &mut self,
        kind: RequestKind,
        deadline: Duration,
    ) -> Result<PendingRequest, SessionKitError> {
        if let Some(active) = &self.active {
            return Err(SessionKitError::AlreadyPending {
                kind: active.request.kind,
            });
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|e| SessionKitError::Sdk {
            reason: format!("no async runtime for request timeout: {e}"),
        })?;

        let request = PendingRequest {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            kind,
            issued_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            deadline_secs: deadline.as_secs(),
            resolution: Resolution::Pending,
        };

        let on_timeout = Arc::clone(&self.on_timeout);
        let correlation_id = request.correlation_id.clone();
        let timer = handle.spawn(async move {
            tokio::time::sleep(deadline).await;
            on_timeout(correlation_id);
        });

        log::debug!(
            "pending {kind} request {} with {}s deadline",
            request.correlation_id,
            request.deadline_secs
        );
        self.active = Some(Active {
            request: request.clone(),
            timer: Some(timer),
        });
        Ok(request)
    }

    /// Resolves the active request if it is of `kind`. No-op otherwise.
    pub fn resolve(&mut self, kind: RequestKind) -> Option<PendingRequest> {
        if self.active()?.kind != kind {
            return None;
        }
        self.settle(Resolution::Resolved)
    }

    /// Resolves the active request if it was only waiting for any inbound
    /// request to arrive.
    pub fn resolve_any_awaiting_request(&mut self) -> Option<PendingRequest> {
        let kind = self.active()?.kind;
        if !kind.awaits_any_request() {
            return None;
        }
        self.resolve(kind)
    }

    /// Marks the active request as failed, e.g. when sending it errored.
    pub fn fail(&mut self) -> Option<PendingRequest> {
        self.settle(Resolution::Errored)
    }

    /// Clears the active request without marking it. Returns whether one
    /// was active.
    pub fn cancel(&mut self) -> bool {
        self.active.take().is_some_and(|active| {
            let request = active.settle(Resolution::Pending);
            log::debug!("cancelled {} request {}", request.kind, request.correlation_id);
            true
        })
    }

    /// Applies an elapsed deadline. Returns the timed-out request, or `None`
    /// if `correlation_id` no longer names the active request.
    pub fn handle_timeout(&mut self, correlation_id: &str) -> Option<PendingRequest> {
        if self.active()?.correlation_id != correlation_id {
            return None;
        }
        let mut active = self.active.take()?;
        // The timer task is the caller; dropping its handle detaches it.
        active.timer = None;
        let request = active.settle(Resolution::TimedOut);
        log::warn!("{} request {} timed out", request.kind, request.correlation_id);
        Some(request)
    }

    fn settle(&mut self, resolution: Resolution) -> Option<PendingRequest> {
        let request = self.active.take()?.settle(resolution);
        log::debug!(
            "{} request {} is {resolution}",
            request.kind,
            request.correlation_id
        );
        Some(request)
    }
}

impl Drop for PendingRequestTracker {
    fn drop(&mut self) {
        self.cancel();
    }
}
