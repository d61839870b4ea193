//! The session: one identity, at most one connection, one flow at a time.
//!
//! All state lives in [`SessionCore`] behind a single mutex, which is the
//! serialized context every mutation runs in. SDK calls are awaited with the
//! lock released; their completions re-enter through [`SessionInner::update`]
//! and are discarded if the flow was reset in between (the flow epoch moved).
//! SDK events arrive through the [`ListenerDispatcher`] on whatever thread
//! the SDK delivers them and take the same path.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;

use crate::{
    error::SessionKitError, AccountFacade, Action, BackupRestoreState, ConnectionState,
    Credential, CredentialMatcher, CredentialMessage, CredentialResponse, DispatchTarget, Flow,
    FlowState, IdentityInfo, IdentitySdk, IncomingRequest, InitState, ListenerDispatcher,
    LivenessCapture, OutboundMessage, PendingRequest, PendingRequestTracker, PreferencesStore,
    RegistrationState, RequestKind, ResponseStatus, ServerPreferences, ServerRequest,
    SessionConfig, SessionSnapshot, REQUEST_TIMED_OUT_MESSAGE,
};

/// Receives a snapshot after every state change.
///
/// Called outside the session lock, possibly from an SDK delivery thread.
#[uniffi::export(with_foreign)]
pub trait SessionObserver: Send + Sync {
    /// The session changed; `snapshot` is its new state.
    fn on_state_changed(&self, snapshot: SessionSnapshot);
}

struct SessionCore {
    state: SessionSnapshot,
    tracker: PendingRequestTracker,
    epoch: u64,
    /// Credentials delivered for custom-credential requests, by correlation id.
    received: HashMap<String, Vec<Credential>>,
    current_received: Option<String>,
    last_error: Option<SessionKitError>,
}

impl SessionCore {
    fn snapshot(&self) -> SessionSnapshot {
        let mut snapshot = self.state.clone();
        snapshot.pending = self.tracker.active().cloned();
        snapshot.received_credentials = self
            .current_received
            .as_ref()
            .and_then(|id| self.received.get(id))
            .map_or(0, |credentials| {
                u32::try_from(credentials.len()).unwrap_or(u32::MAX)
            });
        snapshot.last_error = self.last_error.as_ref().map(ToString::to_string);
        snapshot
    }

    fn record(&mut self, error: &SessionKitError) {
        log::warn!("{error}");
        self.last_error = Some(error.clone());
    }

    fn fail<T>(&mut self, error: SessionKitError) -> Result<T, SessionKitError> {
        self.record(&error);
        Err(error)
    }

    fn check(&mut self, action: Action) -> Result<(), SessionKitError> {
        self.state.check(action)
    }

    fn reset_flow(&mut self) {
        self.tracker.cancel();
        self.epoch = self.epoch.wrapping_add(1);
        self.state.flow = None;
        self.state.flow_state = FlowState::None;
        self.state.credential_request = None;
        self.state.verification_request = None;
        self.state.signing_request = None;
        if self.state.backup_restore != BackupRestoreState::Processing {
            self.state.backup_restore = BackupRestoreState::None;
        }
        self.received.clear();
        self.current_received = None;
    }

    fn group_address(&self) -> Option<String> {
        match &self.state.connection {
            ConnectionState::Connected { group_address, .. } => Some(group_address.clone()),
            _ => None,
        }
    }
}

struct SessionInner {
    config: SessionConfig,
    account: AccountFacade,
    preferences: ServerPreferences,
    dispatcher: Arc<ListenerDispatcher>,
    core: Mutex<SessionCore>,
    snapshots: watch::Sender<SessionSnapshot>,
    observer: Mutex<Option<Arc<dyn SessionObserver>>>,
}

impl SessionInner {
    fn core(&self) -> MutexGuard<'_, SessionCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `apply` in the serialized context and publishes the result.
    fn update<R>(&self, apply: impl FnOnce(&mut SessionCore) -> R) -> R {
        let (result, snapshot) = {
            let mut core = self.core();
            let result = apply(&mut core);
            let snapshot = core.snapshot();
            // Published under the lock so watchers never see states out of order.
            self.snapshots.send_replace(snapshot.clone());
            drop(core);
            (result, snapshot)
        };
        let observer = self
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(observer) = observer {
            observer.on_state_changed(snapshot);
        }
        result
    }

    fn on_request_timeout(&self, correlation_id: &str) {
        self.update(|core| {
            let Some(request) = core.tracker.handle_timeout(correlation_id) else {
                return;
            };
            core.state.flow_state = FlowState::RequestError {
                message: REQUEST_TIMED_OUT_MESSAGE.to_string(),
            };
            core.record(&SessionKitError::RequestTimeout { kind: request.kind });
        });
    }

    async fn run_connect(
        &self,
        peer_address: String,
        handshake: impl Future<Output = Result<String, SessionKitError>> + Send,
    ) -> Result<String, SessionKitError> {
        let timeout = self.config.connect_timeout();
        let outcome = tokio::time::timeout(timeout, handshake)
            .await
            .unwrap_or_else(|_| {
                Err(SessionKitError::Connection {
                    reason: format!("handshake timed out after {}s", timeout.as_secs()),
                })
            });

        let group_address = self.update(|core| match outcome {
            Ok(group_address) => {
                log::info!("connected to {peer_address} in group {group_address}");
                core.last_error = None;
                core.state.connection = ConnectionState::Connected {
                    peer_address: peer_address.clone(),
                    group_address: group_address.clone(),
                };
                Ok(group_address)
            }
            Err(error) => {
                core.state.connection = ConnectionState::Disconnected;
                core.fail(error)
            }
        })?;

        if let Err(e) = self.preferences.record_connection(&peer_address) {
            let error = SessionKitError::from(e);
            self.update(|core| core.record(&error));
        }
        Ok(group_address)
    }

    /// Sends a response to the incoming request taken from the session and
    /// applies the outcome to the flow, unless the flow was reset meanwhile.
    async fn send_response(
        &self,
        epoch: u64,
        status: ResponseStatus,
        message: OutboundMessage,
    ) -> Result<ResponseStatus, SessionKitError> {
        let result = self.account.send(message).await;
        self.update(|core| {
            let current = core.epoch == epoch;
            match result {
                Ok(message_id) => {
                    log::debug!("response {message_id} sent with status {status}");
                    if current {
                        core.state.flow_state = FlowState::ResponseSent { status };
                    }
                    Ok(status)
                }
                Err(error) => {
                    if current {
                        core.state.flow_state = FlowState::RequestError {
                            message: error.to_string(),
                        };
                    }
                    core.fail(error)
                }
            }
        })
    }
}

impl DispatchTarget for SessionInner {
    fn on_status(&self, code: i64) {
        self.update(|core| {
            if core.state.init != InitState::Initializing {
                log::debug!("ignoring status {code} while {}", core.state.init);
                return;
            }
            if code == 0 {
                log::info!("identity sdk is ready");
                core.state.init = InitState::Ready;
            } else {
                core.state.init = InitState::InitError { code };
                core.record(&SessionKitError::Initialization { code });
            }
        });
    }

    fn on_credential_message(&self, message: CredentialMessage) {
        self.update(|core| {
            let Some(request) = core.tracker.resolve(RequestKind::CustomCredential) else {
                log::warn!(
                    "dropping credential message {}: no custom credential request pending",
                    message.id
                );
                return;
            };
            log::info!(
                "received {} credential(s) for request {}",
                message.credentials.len(),
                request.correlation_id
            );
            core.received
                .insert(request.correlation_id.clone(), message.credentials);
            core.current_received = Some(request.correlation_id);
            core.state.flow_state = FlowState::RequestReceived {
                request_id: message.id,
            };
        });
    }

    fn on_incoming_request(&self, request: IncomingRequest) {
        self.update(|core| {
            let request_id = request.id().to_string();
            let flow = match request {
                IncomingRequest::Credential { request } => {
                    core.state.credential_request = Some(request);
                    Flow::CredentialSharing
                }
                IncomingRequest::Verification { request } if request.is_agreement() => {
                    core.state.verification_request = Some(request);
                    Flow::DocumentSigning
                }
                IncomingRequest::Verification { request } => {
                    log::warn!(
                        "ignoring verification request {} without an agreement",
                        request.id
                    );
                    return;
                }
                IncomingRequest::Signing { request } => {
                    core.state.signing_request = Some(request);
                    Flow::DocumentSigning
                }
            };
            if let FlowState::RequestError { message } = &core.state.flow_state {
                log::warn!("request {request_id} arrived after the flow failed: {message}");
                return;
            }
            if let Some(pending) = core.tracker.resolve_any_awaiting_request() {
                log::debug!(
                    "request {request_id} answers {} request {}",
                    pending.kind,
                    pending.correlation_id
                );
            }
            core.state.flow.get_or_insert(flow);
            core.state.flow_state = FlowState::RequestReceived { request_id };
        });
    }

    fn on_response(&self, response: CredentialResponse) {
        log::info!(
            "credential response to {} from {} with status {}",
            response.request_id,
            response.from,
            response.status
        );
    }
}

/// Client session over one identity.
///
/// Create one per identity and keep it for the process lifetime. Every
/// operation validates the current state first and fails with
/// [`SessionKitError::InvalidState`] when the action is not available.
#[derive(uniffi::Object)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[uniffi::export(async_runtime = "tokio")]
impl Session {
    /// Creates a session and subscribes it to the SDK's events.
    #[uniffi::constructor]
    #[must_use]
    pub fn new(
        config: SessionConfig,
        sdk: Arc<dyn IdentitySdk>,
        preferences: Arc<dyn PreferencesStore>,
    ) -> Arc<Self> {
        let state = SessionSnapshot {
            registration: if sdk.is_registered() {
                RegistrationState::Registered
            } else {
                RegistrationState::Unregistered
            },
            ..SessionSnapshot::default()
        };

        let inner = Arc::new_cyclic(|weak: &Weak<SessionInner>| {
            let timeout_target = weak.clone();
            let tracker = PendingRequestTracker::new(Arc::new(move |correlation_id: String| {
                if let Some(inner) = timeout_target.upgrade() {
                    inner.on_request_timeout(&correlation_id);
                }
            }));
            let dispatch_target: Weak<dyn DispatchTarget> = weak.clone();
            let (snapshots, _) = watch::channel(state.clone());
            SessionInner {
                config,
                account: AccountFacade::new(sdk),
                preferences: ServerPreferences::new(preferences),
                dispatcher: ListenerDispatcher::new(dispatch_target),
                core: Mutex::new(SessionCore {
                    state,
                    tracker,
                    epoch: 0,
                    received: HashMap::new(),
                    current_received: None,
                    last_error: None,
                }),
                snapshots,
                observer: Mutex::new(None),
            }
        });
        inner.dispatcher.attach(inner.account.sdk());

        Arc::new(Self { inner })
    }

    /// Installs the observer notified after every state change.
    pub fn set_observer(&self, observer: Arc<dyn SessionObserver>) {
        *self
            .inner
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    /// Current state.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.core().snapshot()
    }

    /// Whether `action` is valid now.
    #[must_use]
    pub fn can(&self, action: Action) -> bool {
        self.inner.core().state.check(action).is_ok()
    }

    /// The session configuration.
    #[must_use]
    pub fn config(&self) -> SessionConfig {
        self.inner.config.clone()
    }

    /// Local identity details.
    #[must_use]
    pub fn identity(&self) -> IdentityInfo {
        IdentityInfo {
            storage_path: self.inner.config.storage_path.clone(),
            registered: self.inner.account.is_registered(),
            address: self.inner.account.address(),
        }
    }

    /// The last server this identity connected to, unless disconnected since.
    ///
    /// A connected flag without an address is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::Preferences`] if the store fails.
    pub fn last_server_address(&self) -> Result<Option<String>, SessionKitError> {
        Ok(self.inner.preferences.resumable_server()?)
    }

    /// Credentials received in the current custom-credential flow.
    #[must_use]
    pub fn received_credentials(&self) -> Vec<Credential> {
        let core = self.inner.core();
        core.current_received
            .as_ref()
            .and_then(|id| core.received.get(id))
            .cloned()
            .unwrap_or_default()
    }

    /// Starts the SDK. The session becomes ready when the SDK reports
    /// status `0`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::InvalidState`] unless uninitialized or
    /// failed, and [`SessionKitError::Initialization`] if the SDK refuses to
    /// start.
    pub async fn initialize(&self) -> Result<(), SessionKitError> {
        self.inner.update(|core| {
            core.check(Action::Initialize)?;
            core.state.init = InitState::Initializing;
            core.last_error = None;
            Ok::<_, SessionKitError>(())
        })?;

        let result = self.inner.account.initialize().await;
        self.inner.update(|core| match result {
            Ok(()) => Ok(()),
            Err(error) => {
                if core.state.init == InitState::Initializing {
                    if let SessionKitError::Initialization { code } = error {
                        core.state.init = InitState::InitError { code };
                    }
                }
                core.fail(error)
            }
        })
    }

    /// Registers the identity with a liveness selfie and its credentials.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::Registration`] for empty inputs or an SDK
    /// rejection; the session stays unregistered.
    pub async fn register(
        &self,
        selfie: Vec<u8>,
        credentials: Vec<Credential>,
    ) -> Result<(), SessionKitError> {
        self.inner.update(|core| {
            core.check(Action::Register)?;
            core.state.registration = RegistrationState::Registering;
            Ok::<_, SessionKitError>(())
        })?;

        let result = self.inner.account.register(selfie, credentials).await;
        self.inner.update(|core| match result {
            Ok(()) => {
                log::info!("identity registered");
                core.state.registration = RegistrationState::Registered;
                core.last_error = None;
                Ok(())
            }
            Err(error) => {
                core.state.registration = RegistrationState::Unregistered;
                core.fail(error)
            }
        })
    }

    /// Runs the liveness check and registers with its result.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::Registration`] if the capture or the
    /// registration fails.
    pub async fn register_with_liveness(
        &self,
        capture: Arc<dyn LivenessCapture>,
    ) -> Result<(), SessionKitError> {
        self.inner.update(|core| core.check(Action::Register))?;
        let liveness = match capture.capture().await {
            Ok(liveness) => liveness,
            Err(e) => {
                return self.inner.update(|core| {
                    core.fail(SessionKitError::Registration {
                        reason: format!("liveness check failed: {e}"),
                    })
                });
            }
        };
        self.register(liveness.selfie, liveness.credentials).await
    }

    /// Connects to a server by inbox address and returns the group address.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::Connection`] if the address is empty, the
    /// handshake fails or does not finish within the connect timeout; the
    /// session stays disconnected.
    pub async fn connect(
        &self,
        address: String,
        info: HashMap<String, String>,
    ) -> Result<String, SessionKitError> {
        self.inner.update(|core| {
            core.check(Action::Connect)?;
            core.state.connection = ConnectionState::Connecting;
            Ok::<_, SessionKitError>(())
        })?;

        let handshake = self.inner.account.connect(address.clone(), info);
        self.inner.run_connect(address, handshake).await
    }

    /// Connects to a server from its QR discovery payload and returns the
    /// group address.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::Connection`] if the payload is invalid,
    /// targets the other environment, or the handshake fails.
    pub async fn connect_with_qr(&self, qr: Vec<u8>) -> Result<String, SessionKitError> {
        self.inner.update(|core| core.check(Action::Connect))?;

        let discovery = match self.inner.account.decode_qr(qr.clone()) {
            Ok(discovery) => discovery,
            Err(error) => return self.inner.update(|core| core.fail(error)),
        };
        let expected_sandbox = self.inner.config.environment.is_sandbox();
        if discovery.sandbox != expected_sandbox {
            let error = SessionKitError::Connection {
                reason: format!(
                    "server at {} is not a {} server",
                    discovery.address, self.inner.config.environment
                ),
            };
            return self.inner.update(|core| core.fail(error));
        }

        self.inner.update(|core| {
            core.check(Action::Connect)?;
            core.state.connection = ConnectionState::Connecting;
            Ok::<_, SessionKitError>(())
        })?;
        let handshake = self.inner.account.connect_with_qr(qr);
        self.inner.run_connect(discovery.address, handshake).await
    }

    /// Reconnects to the server this identity was last connected to and
    /// returns the group address, or `None` if there is nothing to resume.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::Preferences`] if the store fails, otherwise
    /// as [`Self::connect`].
    pub async fn resume_connection(&self) -> Result<Option<String>, SessionKitError> {
        let Some(address) = self.last_server_address()? else {
            return Ok(None);
        };
        log::info!("resuming connection to {address}");
        self.connect(address, HashMap::new()).await.map(Some)
    }

    /// Drops the connection, clears the current flow and forgets the server.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::InvalidState`] unless connected, and
    /// [`SessionKitError::Preferences`] if the server preference cannot be
    /// cleared (the session is disconnected regardless).
    pub fn disconnect(&self) -> Result<(), SessionKitError> {
        self.inner.update(|core| {
            core.check(Action::Disconnect)?;
            core.reset_flow();
            core.state.connection = ConnectionState::Disconnected;
            Ok::<_, SessionKitError>(())
        })?;
        log::info!("disconnected");
        Ok(self.inner.preferences.clear()?)
    }

    /// Asks the server to start one of its flows.
    ///
    /// # Errors
    ///
    /// See [`Self::notify_server`].
    pub async fn notify_server_for_request(
        &self,
        request: ServerRequest,
    ) -> Result<PendingRequest, SessionKitError> {
        self.notify_server(request.as_message(), request.kind()).await
    }

    /// Sends `message` to the server and parks a request of `kind` until the
    /// server answers or the request timeout elapses.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::AlreadyPending`] if a request is in flight,
    /// [`SessionKitError::InvalidState`] unless connected, and
    /// [`SessionKitError::Send`] if the message is not acknowledged.
    pub async fn notify_server(
        &self,
        message: String,
        kind: RequestKind,
    ) -> Result<PendingRequest, SessionKitError> {
        let timeout = self.inner.config.request_timeout();
        let (pending, group_address, epoch) = self.inner.update(|core| {
            core.check(Action::NotifyServer)?;
            let group_address = core.group_address().unwrap_or_default();
            let pending = core.tracker.start(kind, timeout)?;
            core.state.flow = Some(Flow::for_request(kind));
            core.state.flow_state = FlowState::RequestSent { kind };
            core.last_error = None;
            Ok::<_, SessionKitError>((pending, group_address, core.epoch))
        })?;

        let result = self
            .inner
            .account
            .send(OutboundMessage::Chat {
                to: group_address,
                body: message,
            })
            .await;

        self.inner.update(|core| match result {
            Ok(_) => Ok(pending),
            Err(error) => {
                let still_active = core
                    .tracker
                    .active()
                    .is_some_and(|active| active.correlation_id == pending.correlation_id);
                if core.epoch == epoch && still_active {
                    core.tracker.fail();
                    core.state.flow_state = FlowState::RequestError {
                        message: error.to_string(),
                    };
                }
                core.fail(error)
            }
        })
    }

    /// Answers the current credential request with the matching stored
    /// credentials and returns the status actually sent.
    ///
    /// When nothing matches, an accepted answer is downgraded to a rejected
    /// one with an empty credential list.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::NoIncomingRequest`] or
    /// [`SessionKitError::RequestSuperseded`] if `request_id` is not the
    /// current credential request, and [`SessionKitError::Send`] if the
    /// response is not acknowledged.
    #[allow(clippy::needless_pass_by_value)]
    pub async fn share_credentials(
        &self,
        request_id: String,
        status: ResponseStatus,
    ) -> Result<ResponseStatus, SessionKitError> {
        let (request, epoch) = self.inner.update(|core| {
            core.check(Action::Respond)?;
            let request = take_current(
                &mut core.state.credential_request,
                &request_id,
                "credential_request",
                |request| &request.id,
            )?;
            Ok::<_, SessionKitError>((request, core.epoch))
        })?;

        let (status, credentials) = if status == ResponseStatus::Accepted {
            let matched = CredentialMatcher::new(&self.inner.account).select(&request.constraints);
            match matched {
                Ok(matched) if matched.is_empty() => {
                    log::info!("no stored credential matches request {request_id}");
                    (ResponseStatus::Rejected, matched)
                }
                Ok(matched) => (ResponseStatus::Accepted, matched),
                Err(error) => {
                    return self.inner.update(|core| {
                        if core.epoch == epoch {
                            core.state.flow_state = FlowState::RequestError {
                                message: error.to_string(),
                            };
                        }
                        core.fail(error)
                    });
                }
            }
        } else {
            (ResponseStatus::Rejected, Vec::new())
        };

        let message = OutboundMessage::CredentialResponse {
            request_id: request.id,
            to: request.from,
            status,
            credentials,
        };
        self.inner.send_response(epoch, status, message).await
    }

    /// Answers the current credential request with the credentials of a
    /// fresh liveness check and returns the status sent.
    ///
    /// Only liveness-derived credentials are shared; if the capture yields
    /// none the request is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::NoIncomingRequest`] or
    /// [`SessionKitError::RequestSuperseded`] if `request_id` is not the
    /// current credential request, [`SessionKitError::Sdk`] if the capture
    /// fails (the flow moves to `request_error`), and
    /// [`SessionKitError::Send`] if the response is not acknowledged.
    #[allow(clippy::needless_pass_by_value)]
    pub async fn respond_with_liveness(
        &self,
        request_id: String,
        capture: Arc<dyn LivenessCapture>,
    ) -> Result<ResponseStatus, SessionKitError> {
        let (request, epoch) = self.inner.update(|core| {
            core.check(Action::Respond)?;
            let request = take_current(
                &mut core.state.credential_request,
                &request_id,
                "credential_request",
                |request| &request.id,
            )?;
            Ok::<_, SessionKitError>((request, core.epoch))
        })?;

        let mut credentials = match capture.capture().await {
            Ok(liveness) => liveness.credentials,
            Err(e) => {
                let error = SessionKitError::Sdk {
                    reason: format!("liveness check failed: {e}"),
                };
                return self.inner.update(|core| {
                    if core.epoch == epoch {
                        core.state.flow_state = FlowState::RequestError {
                            message: error.to_string(),
                        };
                    }
                    core.fail(error)
                });
            }
        };
        credentials.retain(Credential::is_liveness_derived);
        let status = if credentials.is_empty() {
            log::info!("liveness check for request {request_id} produced no credential");
            ResponseStatus::Rejected
        } else {
            ResponseStatus::Accepted
        };

        let message = OutboundMessage::CredentialResponse {
            request_id: request.id,
            to: request.from,
            status,
            credentials,
        };
        self.inner.send_response(epoch, status, message).await
    }

    /// Answers the current document-signing (verification) request.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::NoIncomingRequest`] or
    /// [`SessionKitError::RequestSuperseded`] if `request_id` is not the
    /// current verification request, and [`SessionKitError::Send`] if the
    /// response is not acknowledged.
    #[allow(clippy::needless_pass_by_value)]
    pub async fn send_doc_sign_response(
        &self,
        request_id: String,
        status: ResponseStatus,
    ) -> Result<ResponseStatus, SessionKitError> {
        let (request, epoch) = self.inner.update(|core| {
            core.check(Action::Respond)?;
            let request = take_current(
                &mut core.state.verification_request,
                &request_id,
                "verification_request",
                |request| &request.id,
            )?;
            Ok::<_, SessionKitError>((request, core.epoch))
        })?;

        let message = OutboundMessage::VerificationResponse {
            request_id: request.id,
            to: request.from,
            status,
        };
        self.inner.send_response(epoch, status, message).await
    }

    /// Answers the current signing request.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::NoIncomingRequest`] or
    /// [`SessionKitError::RequestSuperseded`] if `request_id` is not the
    /// current signing request, and [`SessionKitError::Send`] if the
    /// response is not acknowledged.
    #[allow(clippy::needless_pass_by_value)]
    pub async fn respond_to_signing_request(
        &self,
        request_id: String,
        status: ResponseStatus,
    ) -> Result<ResponseStatus, SessionKitError> {
        let (request, epoch) = self.inner.update(|core| {
            core.check(Action::Respond)?;
            let request = take_current(
                &mut core.state.signing_request,
                &request_id,
                "signing_request",
                |request| &request.id,
            )?;
            Ok::<_, SessionKitError>((request, core.epoch))
        })?;

        let message = OutboundMessage::SigningResponse {
            request_id: request.id,
            to: request.from,
            status,
        };
        self.inner.send_response(epoch, status, message).await
    }

    /// Stores the credentials received in the current custom-credential
    /// flow and returns how many were stored.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::NoIncomingRequest`] if no credentials were
    /// received, and [`SessionKitError::Sdk`] if the store fails.
    pub fn store_received_credentials(&self) -> Result<u32, SessionKitError> {
        let credentials = self.inner.update(|core| {
            core.check(Action::StoreCredentials)?;
            let Some(credentials) = core
                .current_received
                .take()
                .and_then(|id| core.received.remove(&id))
            else {
                return core.fail(SessionKitError::NoIncomingRequest {
                    kind: "credential_message".to_string(),
                });
            };
            Ok(credentials)
        })?;

        let count = u32::try_from(credentials.len()).unwrap_or(u32::MAX);
        if let Err(error) = self.inner.account.store_credentials(credentials) {
            return self.inner.update(|core| core.fail(error));
        }
        log::info!("stored {count} received credential(s)");
        Ok(count)
    }

    /// Returns to action selection: cancels the pending request without
    /// resolving it and clears incoming requests and received credentials.
    /// Completions of calls still in flight become no-ops.
    pub fn reset_flow(&self) {
        self.inner.update(SessionCore::reset_flow);
    }

    /// Produces an account backup.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::InvalidState`] unless registered, and
    /// [`SessionKitError::Backup`] if the SDK fails.
    pub async fn backup(&self) -> Result<Vec<u8>, SessionKitError> {
        self.inner.update(|core| {
            core.check(Action::Backup)?;
            core.state.flow = Some(Flow::Backup);
            core.state.backup_restore = BackupRestoreState::Processing;
            Ok::<_, SessionKitError>(())
        })?;

        let result = self.inner.account.backup().await;
        self.inner.update(|core| match result {
            Ok(backup) => {
                core.state.backup_restore = BackupRestoreState::Success;
                Ok(backup)
            }
            Err(error) => {
                core.state.backup_restore = BackupRestoreState::Error {
                    message: error.to_string(),
                };
                core.fail(error)
            }
        })
    }

    /// Restores the account from `backup`, verified by `selfie`, and returns
    /// the recovered credentials. On success the identity is registered.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::RestoreVerification`] if the identity could
    /// not be verified and [`SessionKitError::RestoreData`] if verification
    /// passed but the data could not be recovered.
    pub async fn restore(
        &self,
        backup: Vec<u8>,
        selfie: Vec<u8>,
    ) -> Result<Vec<Credential>, SessionKitError> {
        self.inner.update(|core| {
            core.check(Action::Restore)?;
            core.state.flow = Some(Flow::Restore);
            core.state.backup_restore = BackupRestoreState::Processing;
            core.state.registration = RegistrationState::Registering;
            Ok::<_, SessionKitError>(())
        })?;

        let result = self.inner.account.restore(backup, selfie).await;
        self.inner.update(|core| match result {
            Ok(credentials) => {
                log::info!("restored account with {} credential(s)", credentials.len());
                core.state.backup_restore = BackupRestoreState::Success;
                core.state.registration = RegistrationState::Registered;
                core.last_error = None;
                Ok(credentials)
            }
            Err(error) => {
                core.state.registration = RegistrationState::Unregistered;
                core.state.backup_restore = match &error {
                    SessionKitError::RestoreVerification { .. } => {
                        BackupRestoreState::VerificationFailed
                    }
                    SessionKitError::RestoreData { .. } => BackupRestoreState::DataRecoveryFailed,
                    other => BackupRestoreState::Error {
                        message: other.to_string(),
                    },
                };
                core.fail(error)
            }
        })
    }

    /// Runs the liveness check and restores with its selfie.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::RestoreVerification`] if the capture fails,
    /// otherwise as [`Self::restore`].
    pub async fn restore_with_liveness(
        &self,
        backup: Vec<u8>,
        capture: Arc<dyn LivenessCapture>,
    ) -> Result<Vec<Credential>, SessionKitError> {
        self.inner.update(|core| core.check(Action::Restore))?;
        let liveness = match capture.capture().await {
            Ok(liveness) => liveness,
            Err(e) => {
                return self.inner.update(|core| {
                    core.state.backup_restore = BackupRestoreState::VerificationFailed;
                    core.fail(SessionKitError::RestoreVerification {
                        reason: format!("liveness check failed: {e}"),
                    })
                });
            }
        };
        self.restore(backup, liveness.selfie).await
    }
}

impl Session {
    /// Watches state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Waits until the state satisfies `predicate` and returns that state.
    pub async fn wait_until(
        &self,
        predicate: impl FnMut(&SessionSnapshot) -> bool + Send,
    ) -> SessionSnapshot {
        let mut receiver = self.subscribe();
        let reached = receiver.wait_for(predicate).await.map(|state| state.clone());
        reached.unwrap_or_else(|_| self.snapshot())
    }

    /// The most recent error.
    #[must_use]
    pub fn last_error(&self) -> Option<SessionKitError> {
        self.inner.core().last_error.clone()
    }
}

/// Takes the current incoming request of one kind if it is `request_id`.
fn take_current<T>(
    slot: &mut Option<T>,
    request_id: &str,
    kind: &str,
    id_of: impl Fn(&T) -> &String,
) -> Result<T, SessionKitError> {
    let no_request = || SessionKitError::NoIncomingRequest {
        kind: kind.to_string(),
    };
    let current_id = slot.as_ref().map(|current| id_of(current).clone());
    match current_id {
        None => Err(no_request()),
        Some(id) if id != request_id => Err(SessionKitError::RequestSuperseded {
            request_id: request_id.to_string(),
        }),
        Some(_) => slot.take().ok_or_else(no_request),
    }
}
