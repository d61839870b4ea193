//! Integration tests for session orchestration.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sessionkit_core::preferences::{FilePreferences, MemoryPreferences};
use sessionkit_core::sdk::memory::MemoryIdentitySdk;
use sessionkit_core::{
    Action, BackupRestoreState, ClaimConstraint, ConnectionState, CredentialMessage,
    CredentialType, Environment, Flow, FlowState, IdentitySdk, LivenessResult, OutboundMessage,
    PreferencesError, PreferencesStore, RegistrationState, RequestKind, ResponseStatus, SdkEvent,
    ServerRequest, SessionKitError, VerificationRequest,
};

#[tokio::test]
async fn test_second_request_fails_fast_while_first_is_pending() {
    let (sdk, session) = common::connected_session().await;

    let first = session
        .notify_server_for_request(ServerRequest::Auth)
        .await
        .expect("first request");
    assert_eq!(first.kind, RequestKind::Auth);

    let err = session
        .notify_server_for_request(ServerRequest::ShareEmail)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SessionKitError::AlreadyPending {
            kind: RequestKind::Auth
        }
    );

    // Only the first chat went out.
    assert_eq!(sdk.sent().len(), 1);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.flow, Some(Flow::Authentication));
    assert_eq!(
        snapshot.pending.map(|pending| pending.correlation_id),
        Some(first.correlation_id)
    );
}

#[tokio::test(start_paused = true)]
async fn test_auth_request_times_out_after_twenty_seconds() {
    let (_sdk, session) = common::connected_session().await;
    session
        .notify_server_for_request(ServerRequest::Auth)
        .await
        .expect("notify");

    tokio::time::sleep(Duration::from_secs(19)).await;
    assert_eq!(
        session.snapshot().flow_state,
        FlowState::RequestSent {
            kind: RequestKind::Auth
        }
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    let snapshot = session.snapshot();
    assert_eq!(
        snapshot.flow_state,
        FlowState::RequestError {
            message: "request timed out".to_string()
        }
    );
    assert!(snapshot.pending.is_none());
    assert_eq!(
        session.last_error(),
        Some(SessionKitError::RequestTimeout {
            kind: RequestKind::Auth
        })
    );

    // No automatic resend; the user restarts the flow.
    session.reset_flow();
    assert!(session
        .notify_server_for_request(ServerRequest::Auth)
        .await
        .is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_resolution_after_cancel_is_a_noop() {
    let (sdk, session) = common::connected_session().await;
    session
        .notify_server_for_request(ServerRequest::ShareEmail)
        .await
        .expect("notify");

    session.reset_flow();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(session.snapshot().flow_state, FlowState::None);
    assert!(session.last_error().is_none());

    // A late answer is still captured, but there is nothing to resolve.
    sdk.emit(common::credential_request("late", vec![]));
    let snapshot = session.snapshot();
    assert!(snapshot.pending.is_none());
    assert!(snapshot.credential_request.is_some());
}

#[tokio::test]
async fn test_share_with_no_match_sends_empty_rejection() {
    let (sdk, session) = common::connected_session().await;
    sdk.set_send_hook(Arc::new(|message: &OutboundMessage| match message {
        OutboundMessage::Chat { body, .. } if body == "PROVIDE_CREDENTIAL_EMAIL" => {
            vec![common::credential_request(
                "share-1",
                vec![ClaimConstraint::exists(
                    vec![CredentialType::Email],
                    "emailAddress",
                )],
            )]
        }
        _ => vec![],
    }));

    session
        .notify_server_for_request(ServerRequest::ShareEmail)
        .await
        .expect("notify");
    let snapshot = session.snapshot();
    assert!(snapshot.pending.is_none());
    assert_eq!(
        snapshot.flow_state,
        FlowState::RequestReceived {
            request_id: "share-1".to_string()
        }
    );

    let status = session
        .share_credentials("share-1".to_string(), ResponseStatus::Accepted)
        .await
        .expect("share");
    assert_eq!(status, ResponseStatus::Rejected);

    match sdk.sent().last() {
        Some(OutboundMessage::CredentialResponse {
            request_id,
            to,
            status,
            credentials,
        }) => {
            assert_eq!(request_id, "share-1");
            assert_eq!(to, common::SERVER);
            assert_eq!(*status, ResponseStatus::Rejected);
            assert!(credentials.is_empty());
        }
        other => panic!("unexpected message {other:?}"),
    }
    assert_eq!(
        session.snapshot().flow_state,
        FlowState::ResponseSent {
            status: ResponseStatus::Rejected
        }
    );
}

#[tokio::test]
async fn test_share_sends_matching_credentials() {
    let (sdk, session) = common::connected_session().await;
    sdk.store_credentials(vec![common::email_credential("ada@example.com")])
        .expect("store");
    sdk.emit(common::credential_request(
        "share-2",
        vec![ClaimConstraint::exists(
            vec![CredentialType::Email],
            "emailAddress",
        )],
    ));

    let status = session
        .share_credentials("share-2".to_string(), ResponseStatus::Accepted)
        .await
        .expect("share");
    assert_eq!(status, ResponseStatus::Accepted);
    assert!(matches!(
        sdk.sent().last(),
        Some(OutboundMessage::CredentialResponse { credentials, .. })
            if credentials == &vec![common::email_credential("ada@example.com")]
    ));
}

#[tokio::test]
async fn test_superseded_request_cannot_be_answered() {
    let (sdk, session) = common::connected_session().await;
    sdk.emit(common::credential_request("first", vec![]));
    sdk.emit(common::credential_request("second", vec![]));

    let err = session
        .share_credentials("first".to_string(), ResponseStatus::Accepted)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SessionKitError::RequestSuperseded {
            request_id: "first".to_string()
        }
    );
    assert!(session
        .share_credentials("second".to_string(), ResponseStatus::Rejected)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_document_signing_flow() {
    let (sdk, session) = common::connected_session().await;
    let address = sdk.address();
    sdk.set_send_hook(Arc::new(move |message: &OutboundMessage| match message {
        OutboundMessage::Chat { body, .. } if body == "REQUEST_DOCUMENT_SIGNING" => {
            vec![SdkEvent::VerificationRequest {
                request: VerificationRequest {
                    id: "agreement-1".to_string(),
                    from: common::SERVER.to_string(),
                    to: address.clone(),
                    types: vec![CredentialType::Agreement],
                    details: b"terms and conditions".to_vec(),
                },
            }]
        }
        _ => vec![],
    }));

    session
        .notify_server_for_request(ServerRequest::DocumentSigning)
        .await
        .expect("notify");
    assert_eq!(
        session
            .snapshot()
            .verification_request
            .map(|request| request.id),
        Some("agreement-1".to_string())
    );

    session
        .send_doc_sign_response("agreement-1".to_string(), ResponseStatus::Accepted)
        .await
        .expect("respond");
    assert!(matches!(
        sdk.sent().last(),
        Some(OutboundMessage::VerificationResponse {
            status: ResponseStatus::Accepted,
            ..
        })
    ));
}

#[tokio::test]
async fn test_custom_credentials_are_buffered_per_request() {
    let (sdk, session) = common::connected_session().await;

    // Nothing is waiting for credentials yet: dropped.
    sdk.emit(SdkEvent::CredentialMessage {
        message: CredentialMessage {
            id: "unsolicited".to_string(),
            from: common::SERVER.to_string(),
            to: sdk.address(),
            credentials: vec![common::email_credential("spam@example.com")],
        },
    });
    assert_eq!(session.snapshot().received_credentials, 0);

    let address = sdk.address();
    sdk.set_send_hook(Arc::new(move |message: &OutboundMessage| match message {
        OutboundMessage::Chat { body, .. } if body == "REQUEST_GET_CUSTOM_CREDENTIAL" => {
            vec![SdkEvent::CredentialMessage {
                message: CredentialMessage {
                    id: "issued-1".to_string(),
                    from: common::SERVER.to_string(),
                    to: address.clone(),
                    credentials: vec![common::email_credential("custom@example.com")],
                },
            }]
        }
        _ => vec![],
    }));
    session
        .notify_server_for_request(ServerRequest::GetCustomCredential)
        .await
        .expect("notify");

    let snapshot = session.snapshot();
    assert!(snapshot.pending.is_none());
    assert_eq!(snapshot.received_credentials, 1);
    assert_eq!(session.received_credentials().len(), 1);

    assert_eq!(session.store_received_credentials().expect("store"), 1);
    assert!(sdk
        .stored_credentials()
        .contains(&common::email_credential("custom@example.com")));
    assert!(!sdk
        .stored_credentials()
        .contains(&common::email_credential("spam@example.com")));

    let err = session.store_received_credentials().unwrap_err();
    assert!(matches!(err, SessionKitError::NoIncomingRequest { .. }));
}

#[tokio::test]
async fn test_connect_with_empty_address_stays_disconnected() {
    let sdk = Arc::new(MemoryIdentitySdk::new());
    let session = common::session_with(sdk, Arc::new(MemoryPreferences::new()));
    session.initialize().await.expect("initialize");
    session
        .register(common::SELFIE.to_vec(), vec![common::liveness_credential()])
        .await
        .expect("register");

    let err = session
        .connect(String::new(), HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionKitError::Connection { .. }));
    assert_eq!(session.snapshot().connection, ConnectionState::Disconnected);
    assert!(session.can(Action::Connect));
}

#[tokio::test]
async fn test_connect_with_qr_checks_environment() {
    let sdk = Arc::new(MemoryIdentitySdk::new());
    let session = common::session_with(sdk, Arc::new(MemoryPreferences::new()));
    session.initialize().await.expect("initialize");
    session
        .register(common::SELFIE.to_vec(), vec![common::liveness_credential()])
        .await
        .expect("register");

    let production = MemoryIdentitySdk::discovery_qr(common::SERVER, false);
    let err = session.connect_with_qr(production).await.unwrap_err();
    assert!(matches!(err, SessionKitError::Connection { .. }));
    assert_eq!(session.snapshot().connection, ConnectionState::Disconnected);

    let sandbox = MemoryIdentitySdk::discovery_qr(common::SERVER, true);
    let group = session.connect_with_qr(sandbox).await.expect("connect");
    assert_eq!(
        session.snapshot().connection,
        ConnectionState::Connected {
            peer_address: common::SERVER.to_string(),
            group_address: group,
        }
    );
}

#[tokio::test]
async fn test_server_preference_survives_sessions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("preferences.json");

    let sdk = Arc::new(MemoryIdentitySdk::new());
    let session = common::session_with(
        sdk.clone(),
        Arc::new(FilePreferences::new(&path).expect("prefs")),
    );
    session.initialize().await.expect("initialize");
    session
        .register(common::SELFIE.to_vec(), vec![common::liveness_credential()])
        .await
        .expect("register");
    session
        .connect(common::SERVER.to_string(), HashMap::new())
        .await
        .expect("connect");

    let reopened = common::session_with(
        sdk,
        Arc::new(FilePreferences::new(&path).expect("prefs")),
    );
    assert_eq!(
        reopened.last_server_address().expect("read"),
        Some(common::SERVER.to_string())
    );

    session.disconnect().expect("disconnect");
    assert_eq!(reopened.last_server_address().expect("read"), None);
}

#[tokio::test]
async fn test_backup_then_restore_registers_new_identity() {
    let (_sdk, session) = common::connected_session().await;
    let backup = session.backup().await.expect("backup");
    assert_eq!(session.snapshot().backup_restore, BackupRestoreState::Success);

    let fresh = Arc::new(MemoryIdentitySdk::new());
    let restored = common::session_with(fresh, Arc::new(MemoryPreferences::new()));
    restored.initialize().await.expect("initialize");
    assert!(restored.can(Action::Restore));

    let credentials = restored
        .restore(backup, common::SELFIE.to_vec())
        .await
        .expect("restore");
    assert!(!credentials.is_empty());

    let snapshot = restored.snapshot();
    assert_eq!(snapshot.registration, RegistrationState::Registered);
    assert_eq!(snapshot.backup_restore, BackupRestoreState::Success);
    assert!(restored.can(Action::Connect));
    assert!(restored.identity().registered);
}

#[tokio::test]
async fn test_restore_failures_are_distinct() {
    let (_sdk, session) = common::connected_session().await;
    let backup = session.backup().await.expect("backup");

    let restored =
        common::session_with(Arc::new(MemoryIdentitySdk::new()), Arc::new(MemoryPreferences::new()));
    restored.initialize().await.expect("initialize");

    let err = restored
        .restore(backup, b"someone else".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionKitError::RestoreVerification { .. }));
    let snapshot = restored.snapshot();
    assert_eq!(snapshot.backup_restore, BackupRestoreState::VerificationFailed);
    assert_eq!(snapshot.registration, RegistrationState::Unregistered);

    let err = restored
        .restore(b"{\"selfie\":[],\"data\":\"\"}".to_vec(), common::SELFIE.to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionKitError::RestoreVerification { .. }));

    let corrupt = serde_json::json!({
        "selfie": common::SELFIE,
        "data": "not credentials",
    });
    let err = restored
        .restore(corrupt.to_string().into_bytes(), common::SELFIE.to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionKitError::RestoreData { .. }));
    assert_eq!(
        restored.snapshot().backup_restore,
        BackupRestoreState::DataRecoveryFailed
    );
}

#[tokio::test]
async fn test_liveness_gated_registration_and_restore() {
    let sdk = Arc::new(MemoryIdentitySdk::new());
    let session = common::session_with(sdk, Arc::new(MemoryPreferences::new()));
    session.initialize().await.expect("initialize");

    let cancelled = Arc::new(common::StaticLiveness { result: None });
    let err = session
        .register_with_liveness(cancelled.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionKitError::Registration { .. }));
    assert_eq!(
        session.snapshot().registration,
        RegistrationState::Unregistered
    );

    let capture = Arc::new(common::StaticLiveness {
        result: Some(LivenessResult {
            selfie: common::SELFIE.to_vec(),
            credentials: vec![common::liveness_credential()],
        }),
    });
    session
        .register_with_liveness(capture.clone())
        .await
        .expect("register");
    let backup = session.backup().await.expect("backup");

    let restored =
        common::session_with(Arc::new(MemoryIdentitySdk::new()), Arc::new(MemoryPreferences::new()));
    restored.initialize().await.expect("initialize");
    let err = restored
        .restore_with_liveness(backup.clone(), cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionKitError::RestoreVerification { .. }));

    let credentials = restored
        .restore_with_liveness(backup, capture)
        .await
        .expect("restore");
    assert_eq!(credentials, vec![common::liveness_credential()]);
}

#[tokio::test(start_paused = true)]
async fn test_late_request_does_not_revive_timed_out_flow() {
    let (sdk, session) = common::connected_session().await;
    session
        .notify_server_for_request(ServerRequest::Auth)
        .await
        .expect("notify");
    tokio::time::sleep(Duration::from_secs(21)).await;

    sdk.emit(common::credential_request("late", vec![]));
    let err = session
        .share_credentials("late".to_string(), ResponseStatus::Accepted)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionKitError::InvalidState {
            action: Action::Respond,
            ..
        }
    ));
    assert_eq!(
        session.snapshot().flow_state,
        FlowState::RequestError {
            message: "request timed out".to_string()
        }
    );
    // Only the chat went out.
    assert_eq!(sdk.sent().len(), 1);

    session.reset_flow();
    assert!(session.snapshot().credential_request.is_none());
    assert!(session.can(Action::Respond));
}

#[tokio::test]
async fn test_respond_with_liveness_shares_fresh_credentials() {
    let (sdk, session) = common::connected_session().await;
    sdk.emit(common::credential_request(
        "auth",
        vec![ClaimConstraint::exists(
            vec![CredentialType::Liveness],
            "sourceImageHash",
        )],
    ));

    let capture = Arc::new(common::StaticLiveness {
        result: Some(LivenessResult {
            selfie: common::SELFIE.to_vec(),
            credentials: vec![
                common::liveness_credential(),
                common::email_credential("ada@example.com"),
            ],
        }),
    });
    let status = session
        .respond_with_liveness("auth".to_string(), capture)
        .await
        .expect("respond");
    assert_eq!(status, ResponseStatus::Accepted);

    match sdk.sent().last() {
        Some(OutboundMessage::CredentialResponse {
            request_id,
            to,
            status,
            credentials,
        }) => {
            assert_eq!(request_id, "auth");
            assert_eq!(to, common::SERVER);
            assert_eq!(*status, ResponseStatus::Accepted);
            assert_eq!(credentials, &vec![common::liveness_credential()]);
        }
        other => panic!("unexpected message {other:?}"),
    }
    assert_eq!(
        session.snapshot().flow_state,
        FlowState::ResponseSent {
            status: ResponseStatus::Accepted
        }
    );
}

#[tokio::test]
async fn test_failed_liveness_capture_fails_the_flow() {
    let (sdk, session) = common::connected_session().await;
    sdk.emit(common::credential_request("auth", vec![]));

    let cancelled = Arc::new(common::StaticLiveness { result: None });
    let err = session
        .respond_with_liveness("auth".to_string(), cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionKitError::Sdk { .. }));
    assert!(sdk.sent().is_empty());
    assert!(matches!(
        session.snapshot().flow_state,
        FlowState::RequestError { .. }
    ));
    assert_eq!(session.last_error(), Some(err));

    let err = session
        .respond_with_liveness("auth".to_string(), Arc::new(common::StaticLiveness { result: None }))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionKitError::InvalidState { .. }));
}

#[tokio::test]
async fn test_lookup_failure_fails_the_flow() {
    let (sdk, session) = common::connected_session().await;
    sdk.emit(common::credential_request(
        "share-3",
        vec![ClaimConstraint::exists(
            vec![CredentialType::Email],
            "emailAddress",
        )],
    ));
    sdk.set_lookup_error(Some("store locked".to_string()));

    let err = session
        .share_credentials("share-3".to_string(), ResponseStatus::Accepted)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionKitError::Sdk { .. }));
    assert!(sdk.sent().is_empty());
    assert!(matches!(
        session.snapshot().flow_state,
        FlowState::RequestError { .. }
    ));
}

#[tokio::test]
async fn test_resume_connection_reconnects_to_last_server() {
    let preferences = Arc::new(MemoryPreferences::new());
    let sdk = Arc::new(MemoryIdentitySdk::new());
    let session = common::session_with(sdk.clone(), preferences.clone());
    session.initialize().await.expect("initialize");
    session
        .register(common::SELFIE.to_vec(), vec![common::liveness_credential()])
        .await
        .expect("register");
    assert_eq!(session.resume_connection().await.expect("resume"), None);
    assert_eq!(session.snapshot().connection, ConnectionState::Disconnected);
    session
        .connect(common::SERVER.to_string(), HashMap::new())
        .await
        .expect("connect");

    let reopened = common::session_with(sdk, preferences);
    assert_eq!(reopened.config().environment, Environment::Sandbox);
    reopened.initialize().await.expect("initialize");
    let group = reopened
        .resume_connection()
        .await
        .expect("resume")
        .expect("a server to resume");
    assert_eq!(
        reopened.snapshot().connection,
        ConnectionState::Connected {
            peer_address: common::SERVER.to_string(),
            group_address: group,
        }
    );
}

#[tokio::test]
async fn test_resume_connection_clears_flag_without_address() {
    let preferences = Arc::new(MemoryPreferences::new());
    preferences
        .set("server_connected".to_string(), "true".to_string())
        .expect("seed flag");
    let session = common::session_with(Arc::new(MemoryIdentitySdk::new()), preferences.clone());
    session.initialize().await.expect("initialize");
    session
        .register(common::SELFIE.to_vec(), vec![common::liveness_credential()])
        .await
        .expect("register");

    assert_eq!(session.resume_connection().await.expect("resume"), None);
    assert_eq!(session.snapshot().connection, ConnectionState::Disconnected);
    assert_eq!(
        preferences.get("server_connected".to_string()).expect("read"),
        None
    );
}

struct ReadOnlyPreferences;

impl PreferencesStore for ReadOnlyPreferences {
    fn get(&self, _key: String) -> Result<Option<String>, PreferencesError> {
        Ok(None)
    }

    fn set(&self, key: String, _value: String) -> Result<(), PreferencesError> {
        Err(PreferencesError::Io(format!("{key} is read-only")))
    }

    fn remove(&self, _key: String) -> Result<(), PreferencesError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_failed_preference_write_is_reported() {
    let session = common::session_with(
        Arc::new(MemoryIdentitySdk::new()),
        Arc::new(ReadOnlyPreferences),
    );
    session.initialize().await.expect("initialize");
    session
        .register(common::SELFIE.to_vec(), vec![common::liveness_credential()])
        .await
        .expect("register");

    session
        .connect(common::SERVER.to_string(), HashMap::new())
        .await
        .expect("connect");
    assert!(session.snapshot().is_connected());
    assert!(matches!(
        session.last_error(),
        Some(SessionKitError::Preferences { .. })
    ));
    assert!(session.snapshot().last_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_reset_during_delayed_share_keeps_flow_cleared() {
    let (sdk, session) = common::connected_session().await;
    sdk.emit(common::credential_request("share-4", vec![]));
    sdk.set_send_delay(Some(Duration::from_secs(5)));

    let sharing = tokio::spawn({
        let session = session.clone();
        async move {
            session
                .share_credentials("share-4".to_string(), ResponseStatus::Rejected)
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    session.reset_flow();

    let status = sharing.await.expect("join").expect("share");
    assert_eq!(status, ResponseStatus::Rejected);
    assert_eq!(sdk.sent().len(), 1);
    assert_eq!(session.snapshot().flow_state, FlowState::None);
}

#[tokio::test(start_paused = true)]
async fn test_reset_during_failing_notify_keeps_flow_cleared() {
    let (sdk, session) = common::connected_session().await;
    sdk.set_send_delay(Some(Duration::from_secs(5)));
    sdk.set_ack_error(Some("relay offline".to_string()));

    let notifying = tokio::spawn({
        let session = session.clone();
        async move {
            session
                .notify_server_for_request(ServerRequest::ShareEmail)
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    session.reset_flow();

    let err = notifying.await.expect("join").unwrap_err();
    assert!(matches!(err, SessionKitError::Send { .. }));
    let snapshot = session.snapshot();
    assert_eq!(snapshot.flow_state, FlowState::None);
    assert!(snapshot.pending.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_watchers_follow_the_flow() {
    let (_sdk, session) = common::connected_session().await;
    let mut states = session.subscribe();

    session
        .notify_server_for_request(ServerRequest::Auth)
        .await
        .expect("notify");
    assert!(states.has_changed().expect("session alive"));
    assert_eq!(
        states.borrow_and_update().flow_state,
        FlowState::RequestSent {
            kind: RequestKind::Auth
        }
    );

    let failed = session
        .wait_until(|state| matches!(state.flow_state, FlowState::RequestError { .. }))
        .await;
    assert!(failed.pending.is_none());
    assert!(failed.last_error.is_some());
    assert!(states.has_changed().expect("session alive"));
}
