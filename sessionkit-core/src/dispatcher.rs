use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::{
    CredentialMessage, CredentialResponse, EventClass, IdentitySdk, IncomingRequest, SdkEvent,
};

/// Typed handlers the dispatcher fans SDK events out to.
pub trait DispatchTarget: Send + Sync {
    /// SDK status change; `0` means ready.
    fn on_status(&self, code: i64);

    /// Credentials delivered by a counterpart.
    fn on_credential_message(&self, message: CredentialMessage);

    /// A credential, verification or signing request from a counterpart.
    fn on_incoming_request(&self, request: IncomingRequest);

    /// A counterpart's answer to a request this account sent.
    fn on_response(&self, response: CredentialResponse);
}

/// Routes SDK events to a [`DispatchTarget`].
///
/// The SDK delivers events on its own thread; the dispatcher only decodes
/// the payload type and hands it on. Targets serialize their own state.
/// Events whose type is not modeled are logged and dropped.
#[derive(uniffi::Object)]
pub struct ListenerDispatcher {
    target: Weak<dyn DispatchTarget>,
    attached: AtomicBool,
}

impl ListenerDispatcher {
    /// Creates a dispatcher for `target`. The dispatcher does not keep the
    /// target alive.
    #[must_use]
    pub fn new(target: Weak<dyn DispatchTarget>) -> Arc<Self> {
        Arc::new(Self {
            target,
            attached: AtomicBool::new(false),
        })
    }

    /// Subscribes this dispatcher to every event class of `sdk`.
    ///
    /// Only the first call subscribes; later calls return `false` and leave
    /// the subscriptions untouched.
    pub fn attach(self: &Arc<Self>, sdk: &dyn IdentitySdk) -> bool {
        if self.attached.swap(true, Ordering::SeqCst) {
            return false;
        }
        for class in EventClass::ALL {
            sdk.subscribe(class, Arc::clone(self));
        }
        true
    }
}

#[uniffi::export]
impl ListenerDispatcher {
    /// Delivers one SDK event.
    pub fn dispatch(&self, event: SdkEvent) {
        let Some(target) = self.target.upgrade() else {
            log::debug!("dropping {} event: session is gone", event.type_name());
            return;
        };

        match event {
            SdkEvent::Status { code } => target.on_status(code),
            SdkEvent::CredentialMessage { message } => target.on_credential_message(message),
            SdkEvent::CredentialRequest { request } => {
                target.on_incoming_request(IncomingRequest::Credential { request });
            }
            SdkEvent::VerificationRequest { request } => {
                target.on_incoming_request(IncomingRequest::Verification { request });
            }
            SdkEvent::SigningRequest { request } => {
                target.on_incoming_request(IncomingRequest::Signing { request });
            }
            SdkEvent::CredentialResponse { response } => target.on_response(response),
            SdkEvent::Chat { message } => {
                log::info!("chat message {} from {}", message.id, message.from);
            }
            SdkEvent::Receipt { receipt } => {
                log::debug!("receipt for message {}", receipt.message_id);
            }
            SdkEvent::Unknown { type_name } => {
                log::warn!("ignoring unrecognized {type_name} event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::sdk::memory::MemoryIdentitySdk;
    use crate::{ChatMessage, SigningRequest};

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl DispatchTarget for Recorder {
        fn on_status(&self, code: i64) {
            self.calls.lock().unwrap().push(format!("status:{code}"));
        }

        fn on_credential_message(&self, message: CredentialMessage) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("credentials:{}", message.id));
        }

        fn on_incoming_request(&self, request: IncomingRequest) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("request:{}", request.id()));
        }

        fn on_response(&self, response: CredentialResponse) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("response:{}", response.request_id));
        }
    }

    fn recorder() -> (Arc<Recorder>, Arc<ListenerDispatcher>) {
        let recorder = Arc::new(Recorder::default());
        let target: Arc<dyn DispatchTarget> = recorder.clone();
        let dispatcher = ListenerDispatcher::new(Arc::downgrade(&target));
        (recorder, dispatcher)
    }

    #[test]
    fn test_attach_is_idempotent() {
        let sdk = MemoryIdentitySdk::new();
        let (recorder, dispatcher) = recorder();
        assert!(dispatcher.attach(&sdk));
        assert!(!dispatcher.attach(&sdk));
        assert_eq!(sdk.subscription_count(), 4);

        assert!(sdk.emit(SdkEvent::Status { code: 0 }));
        assert_eq!(*recorder.calls.lock().unwrap(), vec!["status:0"]);
    }

    #[test]
    fn test_routes_by_payload_type() {
        let (recorder, dispatcher) = recorder();
        dispatcher.dispatch(SdkEvent::SigningRequest {
            request: SigningRequest {
                id: "s1".to_string(),
                from: "server".to_string(),
                to: "me".to_string(),
                details: vec![],
            },
        });
        dispatcher.dispatch(SdkEvent::Chat {
            message: ChatMessage {
                id: "m1".to_string(),
                from: "server".to_string(),
                to: "me".to_string(),
                body: "hello".to_string(),
            },
        });
        dispatcher.dispatch(SdkEvent::Unknown {
            type_name: "poll".to_string(),
        });
        assert_eq!(*recorder.calls.lock().unwrap(), vec!["request:s1"]);
    }

    #[test]
    fn test_dropped_target() {
        let (recorder, dispatcher) = recorder();
        drop(recorder);
        dispatcher.dispatch(SdkEvent::Status { code: 0 });
    }
}
