//! Simulated server for the in-memory SDK.
//!
//! Answers the chat bodies a session sends when it notifies the server, and
//! acknowledges every response with a receipt.

use std::sync::Arc;

use sessionkit_core::sdk::memory::SendHook;
use sessionkit_core::{
    Claim, ClaimConstraint, Credential, CredentialMessage, CredentialRequest, CredentialType,
    OutboundMessage, Receipt, SdkEvent, ServerRequest, SigningRequest, VerificationRequest,
};

/// Inbox address of the simulated server.
pub const SERVER_ADDRESS: &str = "demo-server-inbox";

/// Builds the send hook playing the server for the account at `account`.
pub fn server(account: String) -> SendHook {
    Arc::new(move |message: &OutboundMessage| answer(&account, message))
}

fn answer(account: &str, message: &OutboundMessage) -> Vec<SdkEvent> {
    let body = match message {
        OutboundMessage::Chat { body, .. } => body.as_str(),
        OutboundMessage::CredentialResponse { request_id, .. }
        | OutboundMessage::VerificationResponse { request_id, .. }
        | OutboundMessage::SigningResponse { request_id, .. } => {
            return vec![SdkEvent::Receipt {
                receipt: Receipt {
                    message_id: request_id.clone(),
                    from: SERVER_ADDRESS.to_string(),
                },
            }];
        }
    };

    let request_id = body.to_lowercase();
    let Ok(request) = body.parse::<ServerRequest>() else {
        tracing::warn!("server does not understand {body:?}");
        return Vec::new();
    };

    let event = match request {
        ServerRequest::Auth => credential_request(
            account,
            request_id,
            vec![ClaimConstraint::exists(
                vec![CredentialType::Liveness],
                "sourceImageHash",
            )],
        ),
        ServerRequest::ShareEmail => credential_request(
            account,
            request_id,
            vec![ClaimConstraint::exists(
                vec![CredentialType::Email],
                "emailAddress",
            )],
        ),
        ServerRequest::ShareDocument => credential_request(
            account,
            request_id,
            vec![ClaimConstraint::exists(
                vec![CredentialType::Document],
                "documentNumber",
            )],
        ),
        ServerRequest::ShareCustom => credential_request(
            account,
            request_id,
            vec![ClaimConstraint::exists(
                vec![CredentialType::Custom],
                "membership",
            )],
        ),
        ServerRequest::DocumentSigning => SdkEvent::VerificationRequest {
            request: VerificationRequest {
                id: request_id,
                from: SERVER_ADDRESS.to_string(),
                to: account.to_string(),
                types: vec![CredentialType::Agreement],
                details: b"I agree to the demo terms.".to_vec(),
            },
        },
        ServerRequest::GetCustomCredential => SdkEvent::CredentialMessage {
            message: CredentialMessage {
                id: request_id,
                from: SERVER_ADDRESS.to_string(),
                to: account.to_string(),
                credentials: vec![membership_credential()],
            },
        },
    };
    vec![event]
}

/// Signing requests are never solicited by a chat; the demo injects one.
pub fn signing_request(account: &str) -> SdkEvent {
    SdkEvent::SigningRequest {
        request: SigningRequest {
            id: "sign-1".to_string(),
            from: SERVER_ADDRESS.to_string(),
            to: account.to_string(),
            details: b"payload to sign".to_vec(),
        },
    }
}

fn credential_request(
    account: &str,
    request_id: String,
    constraints: Vec<ClaimConstraint>,
) -> SdkEvent {
    SdkEvent::CredentialRequest {
        request: CredentialRequest {
            id: request_id,
            from: SERVER_ADDRESS.to_string(),
            to: account.to_string(),
            constraints,
        },
    }
}

/// Liveness credential the demo account registers with.
pub fn liveness_credential() -> Credential {
    Credential {
        id: "demo-liveness".to_string(),
        issuer: "demo-liveness-issuer".to_string(),
        claims: vec![Claim {
            types: vec![CredentialType::Liveness, CredentialType::Verifiable],
            subject: "sourceImageHash".to_string(),
            value: "5e1f1e".to_string(),
        }],
        payload: b"liveness".to_vec(),
    }
}

/// Email credential preloaded into the demo SDK.
pub fn email_credential() -> Credential {
    Credential {
        id: "demo-email".to_string(),
        issuer: "demo-email-issuer".to_string(),
        claims: vec![Claim {
            types: vec![CredentialType::Email, CredentialType::Verifiable],
            subject: "emailAddress".to_string(),
            value: "demo@example.com".to_string(),
        }],
        payload: b"email".to_vec(),
    }
}

fn membership_credential() -> Credential {
    Credential {
        id: "demo-membership".to_string(),
        issuer: SERVER_ADDRESS.to_string(),
        claims: vec![Claim {
            types: vec![CredentialType::Custom, CredentialType::Verifiable],
            subject: "membership".to_string(),
            value: "gold".to_string(),
        }],
        payload: b"membership".to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_chat_is_ignored() {
        let message = OutboundMessage::Chat {
            to: "group".to_string(),
            body: "HELLO".to_string(),
        };
        assert!(answer("account-abc", &message).is_empty());
    }

    #[test]
    fn test_email_request_asks_for_email() {
        let message = OutboundMessage::Chat {
            to: "group".to_string(),
            body: ServerRequest::ShareEmail.as_message(),
        };
        let events = answer("account-abc", &message);
        let [SdkEvent::CredentialRequest { request }] = events.as_slice() else {
            panic!("expected a credential request, got {events:?}");
        };
        assert_eq!(request.from, SERVER_ADDRESS);
        assert_eq!(request.constraints[0].subject, "emailAddress");
    }

    #[test]
    fn test_responses_get_receipts() {
        let message = OutboundMessage::SigningResponse {
            request_id: "sign-1".to_string(),
            to: SERVER_ADDRESS.to_string(),
            status: sessionkit_core::ResponseStatus::Accepted,
        };
        assert!(matches!(
            answer("account-abc", &message).as_slice(),
            [SdkEvent::Receipt { .. }]
        ));
    }
}
