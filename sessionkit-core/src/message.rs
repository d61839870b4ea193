//! Closed set of events delivered by the identity SDK and messages sent
//! through it.
//!
//! The SDK delivers payloads through four subscription classes (status,
//! message, request, response). Each payload is one [`SdkEvent`] variant;
//! anything this crate does not model arrives as [`SdkEvent::Unknown`] and
//! is logged and dropped by the dispatcher.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{ClaimConstraint, Credential, CredentialType, ResponseStatus};

/// The subscription class an event is delivered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, uniffi::Enum)]
#[strum(serialize_all = "lowercase")]
pub enum EventClass {
    /// SDK status changes.
    Status,
    /// Inbound messages (chat, credentials, receipts).
    Message,
    /// Inbound requests from a counterpart.
    Request,
    /// Inbound responses to requests this account sent.
    Response,
}

impl EventClass {
    /// All subscription classes, in subscription order.
    pub const ALL: [Self; 4] = [Self::Status, Self::Message, Self::Request, Self::Response];
}

/// A plain text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct ChatMessage {
    /// Message identifier.
    pub id: String,
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Text body.
    pub body: String,
}

/// Credentials delivered by a counterpart, e.g. custom credentials issued by
/// a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct CredentialMessage {
    /// Message identifier.
    pub id: String,
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Delivered credentials.
    pub credentials: Vec<Credential>,
}

/// A counterpart's ask for credentials satisfying a set of constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct CredentialRequest {
    /// Request identifier; responses refer to it.
    pub id: String,
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Constraints every shared credential must satisfy.
    pub constraints: Vec<ClaimConstraint>,
}

/// A counterpart's ask to verify (sign) a document or claim set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct VerificationRequest {
    /// Request identifier; responses refer to it.
    pub id: String,
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Credential types the verification covers.
    pub types: Vec<CredentialType>,
    /// Opaque request details, e.g. the agreement document.
    pub details: Vec<u8>,
}

impl VerificationRequest {
    /// Whether this is a document-signing request.
    #[must_use]
    pub fn is_agreement(&self) -> bool {
        self.types.contains(&CredentialType::Agreement)
    }
}

/// A counterpart's ask for a signature over opaque data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct SigningRequest {
    /// Request identifier; responses refer to it.
    pub id: String,
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Opaque signing details.
    pub details: Vec<u8>,
}

/// A counterpart's answer to a credential request this account sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct CredentialResponse {
    /// Identifier of the answered request.
    pub request_id: String,
    /// Sender address.
    pub from: String,
    /// Answer status.
    pub status: ResponseStatus,
    /// Presented credentials.
    pub credentials: Vec<Credential>,
}

/// Delivery receipt for a previously sent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct Receipt {
    /// Identifier of the acknowledged message.
    pub message_id: String,
    /// Address that acknowledged it.
    pub from: String,
}

/// An event delivered by the identity SDK.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum SdkEvent {
    /// SDK status change; `0` means ready.
    Status {
        /// Status code reported by the SDK.
        code: i64,
    },
    /// Plain text message.
    Chat {
        /// The message.
        message: ChatMessage,
    },
    /// Credentials delivered by a counterpart.
    CredentialMessage {
        /// The message.
        message: CredentialMessage,
    },
    /// Credential presentation request.
    CredentialRequest {
        /// The request.
        request: CredentialRequest,
    },
    /// Verification (document signing) request.
    VerificationRequest {
        /// The request.
        request: VerificationRequest,
    },
    /// Signing request.
    SigningRequest {
        /// The request.
        request: SigningRequest,
    },
    /// Response to a credential request this account sent.
    CredentialResponse {
        /// The response.
        response: CredentialResponse,
    },
    /// Delivery receipt.
    Receipt {
        /// The receipt.
        receipt: Receipt,
    },
    /// A payload type this crate does not model.
    Unknown {
        /// Type name reported by the SDK.
        type_name: String,
    },
}

impl SdkEvent {
    /// The subscription class this event is delivered through.
    #[must_use]
    pub const fn class(&self) -> EventClass {
        match self {
            Self::Status { .. } => EventClass::Status,
            Self::Chat { .. }
            | Self::CredentialMessage { .. }
            | Self::Receipt { .. }
            | Self::Unknown { .. } => EventClass::Message,
            Self::CredentialRequest { .. }
            | Self::VerificationRequest { .. }
            | Self::SigningRequest { .. } => EventClass::Request,
            Self::CredentialResponse { .. } => EventClass::Response,
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Status { .. } => "status",
            Self::Chat { .. } => "chat_message",
            Self::CredentialMessage { .. } => "credential_message",
            Self::CredentialRequest { .. } => "credential_request",
            Self::VerificationRequest { .. } => "verification_request",
            Self::SigningRequest { .. } => "signing_request",
            Self::CredentialResponse { .. } => "credential_response",
            Self::Receipt { .. } => "receipt",
            Self::Unknown { type_name } => type_name,
        }
    }
}

/// A request received from a counterpart, held until answered or superseded.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum IncomingRequest {
    /// Credential presentation request.
    Credential {
        /// The request.
        request: CredentialRequest,
    },
    /// Verification (document signing) request.
    Verification {
        /// The request.
        request: VerificationRequest,
    },
    /// Signing request.
    Signing {
        /// The request.
        request: SigningRequest,
    },
}

impl IncomingRequest {
    /// Identifier responses refer to.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Credential { request } => &request.id,
            Self::Verification { request } => &request.id,
            Self::Signing { request } => &request.id,
        }
    }
}

/// A message this account sends through the SDK.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum OutboundMessage {
    /// Plain text message.
    Chat {
        /// Recipient address.
        to: String,
        /// Text body.
        body: String,
    },
    /// Answer to a [`CredentialRequest`].
    CredentialResponse {
        /// Identifier of the answered request.
        request_id: String,
        /// Recipient address.
        to: String,
        /// Answer status.
        status: ResponseStatus,
        /// Shared credentials; empty when rejected.
        credentials: Vec<Credential>,
    },
    /// Answer to a [`VerificationRequest`].
    VerificationResponse {
        /// Identifier of the answered request.
        request_id: String,
        /// Recipient address.
        to: String,
        /// Answer status.
        status: ResponseStatus,
    },
    /// Answer to a [`SigningRequest`].
    SigningResponse {
        /// Identifier of the answered request.
        request_id: String,
        /// Recipient address.
        to: String,
        /// Answer status.
        status: ResponseStatus,
    },
}

impl OutboundMessage {
    /// Recipient address.
    #[must_use]
    pub fn recipient(&self) -> &str {
        match self {
            Self::Chat { to, .. }
            | Self::CredentialResponse { to, .. }
            | Self::VerificationResponse { to, .. }
            | Self::SigningResponse { to, .. } => to,
        }
    }
}
