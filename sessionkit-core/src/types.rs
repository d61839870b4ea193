//! Plain data records exchanged with the identity SDK and the host UI.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{ComparisonOperator, CredentialType};

/// A single typed claim carried by a [`Credential`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct Claim {
    /// Types this claim attests, e.g. `[Liveness, Verifiable]`.
    pub types: Vec<CredentialType>,
    /// The claim subject, e.g. `emailAddress`.
    pub subject: String,
    /// Claim value as issued.
    pub value: String,
}

/// A claim requirement declared by a counterpart's request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct ClaimConstraint {
    /// Types a matching claim must carry.
    pub types: Vec<CredentialType>,
    /// Subject a matching claim must have.
    pub subject: String,
    /// Comparison the SDK evaluates against `value`.
    pub operator: ComparisonOperator,
    /// Right-hand side of the comparison.
    pub value: String,
}

impl ClaimConstraint {
    /// A constraint that only requires a claim of the given types and subject
    /// to exist.
    #[must_use]
    pub fn exists(types: Vec<CredentialType>, subject: impl Into<String>) -> Self {
        Self {
            types,
            subject: subject.into(),
            operator: ComparisonOperator::NotEquals,
            value: String::new(),
        }
    }
}

/// An SDK-issued claim bundle.
///
/// Opaque to the session layer apart from its claims; it is never mutated
/// locally, only looked up and forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct Credential {
    /// Issuer-assigned identifier.
    pub id: String,
    /// Address of the issuing authority.
    pub issuer: String,
    /// Claims carried by this credential.
    pub claims: Vec<Claim>,
    /// Signed payload, opaque to this crate.
    pub payload: Vec<u8>,
}

impl Credential {
    /// Whether any claim comes from the liveness check.
    #[must_use]
    pub fn is_liveness_derived(&self) -> bool {
        self.claims
            .iter()
            .flat_map(|claim| &claim.types)
            .any(CredentialType::is_liveness_derived)
    }
}

/// Status attached to a response sent to a counterpart.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Display,
    EnumString,
    Serialize,
    Deserialize,
    uniffi::Enum,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// The request was granted.
    Accepted,
    /// The request was declined, or nothing matched.
    Rejected,
}

/// Discovery payload decoded from a server's QR code.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct DiscoveryData {
    /// Inbox address of the server.
    pub address: String,
    /// Whether the server runs against the sandbox environment.
    pub sandbox: bool,
}

/// Output of the liveness capture flow.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct LivenessResult {
    /// Captured selfie image.
    pub selfie: Vec<u8>,
    /// Credentials derived from the liveness check.
    pub credentials: Vec<Credential>,
}

/// Local identity details.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct IdentityInfo {
    /// Directory holding the account storage.
    pub storage_path: String,
    /// Whether the account has been registered.
    pub registered: bool,
    /// Network address of the account; empty until initialized.
    pub address: String,
}

/// Acknowledgement reported by the SDK for an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct SendAck {
    /// Identifier assigned to the sent message.
    pub message_id: String,
    /// Delivery error, if any.
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_derived_credential() {
        let mut credential = Credential {
            id: "c1".to_string(),
            issuer: "issuer".to_string(),
            claims: vec![Claim {
                types: vec![CredentialType::Email, CredentialType::Verifiable],
                subject: "emailAddress".to_string(),
                value: "ada@example.com".to_string(),
            }],
            payload: vec![],
        };
        assert!(!credential.is_liveness_derived());

        credential.claims.push(Claim {
            types: vec![CredentialType::Liveness],
            subject: "sourceImageHash".to_string(),
            value: "f00d".to_string(),
        });
        assert!(credential.is_liveness_derived());
    }

    #[test]
    fn test_credential_json_shape() {
        let credential = Credential {
            id: "c1".to_string(),
            issuer: "issuer".to_string(),
            claims: vec![Claim {
                types: vec![CredentialType::Liveness, CredentialType::Verifiable],
                subject: "sourceImageHash".to_string(),
                value: "abc".to_string(),
            }],
            payload: vec![1, 2],
        };
        let json = serde_json::to_value(&credential).unwrap();
        assert_eq!(json["claims"][0]["types"][0], "liveness");
        let back: Credential = serde_json::from_value(json).unwrap();
        assert_eq!(back, credential);
    }

    #[test]
    fn test_exists_constraint() {
        let constraint = ClaimConstraint::exists(vec![CredentialType::Email], "emailAddress");
        assert_eq!(constraint.operator, ComparisonOperator::NotEquals);
        assert!(constraint.value.is_empty());
    }
}
