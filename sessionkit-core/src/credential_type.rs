use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A `CredentialType` tags a claim with the kind of fact it attests.
///
/// A claim may carry several types, e.g. a liveness claim is tagged both
/// `Liveness` and `Verifiable`. Request constraints match a claim when the
/// claim carries every type the constraint names.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumString,
    Hash,
    Display,
    Serialize,
    Deserialize,
    uniffi::Enum,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    /// Produced by a biometric liveness check.
    Liveness,
    /// Issued by a trusted authority and verifiable by any counterpart.
    Verifiable,
    /// An email address.
    Email,
    /// A government-issued document.
    Document,
    /// A signed agreement (document signing).
    Agreement,
    /// Application-level claim issued by a server.
    Application,
    /// Any other claim type.
    Custom,
}

impl CredentialType {
    /// Whether claims of this type are produced by the liveness check rather
    /// than issued by a counterpart.
    #[must_use]
    pub const fn is_liveness_derived(&self) -> bool {
        matches!(self, Self::Liveness)
    }
}

/// Comparison a counterpart asks the SDK to evaluate on a claim value.
///
/// The operator is only forwarded; matching on it is the SDK's job.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumString,
    Hash,
    Display,
    Serialize,
    Deserialize,
    uniffi::Enum,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    /// Claim value equals the constraint value.
    Equals,
    /// Claim value differs from the constraint value.
    NotEquals,
    /// Claim value is greater than the constraint value.
    GreaterThan,
    /// Claim value is greater than or equal to the constraint value.
    GreaterThanOrEquals,
    /// Claim value is less than the constraint value.
    LessThan,
    /// Claim value is less than or equal to the constraint value.
    LessThanOrEquals,
}
