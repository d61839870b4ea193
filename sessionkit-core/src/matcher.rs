use crate::{error::SessionKitError, AccountFacade, ClaimConstraint, Credential};

/// Selects stored credentials satisfying a request's claim constraints.
///
/// The comparison operator of each constraint is evaluated by the SDK
/// lookup. The matcher then keeps only credentials that, for every
/// constraint, carry a claim with exactly that subject and all of its types.
/// Lookups never write to the credential store.
pub struct CredentialMatcher<'a> {
    account: &'a AccountFacade,
}

impl<'a> CredentialMatcher<'a> {
    /// Creates a matcher over the account's credential store.
    #[must_use]
    pub const fn new(account: &'a AccountFacade) -> Self {
        Self { account }
    }

    /// Returns the matching credentials. An empty result is a valid
    /// "nothing to share" outcome, and so is an empty constraint list.
    ///
    /// # Errors
    ///
    /// Returns [`SessionKitError::Sdk`] if the lookup fails.
    pub fn select(
        &self,
        constraints: &[ClaimConstraint],
    ) -> Result<Vec<Credential>, SessionKitError> {
        if constraints.is_empty() {
            return Ok(Vec::new());
        }
        let mut candidates = self.account.look_up_credentials(constraints.to_vec())?;
        candidates.retain(|credential| {
            constraints
                .iter()
                .all(|constraint| satisfies(credential, constraint))
        });
        log::debug!(
            "{} credential(s) match {} constraint(s)",
            candidates.len(),
            constraints.len()
        );
        Ok(candidates)
    }
}

fn satisfies(credential: &Credential, constraint: &ClaimConstraint) -> bool {
    credential.claims.iter().any(|claim| {
        claim.subject == constraint.subject
            && constraint
                .types
                .iter()
                .all(|required| claim.types.contains(required))
    })
}
