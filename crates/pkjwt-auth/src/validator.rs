//! Assertion validation orchestration.
//!
//! [`AssertionValidator`] chains the structural claim checks, key
//! resolution, signature verification, and the claims policy (including the
//! replay guard). Every failure collapses to `false` at
//! [`is_valid_assertion`](AssertionValidator::is_valid_assertion); the reason
//! is only logged.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::assertion::{AssertionClaims, SignedAssertion};
use crate::assertion::claims::names;
use crate::claims::{ClaimsEvaluator, RejectionReason};
use crate::keys::{ClientKeyRegistry, KeyLookup};
use crate::policy::ValidationPolicy;
use crate::replay::ReplayGuard;
use crate::verify::SignatureVerifier;

/// Validates parsed client assertions.
pub struct AssertionValidator {
    policy: Arc<ValidationPolicy>,
    keys: Arc<dyn ClientKeyRegistry>,
    verifier: SignatureVerifier,
    claims: ClaimsEvaluator,
}

impl AssertionValidator {
    /// Creates a validator.
    #[must_use]
    pub fn new(
        policy: Arc<ValidationPolicy>,
        keys: Arc<dyn ClientKeyRegistry>,
        replay_guard: Arc<dyn ReplayGuard>,
    ) -> Self {
        Self {
            verifier: SignatureVerifier::from_policy(&policy),
            claims: ClaimsEvaluator::new(policy.clone(), replay_guard),
            policy,
            keys,
        }
    }

    /// Returns the policy in use.
    #[must_use]
    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Runs the full validation chain at time `now` and returns the
    /// authenticated subject.
    ///
    /// Order: mandatory claims, subject, header algorithm, key resolution,
    /// signature, remaining claims, replay guard. A key registry error is
    /// treated as a missing key.
    ///
    /// # Errors
    ///
    /// Returns the [`RejectionReason`] of the first failing step.
    pub async fn validate(
        &self,
        assertion: &SignedAssertion,
        now: OffsetDateTime,
    ) -> Result<String, RejectionReason> {
        let claims = assertion.claims();
        self.claims.check_mandatory(claims)?;

        let subject = claims
            .subject()
            .ok_or_else(|| RejectionReason::missing(names::SUBJECT))?;
        let algorithm = self.verifier.header_algorithm(assertion)?;

        let lookup = KeyLookup {
            issuer: claims.issuer(),
            subject,
            key_id: assertion.header().kid.as_deref(),
            algorithm,
        };
        let key = match self.keys.resolve_verification_key(lookup).await {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(client_id = %subject, error = %e, "Client key lookup failed");
                None
            }
        };

        self.verifier.check(assertion, key.as_ref())?;
        self.claims.evaluate(claims, now).await
    }

    /// Returns `true` if the assertion passes every check. Never fails.
    pub async fn is_valid_assertion(&self, assertion: &SignedAssertion) -> bool {
        match self.validate(assertion, OffsetDateTime::now_utc()).await {
            Ok(subject) => {
                tracing::debug!(client_id = %subject, "Client assertion accepted");
                true
            }
            Err(reason) => {
                let claims = assertion.claims();
                tracing::debug!(
                    client_id = ?claims.subject(),
                    iss = ?claims.issuer(),
                    jti = ?claims.jwt_id(),
                    alg = %assertion.header().alg,
                    kid = ?assertion.header().kid,
                    reason = %reason,
                    code = reason.code(),
                    "Client assertion rejected"
                );
                if self.policy.log_sensitive_assertions() {
                    tracing::debug!(assertion = %assertion.compact(), "Rejected client assertion");
                }
                false
            }
        }
    }

    /// Returns the assertion's claim set.
    #[must_use]
    pub fn get_claim_set<'a>(&self, assertion: &'a SignedAssertion) -> &'a AssertionClaims {
        assertion.claims()
    }

    /// Returns the `sub` claim, which becomes the client identifier once the
    /// assertion has been validated.
    #[must_use]
    pub fn resolve_subject<'a>(&self, claims: &'a AssertionClaims) -> Option<&'a str> {
        claims.subject()
    }
}
