//! Claims policy evaluation.
//!
//! [`ClaimsEvaluator`] applies the [`ValidationPolicy`] to an assertion's
//! claim set. Checks run in a fixed order and stop at the first failure:
//!
//! 1. Mandatory claims (plus `jti` when reuse prevention is on)
//! 2. Issuer: configured value, or `iss == sub` when unconfigured
//! 3. Subject present and non-empty
//! 4. Audience contains the expected value
//! 5. `exp > now - skew`
//! 6. `nbf` / `iat` not in the future, and `iat` (or `nbf`) no older than
//!    the reject-before window
//! 7. Replay guard, only when reuse prevention is on
//!
//! The resulting [`RejectionReason`] is for diagnostics. It is never sent to
//! the client.

use std::sync::Arc;

use time::{OffsetDateTime, PrimitiveDateTime};

use crate::assertion::AssertionClaims;
use crate::assertion::claims::names;
use crate::policy::ValidationPolicy;
use crate::replay::{ReplayGuard, ReplayKey};

/// Why an assertion was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectionReason {
    /// A required claim is absent or empty.
    #[error("missing claim '{claim}'")]
    MissingClaim {
        /// The claim name.
        claim: String,
    },

    /// `iss` does not match the configured issuer or the subject.
    #[error("issuer mismatch")]
    IssuerMismatch,

    /// `aud` does not contain the expected audience.
    #[error("audience mismatch")]
    AudienceMismatch,

    /// `exp` has passed.
    #[error("assertion expired")]
    Expired,

    /// `nbf` or `iat` lies in the future.
    #[error("assertion not yet valid")]
    NotYetValid,

    /// The assertion was issued before the reject-before window.
    #[error("assertion issued too long ago")]
    ExceedsRejectBefore,

    /// The `jti` has already been consumed.
    #[error("assertion replayed")]
    Replayed,

    /// The assertion is structurally unusable.
    #[error("malformed assertion: {message}")]
    Malformed {
        /// What is wrong with it.
        message: String,
    },

    /// The header algorithm is not on the allow-list.
    #[error("unsupported algorithm '{alg}'")]
    UnsupportedAlgorithm {
        /// The header `alg`.
        alg: String,
    },

    /// No usable verification key is registered for the client.
    #[error("no verification key for client")]
    KeyNotFound,

    /// The signature does not verify.
    #[error("invalid signature")]
    InvalidSignature,

    /// The replay store failed, so first use could not be established.
    #[error("replay guard unavailable")]
    ReplayGuardUnavailable,
}

impl RejectionReason {
    /// Stable identifier for logs and audit records.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingClaim { .. } => "missing-claim",
            Self::IssuerMismatch => "issuer-mismatch",
            Self::AudienceMismatch => "audience-mismatch",
            Self::Expired => "expired",
            Self::NotYetValid => "not-yet-valid",
            Self::ExceedsRejectBefore => "exceeds-reject-before",
            Self::Replayed => "replayed",
            Self::Malformed { .. } => "malformed",
            Self::UnsupportedAlgorithm { .. } => "unsupported-algorithm",
            Self::KeyNotFound => "key-not-found",
            Self::InvalidSignature => "invalid-signature",
            Self::ReplayGuardUnavailable => "replay-guard-unavailable",
        }
    }

    pub(crate) fn missing(claim: &str) -> Self {
        Self::MissingClaim {
            claim: claim.to_string(),
        }
    }
}

/// Applies a [`ValidationPolicy`] to claim sets.
pub struct ClaimsEvaluator {
    policy: Arc<ValidationPolicy>,
    replay_guard: Arc<dyn ReplayGuard>,
}

impl ClaimsEvaluator {
    /// Creates an evaluator. `replay_guard` is only consulted when the
    /// policy prevents token reuse.
    #[must_use]
    pub fn new(policy: Arc<ValidationPolicy>, replay_guard: Arc<dyn ReplayGuard>) -> Self {
        Self {
            policy,
            replay_guard,
        }
    }

    /// Returns the policy in use.
    #[must_use]
    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Checks that every mandatory claim is present and non-empty.
    ///
    /// `jti` is mandatory whenever reuse prevention is on.
    ///
    /// # Errors
    ///
    /// Returns `RejectionReason::MissingClaim` naming the first absent claim.
    pub fn check_mandatory(&self, claims: &AssertionClaims) -> Result<(), RejectionReason> {
        if let Some(claim) = self
            .policy
            .mandatory_claims()
            .iter()
            .find(|name| !claims.has_claim(name))
        {
            return Err(RejectionReason::missing(claim));
        }

        if self.policy.prevent_token_reuse() && claims.jwt_id().is_none() {
            return Err(RejectionReason::missing(names::JWT_ID));
        }

        Ok(())
    }

    /// Runs every check except the replay guard and returns the subject.
    ///
    /// # Errors
    ///
    /// Returns the [`RejectionReason`] of the first failing check.
    pub fn evaluate_structure(
        &self,
        claims: &AssertionClaims,
        now: OffsetDateTime,
    ) -> Result<String, RejectionReason> {
        self.check_mandatory(claims)?;

        let issuer = claims
            .issuer()
            .ok_or_else(|| RejectionReason::missing(names::ISSUER))?;
        let subject = claims
            .subject()
            .ok_or_else(|| RejectionReason::missing(names::SUBJECT))?;

        let expected_issuer = self.policy.issuer().unwrap_or(subject);
        if issuer != expected_issuer {
            return Err(RejectionReason::IssuerMismatch);
        }

        let audience = claims
            .aud
            .as_ref()
            .filter(|aud| !aud.is_empty())
            .ok_or_else(|| RejectionReason::missing(names::AUDIENCE))?;
        if !audience.contains(self.policy.expected_audience()) {
            return Err(RejectionReason::AudienceMismatch);
        }

        self.check_time_window(claims, now)?;

        Ok(subject.to_string())
    }

    fn check_time_window(
        &self,
        claims: &AssertionClaims,
        now: OffsetDateTime,
    ) -> Result<(), RejectionReason> {
        let now = now.unix_timestamp();
        let skew = self.policy.clock_skew_secs();

        let exp = claims
            .exp
            .ok_or_else(|| RejectionReason::missing(names::EXPIRATION))?;
        if exp <= now.saturating_sub(skew) {
            return Err(RejectionReason::Expired);
        }

        let latest_start = now.saturating_add(skew);
        if claims.nbf.is_some_and(|nbf| nbf > latest_start)
            || claims.iat.is_some_and(|iat| iat > latest_start)
        {
            return Err(RejectionReason::NotYetValid);
        }

        if let Some(issued) = claims.iat.or(claims.nbf)
            && now.saturating_sub(issued) > self.policy.reject_before_secs()
        {
            return Err(RejectionReason::ExceedsRejectBefore);
        }

        Ok(())
    }

    /// Runs every check, consuming the assertion's `jti` when reuse
    /// prevention is on, and returns the subject.
    ///
    /// # Errors
    ///
    /// Returns the [`RejectionReason`] of the first failing check.
    pub async fn evaluate(
        &self,
        claims: &AssertionClaims,
        now: OffsetDateTime,
    ) -> Result<String, RejectionReason> {
        let subject = self.evaluate_structure(claims, now)?;

        if !self.policy.prevent_token_reuse() {
            return Ok(subject);
        }

        let jti = claims
            .jwt_id()
            .ok_or_else(|| RejectionReason::missing(names::JWT_ID))?;
        let key = ReplayKey::new(claims.issuer(), &subject, jti);

        match self
            .replay_guard
            .try_consume(&key, self.retain_until(claims), now)
            .await
        {
            Ok(true) => Ok(subject),
            Ok(false) => {
                tracing::warn!(
                    client_id = %subject,
                    jti = %jti,
                    "Client assertion replay detected"
                );
                Err(RejectionReason::Replayed)
            }
            Err(e) => {
                tracing::warn!(
                    client_id = %subject,
                    error = %e,
                    "Replay guard failed; rejecting assertion"
                );
                Err(RejectionReason::ReplayGuardUnavailable)
            }
        }
    }

    /// Replay entries outlive the assertion by the reject-before window.
    fn retain_until(&self, claims: &AssertionClaims) -> OffsetDateTime {
        let horizon = claims
            .exp
            .unwrap_or_default()
            .saturating_add(self.policy.reject_before_secs())
            .saturating_add(self.policy.clock_skew_secs());

        OffsetDateTime::from_unix_timestamp(horizon)
            .unwrap_or_else(|_| PrimitiveDateTime::MAX.assume_utc())
    }
}
