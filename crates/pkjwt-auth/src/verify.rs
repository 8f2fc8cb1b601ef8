//! Signature verification.
//!
//! The algorithm used for verification is always the one declared in the
//! assertion header, and only after it has been found on the allow-list.
//! The key must also be of the matching type, so a public RSA key can never
//! be used as an HMAC secret.

use std::str::FromStr;

use jsonwebtoken::{Algorithm, Validation};

use crate::assertion::SignedAssertion;
use crate::claims::RejectionReason;
use crate::keys::{VerificationKey, algorithm_name};
use crate::policy::ValidationPolicy;

/// Verifies assertion signatures against an algorithm allow-list.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    allowed_algorithms: Vec<Algorithm>,
}

impl SignatureVerifier {
    /// Creates a verifier accepting only `allowed_algorithms`.
    #[must_use]
    pub fn new(allowed_algorithms: impl Into<Vec<Algorithm>>) -> Self {
        Self {
            allowed_algorithms: allowed_algorithms.into(),
        }
    }

    /// Creates a verifier from the policy's allow-list.
    #[must_use]
    pub fn from_policy(policy: &ValidationPolicy) -> Self {
        Self::new(policy.allowed_algorithms())
    }

    /// Resolves the header `alg` against the allow-list.
    ///
    /// # Errors
    ///
    /// Returns `RejectionReason::UnsupportedAlgorithm` if the name is unknown
    /// or not allowed.
    pub fn header_algorithm(
        &self,
        assertion: &SignedAssertion,
    ) -> Result<Algorithm, RejectionReason> {
        let alg = &assertion.header().alg;
        Algorithm::from_str(alg)
            .ok()
            .filter(|algorithm| self.allowed_algorithms.contains(algorithm))
            .ok_or_else(|| RejectionReason::UnsupportedAlgorithm { alg: alg.clone() })
    }

    /// Verifies the signature of `assertion` with `key`.
    ///
    /// # Errors
    ///
    /// Returns the reason verification failed: unsupported algorithm, no
    /// key, a key of the wrong type, or a bad signature.
    pub fn check(
        &self,
        assertion: &SignedAssertion,
        key: Option<&VerificationKey>,
    ) -> Result<(), RejectionReason> {
        let algorithm = self.header_algorithm(assertion)?;
        let key = key.ok_or(RejectionReason::KeyNotFound)?;

        if !key.supports(algorithm) {
            tracing::debug!(
                alg = algorithm_name(algorithm),
                kid = ?key.key_id(),
                "Registered key cannot verify header algorithm"
            );
            return Err(RejectionReason::InvalidSignature);
        }

        let decoding_key = key.to_decoding_key().map_err(|e| {
            tracing::debug!(error = %e, "Registered key is not usable");
            RejectionReason::InvalidSignature
        })?;

        // Only the signature is checked here; claims are evaluated separately.
        let mut validation = Validation::new(algorithm);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;

        jsonwebtoken::decode::<serde_json::Value>(assertion.compact(), &decoding_key, &validation)
            .map(|_| ())
            .map_err(|e| {
                tracing::debug!(error = %e, "Client assertion signature verification failed");
                RejectionReason::InvalidSignature
            })
    }

    /// Returns `true` only if the signature is valid. Never fails.
    #[must_use]
    pub fn verify(&self, assertion: &SignedAssertion, key: Option<&VerificationKey>) -> bool {
        self.check(assertion, key).is_ok()
    }
}
