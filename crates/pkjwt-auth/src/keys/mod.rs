//! Client verification keys and the registry that resolves them.
//!
//! The registry is an external collaborator: deployments back it with their
//! client store. [`JwksKeyRegistry`] is an in-memory implementation for
//! clients registered with an inline JWKS or a PEM public key.

pub mod jwks;

use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk};
use jsonwebtoken::{Algorithm, DecodingKey};

use crate::AuthResult;

pub use jwks::JwksKeyRegistry;

/// Key material registered for a client.
#[derive(Debug, Clone)]
pub enum VerificationKey {
    /// A public JSON Web Key.
    Jwk(Box<Jwk>),
    /// An RSA public key in PEM form (SPKI or PKCS#1).
    RsaPem(Vec<u8>),
    /// An EC public key in PEM form.
    EcPem(Vec<u8>),
    /// A shared secret. Only usable with HMAC algorithms.
    Secret(Vec<u8>),
}

impl VerificationKey {
    /// Returns `true` if this key can verify signatures made with `algorithm`.
    ///
    /// This is the key-type half of algorithm binding: an RSA key never
    /// verifies an HMAC signature, whatever the header says.
    #[must_use]
    pub fn supports(&self, algorithm: Algorithm) -> bool {
        let family = AlgorithmFamily::of(algorithm);
        match self {
            Self::Jwk(jwk) => jwk_supports(jwk, algorithm),
            Self::RsaPem(_) => family == AlgorithmFamily::Rsa,
            Self::EcPem(_) => family == AlgorithmFamily::Ec,
            Self::Secret(_) => family == AlgorithmFamily::Hmac,
        }
    }

    /// Converts the key material into a `jsonwebtoken` decoding key.
    ///
    /// # Errors
    ///
    /// Returns the `jsonwebtoken` error if the key material is malformed.
    pub fn to_decoding_key(&self) -> jsonwebtoken::errors::Result<DecodingKey> {
        match self {
            Self::Jwk(jwk) => DecodingKey::from_jwk(jwk),
            Self::RsaPem(pem) => DecodingKey::from_rsa_pem(pem),
            Self::EcPem(pem) => DecodingKey::from_ec_pem(pem),
            Self::Secret(secret) => Ok(DecodingKey::from_secret(secret)),
        }
    }

    /// Returns the key ID, if the key carries one.
    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        match self {
            Self::Jwk(jwk) => jwk.common.key_id.as_deref(),
            _ => None,
        }
    }
}

/// Returns `true` if the JWK's type (and declared `alg`, if any) fits `algorithm`.
pub(crate) fn jwk_supports(jwk: &Jwk, algorithm: Algorithm) -> bool {
    let key_family = match &jwk.algorithm {
        AlgorithmParameters::RSA(_) => AlgorithmFamily::Rsa,
        AlgorithmParameters::EllipticCurve(_) => AlgorithmFamily::Ec,
        AlgorithmParameters::OctetKey(_) => AlgorithmFamily::Hmac,
        AlgorithmParameters::OctetKeyPair(_) => AlgorithmFamily::Ed,
    };
    if key_family != AlgorithmFamily::of(algorithm) {
        return false;
    }
    jwk.common
        .key_algorithm
        .as_ref()
        .is_none_or(|declared| declared.to_string() == algorithm_name(algorithm))
}

impl From<Jwk> for VerificationKey {
    fn from(jwk: Jwk) -> Self {
        Self::Jwk(Box::new(jwk))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlgorithmFamily {
    Hmac,
    Rsa,
    Ec,
    Ed,
}

impl AlgorithmFamily {
    fn of(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Self::Hmac,
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Self::Rsa,
            Algorithm::ES256 | Algorithm::ES384 => Self::Ec,
            Algorithm::EdDSA => Self::Ed,
        }
    }
}

/// What the validator knows about the key it needs.
#[derive(Debug, Clone, Copy)]
pub struct KeyLookup<'a> {
    /// The assertion's `iss` claim.
    pub issuer: Option<&'a str>,
    /// The assertion's `sub` claim, the claimed client ID.
    pub subject: &'a str,
    /// The header `kid`, if any.
    pub key_id: Option<&'a str>,
    /// The header algorithm, already checked against the allow-list.
    pub algorithm: Algorithm,
}

/// Resolves the verification key registered for a client.
///
/// Implementations should be fast; they are called on every token request
/// that uses `private_key_jwt`.
#[async_trait]
pub trait ClientKeyRegistry: Send + Sync {
    /// Returns the key to verify an assertion claimed by `lookup.subject`,
    /// or `None` if the client has no usable key.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails. The validator treats
    /// errors the same as a missing key.
    async fn resolve_verification_key(
        &self,
        lookup: KeyLookup<'_>,
    ) -> AuthResult<Option<VerificationKey>>;
}

/// Converts a jsonwebtoken Algorithm to its string representation.
#[must_use]
pub fn algorithm_name(algorithm: Algorithm) -> &'static str {
    match algorithm {
        Algorithm::HS256 => "HS256",
        Algorithm::HS384 => "HS384",
        Algorithm::HS512 => "HS512",
        Algorithm::ES256 => "ES256",
        Algorithm::ES384 => "ES384",
        Algorithm::RS256 => "RS256",
        Algorithm::RS384 => "RS384",
        Algorithm::RS512 => "RS512",
        Algorithm::PS256 => "PS256",
        Algorithm::PS384 => "PS384",
        Algorithm::PS512 => "PS512",
        Algorithm::EdDSA => "EdDSA",
    }
}
