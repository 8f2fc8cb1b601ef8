//! Parsed client assertions.
//!
//! A [`SignedAssertion`] is built once per request from the compact JWS the
//! client sent in `client_assertion`. Parsing only decodes the structure;
//! nothing here verifies the signature or evaluates claims.

pub mod claims;

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

pub use claims::{AssertionClaims, Audience};

/// Upper bound on the compact serialization length.
pub const MAX_ASSERTION_LENGTH: usize = 16 * 1024;

/// Errors raised while parsing a compact JWS.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The assertion is empty.
    #[error("assertion is empty")]
    Empty,

    /// The assertion exceeds [`MAX_ASSERTION_LENGTH`].
    #[error("assertion exceeds {max} bytes")]
    TooLarge {
        /// The enforced maximum.
        max: usize,
    },

    /// The assertion does not have exactly three segments.
    #[error("expected 3 segments, found {found}")]
    Segments {
        /// Number of segments found.
        found: usize,
    },

    /// A segment is not valid base64url.
    #[error("invalid base64url encoding in {part}")]
    Encoding {
        /// The segment name.
        part: &'static str,
    },

    /// A segment does not hold the expected JSON.
    #[error("invalid JSON in {part}: {source}")]
    Json {
        /// The segment name.
        part: &'static str,
        /// The JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The header declares `alg: none`; unsecured JWTs are not assertions.
    #[error("unsecured JWT (alg \"none\") is not a signed assertion")]
    Unsecured,

    /// The signature segment is empty.
    #[error("signature is empty")]
    MissingSignature,
}

/// JOSE header of a client assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionHeader {
    /// Declared signing algorithm, as written in the token.
    pub alg: String,

    /// Key ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Media type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

/// An immutable, parsed client assertion.
///
/// The `Debug` implementation prints only the header and identifying claims,
/// never the compact serialization or the signature.
#[derive(Clone)]
pub struct SignedAssertion {
    compact: String,
    header: AssertionHeader,
    claims: AssertionClaims,
    signature: Vec<u8>,
}

impl SignedAssertion {
    /// Parses a compact-serialized JWS.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if the input is empty, oversized, not three
    /// base64url segments, carries a non-JSON header or claim set, declares
    /// `alg: none`, or has an empty signature.
    pub fn parse(compact: &str) -> Result<Self, ParseError> {
        let compact = compact.trim();
        if compact.is_empty() {
            return Err(ParseError::Empty);
        }
        if compact.len() > MAX_ASSERTION_LENGTH {
            return Err(ParseError::TooLarge {
                max: MAX_ASSERTION_LENGTH,
            });
        }

        let parts: Vec<&str> = compact.split('.').collect();
        if parts.len() != 3 {
            return Err(ParseError::Segments { found: parts.len() });
        }

        let header_bytes = URL_SAFE_NO_PAD
            .decode(parts[0])
            .map_err(|_| ParseError::Encoding { part: "header" })?;
        let header: AssertionHeader =
            serde_json::from_slice(&header_bytes).map_err(|source| ParseError::Json {
                part: "header",
                source,
            })?;
        if header.alg.eq_ignore_ascii_case("none") {
            return Err(ParseError::Unsecured);
        }

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|_| ParseError::Encoding { part: "payload" })?;
        let claims: AssertionClaims =
            serde_json::from_slice(&payload_bytes).map_err(|source| ParseError::Json {
                part: "payload",
                source,
            })?;

        if parts[2].is_empty() {
            return Err(ParseError::MissingSignature);
        }
        let signature = URL_SAFE_NO_PAD
            .decode(parts[2])
            .map_err(|_| ParseError::Encoding { part: "signature" })?;

        Ok(Self {
            compact: compact.to_string(),
            header,
            claims,
            signature,
        })
    }

    /// Returns the JOSE header.
    #[must_use]
    pub fn header(&self) -> &AssertionHeader {
        &self.header
    }

    /// Returns the claim set.
    #[must_use]
    pub fn claims(&self) -> &AssertionClaims {
        &self.claims
    }

    /// Returns the decoded signature bytes.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Returns the compact serialization. Treat as a credential.
    #[must_use]
    pub fn compact(&self) -> &str {
        &self.compact
    }
}

impl fmt::Debug for SignedAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedAssertion")
            .field("alg", &self.header.alg)
            .field("kid", &self.header.kid)
            .field("iss", &self.claims.iss)
            .field("sub", &self.claims.sub)
            .field("jti", &self.claims.jti)
            .finish_non_exhaustive()
    }
}
