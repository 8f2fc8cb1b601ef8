//! # pkjwt-auth
//!
//! `private_key_jwt` client authentication for OAuth 2.0 token endpoints
//! (RFC 7523 Section 2.2, OpenID Connect Core Section 9).
//!
//! A client proves its identity by sending a JWT it signed with its private
//! key. This crate decides whether such an assertion is acceptable:
//!
//! - the header algorithm is on the allow-list and matches the client's key
//! - the signature verifies against the key registered for the client
//! - `iss`, `sub`, `aud`, `exp`, `nbf` and `iat` satisfy the policy
//! - the `jti` has not been used before
//!
//! ## Modules
//!
//! - [`config`] - Authenticator configuration and loaders
//! - [`policy`] - Read-only validation policy snapshot
//! - [`assertion`] - Parsed client assertions
//! - [`keys`] - Client verification keys and registries
//! - [`verify`] - Signature verification
//! - [`claims`] - Claims policy evaluation and rejection reasons
//! - [`replay`] - Replay prevention
//! - [`validator`] - The validation chain
//! - [`authenticator`] - The token endpoint facade

pub mod assertion;
pub mod authenticator;
pub mod claims;
pub mod config;
pub mod error;
pub mod keys;
pub mod policy;
pub mod replay;
pub mod validator;
pub mod verify;

#[cfg(test)]
mod test_support;

pub use assertion::{AssertionClaims, AssertionHeader, Audience, ParseError, SignedAssertion};
pub use authenticator::{
    AuthenticatorStats, AuthnContext, AuthnState, BodyParameters, CLIENT_ASSERTION,
    CLIENT_ASSERTION_TYPE, ClientAssertionRequest, ClientAuthenticator, JWT_BEARER_ASSERTION_TYPE,
    PrivateKeyJwtAuthenticator, TokenEndpointAuthMethod,
};
pub use claims::{ClaimsEvaluator, RejectionReason};
pub use config::{ConfigError, PrivateKeyJwtConfig};
pub use error::AuthError;
pub use keys::{ClientKeyRegistry, JwksKeyRegistry, KeyLookup, VerificationKey};
pub use policy::ValidationPolicy;
pub use replay::{
    CachedReplayGuard, InMemoryReplayGuard, NoopReplayGuard, ReplayGuard, ReplayKey,
    spawn_sweeper,
};
pub use validator::AssertionValidator;
pub use verify::SignatureVerifier;

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use pkjwt_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::assertion::{AssertionClaims, Audience, SignedAssertion};
    pub use crate::authenticator::{
        AuthnContext, BodyParameters, ClientAssertionRequest, ClientAuthenticator,
        JWT_BEARER_ASSERTION_TYPE, PrivateKeyJwtAuthenticator,
    };
    pub use crate::claims::RejectionReason;
    pub use crate::config::{ConfigError, PrivateKeyJwtConfig};
    pub use crate::error::AuthError;
    pub use crate::keys::{ClientKeyRegistry, JwksKeyRegistry, KeyLookup, VerificationKey};
    pub use crate::replay::{InMemoryReplayGuard, ReplayGuard, ReplayKey};
}
