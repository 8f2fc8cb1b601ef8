//! In-memory client key registry.
//!
//! Holds the keys registered for each client, either as an inline JWKS or as
//! individual [`VerificationKey`]s. Lookup by key ID and algorithm follows
//! RFC 7517: a key matches when its `kid` equals the header `kid` (if the
//! header has one), its `alg` equals the header algorithm (if the key
//! declares one), and its `use` is `sig` (if declared).

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::Algorithm;
use jsonwebtoken::jwk::{Jwk, JwkSet, PublicKeyUse};

use super::{ClientKeyRegistry, KeyLookup, VerificationKey};
use crate::AuthResult;
use crate::error::AuthError;

/// Client keys indexed by client ID.
///
/// # Example
///
/// ```ignore
/// use pkjwt_auth::keys::JwksKeyRegistry;
///
/// let registry = JwksKeyRegistry::new();
/// registry.register_jwks("client-123", jwks);
/// ```
#[derive(Debug, Default)]
pub struct JwksKeyRegistry {
    clients: DashMap<String, Vec<VerificationKey>>,
}

impl JwksKeyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every key of `jwks` for `client_id`, replacing previous keys.
    pub fn register_jwks(&self, client_id: impl Into<String>, jwks: JwkSet) {
        let keys = jwks.keys.into_iter().map(VerificationKey::from).collect();
        self.clients.insert(client_id.into(), keys);
    }

    /// Adds a single key for `client_id`.
    pub fn register_key(&self, client_id: impl Into<String>, key: VerificationKey) {
        self.clients.entry(client_id.into()).or_default().push(key);
    }

    /// Removes all keys of `client_id`. Returns `true` if the client existed.
    pub fn remove(&self, client_id: &str) -> bool {
        self.clients.remove(client_id).is_some()
    }

    /// Number of registered clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns `true` if no client is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Builds a registry from a JSON object mapping client IDs to JWKS:
    ///
    /// ```json
    /// { "client-123": { "keys": [ { "kty": "RSA", "n": "...", "e": "AQAB" } ] } }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the document is not valid JSON
    /// or a key set is malformed.
    pub fn from_json_str(document: &str) -> AuthResult<Self> {
        let sets: HashMap<String, JwkSet> = serde_json::from_str(document)
            .map_err(|e| AuthError::configuration(format!("Invalid client JWKS document: {}", e)))?;

        let registry = Self::new();
        for (client_id, jwks) in sets {
            registry.register_jwks(client_id, jwks);
        }
        Ok(registry)
    }

    /// Reads a registry document from disk. See [`from_json_str`](Self::from_json_str).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> AuthResult<Self> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|e| {
            AuthError::configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let registry = Self::from_json_str(&document)?;
        tracing::info!(
            path = %path.display(),
            clients = registry.len(),
            "Loaded client key registry"
        );
        Ok(registry)
    }

    fn find_key(
        keys: &[VerificationKey],
        kid: Option<&str>,
        algorithm: Algorithm,
    ) -> Option<VerificationKey> {
        keys.iter()
            .find(|key| match key {
                VerificationKey::Jwk(jwk) => jwk_matches(jwk, kid, algorithm),
                // Bare PEM keys and secrets carry no kid; match on type only.
                _ => key.supports(algorithm),
            })
            .cloned()
    }
}

fn jwk_matches(jwk: &Jwk, kid: Option<&str>, algorithm: Algorithm) -> bool {
    if let Some(expected_kid) = kid
        && jwk.common.key_id.as_deref() != Some(expected_kid)
    {
        return false;
    }

    // Key use must be "sig" or unspecified
    if let Some(ref use_) = jwk.common.public_key_use
        && *use_ != PublicKeyUse::Signature
    {
        return false;
    }

    super::jwk_supports(jwk, algorithm)
}

#[async_trait]
impl ClientKeyRegistry for JwksKeyRegistry {
    async fn resolve_verification_key(
        &self,
        lookup: KeyLookup<'_>,
    ) -> AuthResult<Option<VerificationKey>> {
        let Some(keys) = self.clients.get(lookup.subject) else {
            tracing::debug!(client_id = %lookup.subject, "No keys registered for client");
            return Ok(None);
        };

        let key = Self::find_key(&keys, lookup.key_id, lookup.algorithm);
        if key.is_none() {
            tracing::debug!(
                client_id = %lookup.subject,
                kid = ?lookup.key_id,
                alg = super::algorithm_name(lookup.algorithm),
                "No registered key matches assertion header"
            );
        }
        Ok(key)
    }
}
