//! Shared fixtures: client key pairs, signed assertions, a counting key
//! registry, and authenticator builders.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use p384::SecretKey as EcSecretKey;
use p384::ecdsa::SigningKey as EcSigningKey;
use pkjwt_auth::prelude::*;
use pkjwt_auth::{AuthResult, PrivateKeyJwtAuthenticator};
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use serde_json::{Value, json};
use time::OffsetDateTime;

pub const AUDIENCE: &str = "https://auth.example.com/oauth2/token";
pub const RSA_CLIENT: &str = "rsa-client";
pub const EC_CLIENT: &str = "ec-client";
pub const HMAC_CLIENT: &str = "hmac-client";
pub const HMAC_SECRET: &[u8] = b"a-shared-secret-of-at-least-32-bytes!!";

/// A client's signing key and the public JWK registered for it.
pub struct ClientKey {
    pub algorithm: Algorithm,
    pub kid: String,
    pub jwk: Jwk,
    encoding_key: EncodingKey,
}

impl ClientKey {
    fn generate_rsa() -> Self {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let public_key = private_key.to_public_key();
        let private_pem = private_key.to_pkcs8_pem(LineEnding::LF).unwrap();

        let jwk = serde_json::from_value(json!({
            "kty": "RSA",
            "kid": "rsa-1",
            "use": "sig",
            "alg": "RS256",
            "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }))
        .unwrap();

        Self {
            algorithm: Algorithm::RS256,
            kid: "rsa-1".to_string(),
            jwk,
            encoding_key: EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap(),
        }
    }

    fn generate_ec() -> Self {
        let secret_key = EcSecretKey::random(&mut OsRng);
        let signing_key = EcSigningKey::from(&secret_key);
        let point = signing_key.verifying_key().to_encoded_point(false);
        let private_pem = secret_key.to_pkcs8_pem(LineEnding::LF).unwrap();

        let jwk = serde_json::from_value(json!({
            "kty": "EC",
            "crv": "P-384",
            "kid": "ec-1",
            "use": "sig",
            "x": URL_SAFE_NO_PAD.encode(point.x().unwrap()),
            "y": URL_SAFE_NO_PAD.encode(point.y().unwrap()),
        }))
        .unwrap();

        Self {
            algorithm: Algorithm::ES384,
            kid: "ec-1".to_string(),
            jwk,
            encoding_key: EncodingKey::from_ec_pem(private_pem.as_bytes()).unwrap(),
        }
    }

    /// Signs `claims` with this key, setting `kid` in the header.
    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(self.algorithm);
        header.kid = Some(self.kid.clone());
        jsonwebtoken::encode(&header, claims, &self.encoding_key).unwrap()
    }
}

pub fn rsa_key() -> &'static ClientKey {
    static KEY: OnceLock<ClientKey> = OnceLock::new();
    KEY.get_or_init(ClientKey::generate_rsa)
}

pub fn rogue_rsa_key() -> &'static ClientKey {
    static KEY: OnceLock<ClientKey> = OnceLock::new();
    KEY.get_or_init(ClientKey::generate_rsa)
}

pub fn ec_key() -> &'static ClientKey {
    static KEY: OnceLock<ClientKey> = OnceLock::new();
    KEY.get_or_init(ClientKey::generate_ec)
}

pub fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

pub fn at(timestamp: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(timestamp).unwrap()
}

/// Self-issued claims for `client_id`, valid for five minutes.
pub fn claims_for(client_id: &str) -> Value {
    let now = now();
    json!({
        "iss": client_id,
        "sub": client_id,
        "aud": AUDIENCE,
        "exp": now + 300,
        "iat": now,
        "jti": uuid::Uuid::new_v4().to_string(),
    })
}

pub fn claims() -> Value {
    claims_for(RSA_CLIENT)
}

pub fn request(assertion: &str) -> ClientAssertionRequest {
    ClientAssertionRequest::jwt_bearer(assertion)
}

pub fn parse(assertion: &str) -> SignedAssertion {
    SignedAssertion::parse(assertion).unwrap()
}

/// Key registry that counts lookups.
#[derive(Default)]
pub struct CountingRegistry {
    inner: JwksKeyRegistry,
    calls: AtomicUsize,
}

impl CountingRegistry {
    pub fn with_test_clients() -> Self {
        let registry = Self::default();
        registry.inner.register_jwks(
            RSA_CLIENT,
            JwkSet {
                keys: vec![rsa_key().jwk.clone()],
            },
        );
        registry
            .inner
            .register_key(EC_CLIENT, VerificationKey::from(ec_key().jwk.clone()));
        registry
            .inner
            .register_key(HMAC_CLIENT, VerificationKey::Secret(HMAC_SECRET.to_vec()));
        registry
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientKeyRegistry for CountingRegistry {
    async fn resolve_verification_key(
        &self,
        lookup: KeyLookup<'_>,
    ) -> AuthResult<Option<VerificationKey>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve_verification_key(lookup).await
    }
}

/// Builds an authenticator over the test clients.
pub fn authenticator_with_store(
    config: PrivateKeyJwtConfig,
    shared_store: Option<Arc<dyn ReplayGuard>>,
) -> (PrivateKeyJwtAuthenticator, Arc<CountingRegistry>) {
    let registry = Arc::new(CountingRegistry::with_test_clients());
    let authenticator =
        PrivateKeyJwtAuthenticator::from_config(&config, registry.clone(), shared_store).unwrap();
    (authenticator, registry)
}

pub fn authenticator(
    config: PrivateKeyJwtConfig,
) -> (PrivateKeyJwtAuthenticator, Arc<CountingRegistry>) {
    authenticator_with_store(config, None)
}

pub fn config() -> PrivateKeyJwtConfig {
    PrivateKeyJwtConfig::new(AUDIENCE)
}
