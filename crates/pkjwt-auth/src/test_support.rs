//! Key material and signed assertions for unit tests.

use std::sync::OnceLock;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use serde_json::{Value, json};
use time::OffsetDateTime;

use crate::keys::VerificationKey;

pub const AUDIENCE: &str = "https://auth.example.com/oauth2/token";
pub const CLIENT_ID: &str = "client-123";

pub struct TestKey {
    pub algorithm: Algorithm,
    pub encoding_key: EncodingKey,
    pub public_pem: String,
    secret: Option<Vec<u8>>,
}

impl TestKey {
    fn generate_rsa() -> Self {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let private_pem = private_key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let public_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();

        Self {
            algorithm: Algorithm::RS256,
            encoding_key: EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap(),
            public_pem,
            secret: None,
        }
    }

    pub fn hmac(secret: &[u8]) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret),
            public_pem: String::new(),
            secret: Some(secret.to_vec()),
        }
    }

    pub fn verification_key(&self) -> VerificationKey {
        match &self.secret {
            Some(secret) => VerificationKey::Secret(secret.clone()),
            None => VerificationKey::RsaPem(self.public_pem.as_bytes().to_vec()),
        }
    }
}

pub fn rsa_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(TestKey::generate_rsa)
}

pub fn other_rsa_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(TestKey::generate_rsa)
}

pub fn default_claims() -> Value {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    json!({
        "iss": CLIENT_ID,
        "sub": CLIENT_ID,
        "aud": AUDIENCE,
        "exp": now + 300,
        "iat": now,
        "jti": uuid::Uuid::new_v4().to_string(),
    })
}

pub fn sign(key: &TestKey, claims: &Value) -> String {
    jsonwebtoken::encode(&Header::new(key.algorithm), claims, &key.encoding_key).unwrap()
}

pub fn encode_segment(value: &Value) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
}
