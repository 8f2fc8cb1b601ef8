//! `private_key_jwt` client authentication (RFC 7523 Section 2.2).
//!
//! The token endpoint drives a [`ClientAuthenticator`] through three calls
//! per request:
//!
//! 1. [`can_authenticate`](ClientAuthenticator::can_authenticate) - does the
//!    request carry a JWT-bearer client assertion at all?
//! 2. [`get_client_id`](ClientAuthenticator::get_client_id) - parse the
//!    assertion and report the claimed client ID
//! 3. [`authenticate_client`](ClientAuthenticator::authenticate_client) -
//!    run the full validation chain
//!
//! The parsed assertion is carried between calls in an [`AuthnContext`], so
//! it is decoded once per request. The authenticator itself holds no
//! per-request state and is shared across all requests.
//!
//! Only a missing or unparsable assertion is reported as an error
//! (`invalid_request`), from either call that reads it. Every validation
//! failure is a plain `false`; the reason is logged, never returned.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::AuthResult;
use crate::assertion::{ParseError, SignedAssertion};
use crate::config::{self, ConfigError, PrivateKeyJwtConfig};
use crate::error::AuthError;
use crate::keys::ClientKeyRegistry;
use crate::policy::ValidationPolicy;
use crate::replay::{self, ReplayGuard};
use crate::validator::AssertionValidator;

/// The `client_assertion_type` value for JWT client assertions.
pub const JWT_BEARER_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Request body parameter carrying the assertion type.
pub const CLIENT_ASSERTION_TYPE: &str = "client_assertion_type";

/// Request body parameter carrying the assertion.
pub const CLIENT_ASSERTION: &str = "client_assertion";

/// Read access to the token request body.
pub trait BodyParameters: Send + Sync {
    /// Returns the named body parameter, if present.
    fn body_parameter(&self, name: &str) -> Option<&str>;
}

impl BodyParameters for HashMap<String, String> {
    fn body_parameter(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

/// The client authentication parameters of a token request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientAssertionRequest {
    /// Client identifier, if the client also sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Assertion type URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_assertion_type: Option<String>,

    /// The compact-serialized assertion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_assertion: Option<String>,
}

impl ClientAssertionRequest {
    /// Creates a JWT-bearer request for `assertion`.
    #[must_use]
    pub fn jwt_bearer(assertion: impl Into<String>) -> Self {
        Self {
            client_id: None,
            client_assertion_type: Some(JWT_BEARER_ASSERTION_TYPE.to_string()),
            client_assertion: Some(assertion.into()),
        }
    }
}

impl BodyParameters for ClientAssertionRequest {
    fn body_parameter(&self, name: &str) -> Option<&str> {
        match name {
            "client_id" => self.client_id.as_deref(),
            CLIENT_ASSERTION_TYPE => self.client_assertion_type.as_deref(),
            CLIENT_ASSERTION => self.client_assertion.as_deref(),
            _ => None,
        }
    }
}

/// Token endpoint authentication methods.
///
/// Defined in OpenID Connect Core Section 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    /// Client assertion JWT signed with a shared secret.
    ClientSecretJwt,

    /// Client assertion JWT signed with private key.
    PrivateKeyJwt,
}

impl TokenEndpointAuthMethod {
    /// Returns the string representation of the auth method.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientSecretJwt => "client_secret_jwt",
            Self::PrivateKeyJwt => "private_key_jwt",
        }
    }
}

impl fmt::Display for TokenEndpointAuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress of one request through the authenticator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthnState {
    /// Nothing has been read from the request yet.
    #[default]
    NotStarted,
    /// The assertion string was found in the request.
    AssertionExtracted,
    /// The assertion could not be parsed.
    ParseFailed,
    /// The assertion was parsed and is held by the context.
    Parsed,
    /// The assertion passed validation.
    Validated,
    /// The assertion failed validation.
    Rejected,
}

/// Per-request authentication scratch space.
///
/// Create one per token request and pass it to every authenticator call for
/// that request. Never share a context between requests.
#[derive(Debug, Default)]
pub struct AuthnContext {
    assertion: Option<Arc<SignedAssertion>>,
    state: AuthnState,
}

impl AuthnContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AuthnState {
        self.state
    }

    /// The parsed assertion, once available.
    #[must_use]
    pub fn assertion(&self) -> Option<&SignedAssertion> {
        self.assertion.as_deref()
    }

    /// Returns the stashed assertion if it was parsed from `compact`.
    fn reusable(&self, compact: &str) -> Option<Arc<SignedAssertion>> {
        self.assertion
            .as_ref()
            .filter(|assertion| assertion.compact() == compact)
            .cloned()
    }

    fn stash(&mut self, assertion: Arc<SignedAssertion>) {
        self.assertion = Some(assertion);
        self.state = AuthnState::Parsed;
    }
}

/// A token endpoint client authentication method.
#[async_trait]
pub trait ClientAuthenticator: Send + Sync {
    /// The method this authenticator implements.
    fn auth_method(&self) -> TokenEndpointAuthMethod;

    /// Returns `true` if the request carries a client assertion this
    /// authenticator handles. Has no side effects.
    fn can_authenticate(&self, request: &dyn BodyParameters) -> bool;

    /// Parses the assertion, stores it in `ctx`, and returns the claimed
    /// client ID. The client is not authenticated yet.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` if the assertion is missing,
    /// unparsable, or names no subject.
    fn get_client_id(
        &self,
        request: &dyn BodyParameters,
        ctx: &mut AuthnContext,
    ) -> AuthResult<String>;

    /// Validates the assertion, reusing the one parsed by
    /// [`get_client_id`](Self::get_client_id) when available.
    ///
    /// Returns `Ok(false)` when the assertion fails validation.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` if the assertion is missing or
    /// unparsable.
    async fn authenticate_client(
        &self,
        request: &dyn BodyParameters,
        ctx: &mut AuthnContext,
    ) -> AuthResult<bool>;
}

/// Snapshot of authenticator counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthenticatorStats {
    /// Assertions parsed (successfully or not).
    pub parsed: u64,

    /// Assertions that passed validation.
    pub accepted: u64,

    /// Assertions that failed validation.
    pub rejected: u64,

    /// Requests answered with `invalid_request`.
    pub invalid_requests: u64,
}

#[derive(Debug, Default)]
struct Counters {
    parsed: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    invalid_requests: AtomicU64,
}

/// The `private_key_jwt` authenticator.
///
/// # Example
///
/// ```ignore
/// use pkjwt_auth::prelude::*;
///
/// let config = PrivateKeyJwtConfig::from_file("pkjwt.toml")?;
/// let keys = Arc::new(JwksKeyRegistry::from_file("clients.json")?);
/// let authenticator = PrivateKeyJwtAuthenticator::from_config(&config, keys, None)?;
///
/// let mut ctx = AuthnContext::new();
/// if authenticator.can_authenticate(&request) {
///     let client_id = authenticator.get_client_id(&request, &mut ctx)?;
///     if authenticator.authenticate_client(&request, &mut ctx).await? {
///         // issue tokens for client_id
///     }
/// }
/// ```
pub struct PrivateKeyJwtAuthenticator {
    validator: AssertionValidator,
    replay_guard: Arc<dyn ReplayGuard>,
    counters: Counters,
}

impl PrivateKeyJwtAuthenticator {
    /// Creates an authenticator from a validated policy.
    #[must_use]
    pub fn new(
        policy: ValidationPolicy,
        keys: Arc<dyn ClientKeyRegistry>,
        replay_guard: Arc<dyn ReplayGuard>,
    ) -> Self {
        Self {
            validator: AssertionValidator::new(Arc::new(policy), keys, replay_guard.clone()),
            replay_guard,
            counters: Counters::default(),
        }
    }

    /// Validates `config` and builds an authenticator, choosing the replay
    /// guard from the policy and the optional shared replay store.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid; no
    /// authenticator is created in that case.
    pub fn from_config(
        config: &PrivateKeyJwtConfig,
        keys: Arc<dyn ClientKeyRegistry>,
        shared_replay_store: Option<Arc<dyn ReplayGuard>>,
    ) -> Result<Self, ConfigError> {
        let policy = ValidationPolicy::try_from(config)?;
        let replay_guard = replay::guard_for_policy(&policy, shared_replay_store);

        tracing::info!(
            audience = %policy.expected_audience(),
            issuer = ?policy.issuer(),
            prevent_token_reuse = policy.prevent_token_reuse(),
            reject_before_secs = policy.reject_before_secs(),
            "private_key_jwt authenticator initialized"
        );

        Ok(Self::new(policy, keys, replay_guard))
    }

    /// The validation chain.
    #[must_use]
    pub fn validator(&self) -> &AssertionValidator {
        &self.validator
    }

    /// The replay guard in use.
    #[must_use]
    pub fn replay_guard(&self) -> Arc<dyn ReplayGuard> {
        self.replay_guard.clone()
    }

    /// Starts the replay-cache sweep at the configured `replay_sweep_interval`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_replay_sweeper(&self) -> JoinHandle<()> {
        replay::spawn_sweeper(
            self.replay_guard(),
            self.validator.policy().replay_sweep_interval(),
        )
    }

    /// The token endpoint auth methods this authenticator serves, for the
    /// discovery document. `client_secret_jwt` is listed only when an HMAC
    /// algorithm is allowed.
    #[must_use]
    pub fn supported_auth_methods(&self) -> Vec<TokenEndpointAuthMethod> {
        let mut methods = vec![TokenEndpointAuthMethod::PrivateKeyJwt];
        if self
            .validator
            .policy()
            .allowed_algorithms()
            .iter()
            .any(|algorithm| config::is_hmac(*algorithm))
        {
            methods.push(TokenEndpointAuthMethod::ClientSecretJwt);
        }
        methods
    }

    /// Returns current counter values.
    #[must_use]
    pub fn stats(&self) -> AuthenticatorStats {
        AuthenticatorStats {
            parsed: self.counters.parsed.load(Ordering::Relaxed),
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            invalid_requests: self.counters.invalid_requests.load(Ordering::Relaxed),
        }
    }

    fn parse(&self, compact: &str) -> Result<SignedAssertion, ParseError> {
        self.counters.parsed.fetch_add(1, Ordering::Relaxed);
        SignedAssertion::parse(compact)
    }

    fn invalid_request(&self, message: impl Into<String>) -> AuthError {
        self.counters.invalid_requests.fetch_add(1, Ordering::Relaxed);
        AuthError::invalid_request(message)
    }
}

fn assertion_param(request: &dyn BodyParameters) -> Option<&str> {
    request
        .body_parameter(CLIENT_ASSERTION)
        .map(str::trim)
        .filter(|assertion| !assertion.is_empty())
}

#[async_trait]
impl ClientAuthenticator for PrivateKeyJwtAuthenticator {
    fn auth_method(&self) -> TokenEndpointAuthMethod {
        TokenEndpointAuthMethod::PrivateKeyJwt
    }

    fn can_authenticate(&self, request: &dyn BodyParameters) -> bool {
        let assertion_type = request.body_parameter(CLIENT_ASSERTION_TYPE);
        if assertion_type != Some(JWT_BEARER_ASSERTION_TYPE) {
            tracing::trace!(?assertion_type, "Not a JWT-bearer client assertion");
            return false;
        }
        assertion_param(request).is_some()
    }

    fn get_client_id(
        &self,
        request: &dyn BodyParameters,
        ctx: &mut AuthnContext,
    ) -> AuthResult<String> {
        let compact = assertion_param(request)
            .ok_or_else(|| self.invalid_request("client_assertion is missing"))?;
        ctx.state = AuthnState::AssertionExtracted;

        let assertion = match ctx.reusable(compact) {
            Some(assertion) => assertion,
            None => match self.parse(compact) {
                Ok(assertion) => Arc::new(assertion),
                Err(e) => {
                    ctx.state = AuthnState::ParseFailed;
                    tracing::debug!(error = %e, "Client assertion could not be parsed");
                    return Err(self.invalid_request(format!("Malformed client assertion: {}", e)));
                }
            },
        };

        let subject = self
            .validator
            .resolve_subject(assertion.claims())
            .map(String::from);
        ctx.stash(assertion);

        subject.ok_or_else(|| self.invalid_request("Client assertion has no subject"))
    }

    async fn authenticate_client(
        &self,
        request: &dyn BodyParameters,
        ctx: &mut AuthnContext,
    ) -> AuthResult<bool> {
        let compact = assertion_param(request)
            .ok_or_else(|| self.invalid_request("client_assertion is missing"))?;

        let assertion = match ctx.reusable(compact) {
            Some(assertion) => assertion,
            None => {
                ctx.state = AuthnState::AssertionExtracted;
                match self.parse(compact) {
                    Ok(assertion) => {
                        let assertion = Arc::new(assertion);
                        ctx.stash(assertion.clone());
                        assertion
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Client assertion could not be parsed");
                        ctx.state = AuthnState::ParseFailed;
                        return Err(
                            self.invalid_request(format!("Malformed client assertion: {}", e))
                        );
                    }
                }
            }
        };

        if self.validator.is_valid_assertion(&assertion).await {
            self.counters.accepted.fetch_add(1, Ordering::Relaxed);
            ctx.state = AuthnState::Validated;
            Ok(true)
        } else {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            ctx.state = AuthnState::Rejected;
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::OffsetDateTime;

    use super::*;
    use crate::keys::JwksKeyRegistry;
    use crate::replay::{InMemoryReplayGuard, ReplayKey};
    use crate::test_support::{self, AUDIENCE, CLIENT_ID};

    fn authenticator() -> PrivateKeyJwtAuthenticator {
        let keys = JwksKeyRegistry::new();
        keys.register_key(CLIENT_ID, test_support::rsa_key().verification_key());
        PrivateKeyJwtAuthenticator::from_config(
            &PrivateKeyJwtConfig::new(AUDIENCE),
            Arc::new(keys),
            None,
        )
        .unwrap()
    }

    fn request(assertion_type: Option<&str>, assertion: Option<&str>) -> HashMap<String, String> {
        let mut params = HashMap::new();
        if let Some(value) = assertion_type {
            params.insert(CLIENT_ASSERTION_TYPE.to_string(), value.to_string());
        }
        if let Some(value) = assertion {
            params.insert(CLIENT_ASSERTION.to_string(), value.to_string());
        }
        params
    }

    #[test]
    fn test_auth_method() {
        let authenticator = authenticator();
        assert_eq!(
            authenticator.auth_method(),
            TokenEndpointAuthMethod::PrivateKeyJwt
        );
        assert_eq!(authenticator.auth_method().to_string(), "private_key_jwt");
    }

    #[test]
    fn test_can_authenticate() {
        let authenticator = authenticator();
        let jwt = "a.b.c";
        let bearer = |assertion| request(Some(JWT_BEARER_ASSERTION_TYPE), assertion);

        assert!(authenticator.can_authenticate(&bearer(Some(jwt))));
        assert!(!authenticator.can_authenticate(&bearer(Some("  "))));
        assert!(!authenticator.can_authenticate(&bearer(None)));
        assert!(!authenticator.can_authenticate(&request(
            Some("urn:ietf:params:oauth:client-assertion-type:saml2-bearer"),
            Some(jwt)
        )));
        assert!(!authenticator.can_authenticate(&request(None, Some(jwt))));
    }

    #[test]
    fn test_get_client_id_missing_assertion() {
        let authenticator = authenticator();
        let mut ctx = AuthnContext::new();

        let err = authenticator
            .get_client_id(&request(Some(JWT_BEARER_ASSERTION_TYPE), None), &mut ctx)
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
        assert_eq!(ctx.state(), AuthnState::NotStarted);
        assert_eq!(authenticator.stats().invalid_requests, 1);
    }

    #[test]
    fn test_get_client_id_unparsable() {
        let authenticator = authenticator();
        let mut ctx = AuthnContext::new();

        let err = authenticator
            .get_client_id(
                &request(Some(JWT_BEARER_ASSERTION_TYPE), Some("not-a-jwt")),
                &mut ctx,
            )
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest { .. }));
        assert_eq!(ctx.state(), AuthnState::ParseFailed);
        assert!(ctx.assertion().is_none());
    }

    #[test]
    fn test_get_client_id_stashes_assertion() {
        let authenticator = authenticator();
        let jwt = test_support::sign(test_support::rsa_key(), &test_support::default_claims());
        let mut ctx = AuthnContext::new();

        let client_id = authenticator
            .get_client_id(&ClientAssertionRequest::jwt_bearer(jwt), &mut ctx)
            .unwrap();
        assert_eq!(client_id, CLIENT_ID);
        assert_eq!(ctx.state(), AuthnState::Parsed);
        assert!(ctx.assertion().is_some());
    }

    #[tokio::test]
    async fn test_authenticate_without_prior_parse() {
        let authenticator = authenticator();
        let jwt = test_support::sign(test_support::rsa_key(), &test_support::default_claims());
        let mut ctx = AuthnContext::new();

        assert!(
            authenticator
                .authenticate_client(&ClientAssertionRequest::jwt_bearer(jwt), &mut ctx)
                .await
                .unwrap()
        );
        assert_eq!(ctx.state(), AuthnState::Validated);
        assert_eq!(authenticator.stats().parsed, 1);
        assert_eq!(authenticator.stats().accepted, 1);
    }

    #[tokio::test]
    async fn test_authenticate_unparsable_is_invalid_request() {
        let authenticator = authenticator();
        let mut ctx = AuthnContext::new();

        let err = authenticator
            .authenticate_client(
                &ClientAssertionRequest::jwt_bearer("eyJhbGciOiJSUzI1NiJ9.bm90IGpzb24.c2ln"),
                &mut ctx,
            )
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
        assert_eq!(ctx.state(), AuthnState::ParseFailed);
        assert_eq!(authenticator.stats().invalid_requests, 1);
        assert_eq!(authenticator.stats().rejected, 0);
    }

    #[tokio::test]
    async fn test_authenticate_missing_assertion_is_invalid_request() {
        let authenticator = authenticator();
        let mut ctx = AuthnContext::new();

        let err = authenticator
            .authenticate_client(&request(Some(JWT_BEARER_ASSERTION_TYPE), None), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest { .. }));
        assert_eq!(ctx.state(), AuthnState::NotStarted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_sweeper_uses_configured_interval() {
        let store = Arc::new(InMemoryReplayGuard::new());
        let mut config = PrivateKeyJwtConfig::new(AUDIENCE)
            .with_replay_sweep_interval(Duration::from_secs(30));
        config.enable_jti_cache = false;
        let authenticator = PrivateKeyJwtAuthenticator::from_config(
            &config,
            Arc::new(JwksKeyRegistry::new()),
            Some(store.clone() as Arc<dyn ReplayGuard>),
        )
        .unwrap();

        let retained_until = OffsetDateTime::now_utc() - time::Duration::seconds(1);
        let recorded_at = retained_until - time::Duration::seconds(60);
        store
            .try_consume_at(&ReplayKey::new(None, CLIENT_ID, "old"), retained_until, recorded_at)
            .unwrap();

        let handle = authenticator.spawn_replay_sweeper();
        tokio::time::sleep(Duration::from_secs(20)).await;
        tokio::task::yield_now().await;
        assert_eq!(store.len(), 1);

        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert!(store.is_empty());
        handle.abort();
    }

    #[test]
    fn test_supported_auth_methods() {
        assert_eq!(
            authenticator().supported_auth_methods(),
            [TokenEndpointAuthMethod::PrivateKeyJwt]
        );

        let mut config =
            PrivateKeyJwtConfig::new(AUDIENCE).with_allowed_algorithms(["RS256", "HS256"]);
        config.allow_shared_secret = true;
        let authenticator =
            PrivateKeyJwtAuthenticator::from_config(&config, Arc::new(JwksKeyRegistry::new()), None)
                .unwrap();
        assert_eq!(
            authenticator.supported_auth_methods(),
            [
                TokenEndpointAuthMethod::PrivateKeyJwt,
                TokenEndpointAuthMethod::ClientSecretJwt
            ]
        );
        assert_eq!(TokenEndpointAuthMethod::ClientSecretJwt.as_str(), "client_secret_jwt");
    }

    #[test]
    fn test_client_assertion_request_from_form_fields() {
        let request: ClientAssertionRequest = serde_json::from_value(serde_json::json!({
            "client_assertion_type": JWT_BEARER_ASSERTION_TYPE,
            "client_assertion": "a.b.c",
            "grant_type": "client_credentials"
        }))
        .unwrap();

        assert_eq!(request.body_parameter(CLIENT_ASSERTION), Some("a.b.c"));
        assert_eq!(
            request.body_parameter(CLIENT_ASSERTION_TYPE),
            Some(JWT_BEARER_ASSERTION_TYPE)
        );
        assert_eq!(request.body_parameter("grant_type"), None);
    }
}
