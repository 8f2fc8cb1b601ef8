//! Validation policy snapshot.

use std::time::Duration;

use jsonwebtoken::Algorithm;

use crate::config::{ConfigError, PrivateKeyJwtConfig};

/// Read-only policy shared by every request.
///
/// Built once from a validated [`PrivateKeyJwtConfig`]; there is no other
/// constructor, so an authenticator cannot exist with an invalid policy.
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    expected_audience: String,
    issuer: Option<String>,
    prevent_token_reuse: bool,
    reject_before_secs: i64,
    enable_jti_cache: bool,
    mandatory_claims: Vec<String>,
    allowed_algorithms: Vec<Algorithm>,
    clock_skew_secs: i64,
    replay_cache_capacity: usize,
    replay_sweep_interval: Duration,
    log_sensitive_assertions: bool,
}

impl ValidationPolicy {
    /// Validates `config` and snapshots it.
    ///
    /// # Errors
    ///
    /// Returns any error reported by [`PrivateKeyJwtConfig::validate`], or
    /// `ConfigError::InvalidValue` if the clock skew does not fit in seconds.
    pub fn from_config(config: &PrivateKeyJwtConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let expected_audience = config
            .expected_audience()
            .ok_or_else(|| {
                ConfigError::Missing("token_endpoint_alias or token_endpoint_url".to_string())
            })?
            .to_string();

        let clock_skew_secs = i64::try_from(config.clock_skew.as_secs())
            .map_err(|_| ConfigError::InvalidValue("clock_skew is too large".to_string()))?;

        Ok(Self {
            expected_audience,
            issuer: config.issuer.clone().filter(|iss| !iss.is_empty()),
            prevent_token_reuse: config.prevent_token_reuse,
            reject_before_secs: i64::from(config.reject_before_minutes) * 60,
            enable_jti_cache: config.enable_jti_cache,
            mandatory_claims: config
                .mandatory_claims
                .iter()
                .map(|claim| claim.trim().to_string())
                .collect(),
            allowed_algorithms: config.parsed_algorithms()?,
            clock_skew_secs,
            replay_cache_capacity: config.replay_cache_capacity,
            replay_sweep_interval: config.replay_sweep_interval,
            log_sensitive_assertions: config.log_sensitive_assertions,
        })
    }

    /// The `aud` value every assertion must contain.
    #[must_use]
    pub fn expected_audience(&self) -> &str {
        &self.expected_audience
    }

    /// The configured issuer; `None` means assertions must be self-issued.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// Whether the replay guard is consulted.
    #[must_use]
    pub fn prevent_token_reuse(&self) -> bool {
        self.prevent_token_reuse
    }

    /// Maximum accepted assertion age, in seconds.
    #[must_use]
    pub fn reject_before_secs(&self) -> i64 {
        self.reject_before_secs
    }

    /// Whether a local JTI cache fronts a shared replay store.
    #[must_use]
    pub fn enable_jti_cache(&self) -> bool {
        self.enable_jti_cache
    }

    /// Claims that must be present and non-empty.
    #[must_use]
    pub fn mandatory_claims(&self) -> &[String] {
        &self.mandatory_claims
    }

    /// The JWS algorithm allow-list.
    #[must_use]
    pub fn allowed_algorithms(&self) -> &[Algorithm] {
        &self.allowed_algorithms
    }

    /// Tolerated clock skew, in seconds.
    #[must_use]
    pub fn clock_skew_secs(&self) -> i64 {
        self.clock_skew_secs
    }

    /// Capacity of the in-memory replay cache.
    #[must_use]
    pub fn replay_cache_capacity(&self) -> usize {
        self.replay_cache_capacity
    }

    /// Period of the background replay-cache sweep.
    #[must_use]
    pub fn replay_sweep_interval(&self) -> Duration {
        self.replay_sweep_interval
    }

    /// Whether raw assertions may be logged.
    #[must_use]
    pub fn log_sensitive_assertions(&self) -> bool {
        self.log_sensitive_assertions
    }
}

impl TryFrom<&PrivateKeyJwtConfig> for ValidationPolicy {
    type Error = ConfigError;

    fn try_from(config: &PrivateKeyJwtConfig) -> Result<Self, Self::Error> {
        Self::from_config(config)
    }
}
