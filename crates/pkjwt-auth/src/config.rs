//! Authenticator configuration.
//!
//! Configuration is read once at startup and snapshotted into a
//! [`ValidationPolicy`](crate::policy::ValidationPolicy). Two sources are
//! supported: a TOML document and the flat property map used by plugin-style
//! hosts (`TokenEndpointAlias`, `RejectBeforeInMinutes`, ...).
//!
//! # Example (TOML)
//!
//! ```toml
//! token_endpoint_alias = "https://auth.example.com/oauth2/token"
//! prevent_token_reuse = true
//! reject_before_minutes = 60
//! mandatory_claims = ["jti", "iat"]
//! clock_skew = "30s"
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

/// Default maximum assertion age, in minutes.
pub const DEFAULT_REJECT_BEFORE_MINUTES: u32 = 300;

/// Default capacity of the in-memory replay cache.
pub const DEFAULT_REPLAY_CACHE_CAPACITY: usize = 100_000;

/// Property names understood by [`PrivateKeyJwtConfig::from_properties`].
pub mod property {
    pub const TOKEN_ENDPOINT_ALIAS: &str = "TokenEndpointAlias";
    pub const TOKEN_ENDPOINT_URL: &str = "TokenEndpointUrl";
    pub const ISSUER: &str = "Issuer";
    pub const PREVENT_TOKEN_REUSE: &str = "PreventTokenReuse";
    pub const REJECT_BEFORE_IN_MINUTES: &str = "RejectBeforeInMinutes";
    pub const ENABLE_JTI_CACHE: &str = "EnableJTICache";
    pub const MANDATORY_CLAIMS: &str = "MandatoryClaims";
    pub const ALLOWED_ALGORITHMS: &str = "AllowedAlgorithms";
    pub const ALLOW_SHARED_SECRET: &str = "AllowSharedSecret";
    pub const CLOCK_SKEW_IN_SECONDS: &str = "ClockSkewInSeconds";
    pub const LOG_SENSITIVE_ASSERTIONS: &str = "LogSensitiveAssertions";
}

/// Configuration for the `private_key_jwt` client authenticator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PrivateKeyJwtConfig {
    /// Expected `aud` value of client assertions.
    pub token_endpoint_alias: Option<String>,

    /// Token endpoint URL, used as the expected audience when no alias is set.
    pub token_endpoint_url: Option<String>,

    /// Expected `iss` value. When unset, assertions must be self-issued
    /// (`iss` equal to `sub`).
    pub issuer: Option<String>,

    /// Reject assertions whose `jti` has already been consumed.
    pub prevent_token_reuse: bool,

    /// Maximum accepted assertion age in minutes, measured from `iat`.
    pub reject_before_minutes: u32,

    /// Keep a process-local JTI cache in front of a shared replay store.
    pub enable_jti_cache: bool,

    /// Claims that must be present with a non-empty value.
    pub mandatory_claims: Vec<String>,

    /// JWS algorithms accepted in the assertion header.
    pub allowed_algorithms: Vec<String>,

    /// Permit HMAC algorithms (shared-secret client keys).
    pub allow_shared_secret: bool,

    /// Clock skew tolerated on `exp`, `nbf` and `iat`.
    #[serde(with = "humantime_serde")]
    pub clock_skew: Duration,

    /// Period of the background replay-cache sweep.
    #[serde(with = "humantime_serde")]
    pub replay_sweep_interval: Duration,

    /// Maximum number of live entries in the in-memory replay cache.
    pub replay_cache_capacity: usize,

    /// Log the raw assertion at debug level. Never enable in production.
    pub log_sensitive_assertions: bool,
}

impl Default for PrivateKeyJwtConfig {
    fn default() -> Self {
        Self {
            token_endpoint_alias: None,
            token_endpoint_url: None,
            issuer: None,
            prevent_token_reuse: true,
            reject_before_minutes: DEFAULT_REJECT_BEFORE_MINUTES,
            enable_jti_cache: true,
            mandatory_claims: Vec::new(),
            allowed_algorithms: default_algorithms(),
            allow_shared_secret: false,
            clock_skew: Duration::ZERO,
            replay_sweep_interval: Duration::from_secs(60),
            replay_cache_capacity: DEFAULT_REPLAY_CACHE_CAPACITY,
            log_sensitive_assertions: false,
        }
    }
}

fn default_algorithms() -> Vec<String> {
    ["RS256", "RS384", "RS512", "PS256", "PS384", "PS512", "ES256", "ES384"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Configuration errors. All of them are fatal at initialization.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
}

impl PrivateKeyJwtConfig {
    /// Creates a configuration with the given token endpoint alias and
    /// default values for everything else.
    #[must_use]
    pub fn new(token_endpoint_alias: impl Into<String>) -> Self {
        Self {
            token_endpoint_alias: Some(token_endpoint_alias.into()),
            ..Self::default()
        }
    }

    /// Sets the expected issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Enables or disables replay prevention.
    #[must_use]
    pub fn with_prevent_token_reuse(mut self, enabled: bool) -> Self {
        self.prevent_token_reuse = enabled;
        self
    }

    /// Sets the maximum assertion age in minutes.
    #[must_use]
    pub fn with_reject_before_minutes(mut self, minutes: u32) -> Self {
        self.reject_before_minutes = minutes;
        self
    }

    /// Sets the mandatory claim names.
    #[must_use]
    pub fn with_mandatory_claims<I, S>(mut self, claims: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mandatory_claims = claims.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the accepted JWS algorithms.
    #[must_use]
    pub fn with_allowed_algorithms<I, S>(mut self, algorithms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_algorithms = algorithms.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the tolerated clock skew.
    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Sets the replay-cache sweep period.
    #[must_use]
    pub fn with_replay_sweep_interval(mut self, interval: Duration) -> Self {
        self.replay_sweep_interval = interval;
        self
    }

    /// Parses a TOML document. Type errors are fatal.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the document is malformed, or any
    /// error reported by [`validate`](Self::validate).
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise the
    /// errors of [`from_toml_str`](Self::from_toml_str).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let document = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&document)?;
        tracing::info!(path = %path.as_ref().display(), "Loaded private_key_jwt configuration");
        Ok(config)
    }

    /// Builds a configuration from a flat property map.
    ///
    /// `RejectBeforeInMinutes` and `ClockSkewInSeconds` must be non-negative
    /// integers when present; anything else is a fatal error. Boolean flags
    /// that fail to parse fall back to their defaults.
    ///
    /// An absent or malformed `PreventTokenReuse` keeps replay prevention
    /// on, where the legacy property semantics read it as `false`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a malformed numeric property,
    /// or any error reported by [`validate`](Self::validate).
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |name: &str| {
            properties
                .get(name)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
        };

        let reject_before_minutes = match get(property::REJECT_BEFORE_IN_MINUTES) {
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                ConfigError::InvalidValue(format!(
                    "{} must be a non-negative integer, got '{}'",
                    property::REJECT_BEFORE_IN_MINUTES,
                    raw
                ))
            })?,
            None => defaults.reject_before_minutes,
        };

        let clock_skew = match get(property::CLOCK_SKEW_IN_SECONDS) {
            Some(raw) => Duration::from_secs(raw.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue(format!(
                    "{} must be a non-negative integer, got '{}'",
                    property::CLOCK_SKEW_IN_SECONDS,
                    raw
                ))
            })?),
            None => defaults.clock_skew,
        };

        let flag = |name: &str, fallback: bool| match get(name) {
            Some(raw) => raw.parse::<bool>().unwrap_or_else(|_| {
                tracing::warn!(
                    property = name,
                    value = raw,
                    fallback,
                    "Ignoring malformed boolean property"
                );
                fallback
            }),
            None => fallback,
        };

        let list = |name: &str| {
            get(name).map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
        };

        let config = Self {
            token_endpoint_alias: get(property::TOKEN_ENDPOINT_ALIAS).map(String::from),
            token_endpoint_url: get(property::TOKEN_ENDPOINT_URL).map(String::from),
            issuer: get(property::ISSUER).map(String::from),
            prevent_token_reuse: flag(property::PREVENT_TOKEN_REUSE, defaults.prevent_token_reuse),
            reject_before_minutes,
            enable_jti_cache: flag(property::ENABLE_JTI_CACHE, defaults.enable_jti_cache),
            mandatory_claims: list(property::MANDATORY_CLAIMS).unwrap_or_default(),
            allowed_algorithms: list(property::ALLOWED_ALGORITHMS)
                .unwrap_or(defaults.allowed_algorithms),
            allow_shared_secret: flag(property::ALLOW_SHARED_SECRET, defaults.allow_shared_secret),
            clock_skew,
            replay_sweep_interval: defaults.replay_sweep_interval,
            replay_cache_capacity: defaults.replay_cache_capacity,
            log_sensitive_assertions: flag(
                property::LOG_SENSITIVE_ASSERTIONS,
                defaults.log_sensitive_assertions,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    /// Returns the audience value assertions must carry: the alias when
    /// configured, otherwise the token endpoint URL.
    #[must_use]
    pub fn expected_audience(&self) -> Option<&str> {
        self.token_endpoint_alias
            .as_deref()
            .or(self.token_endpoint_url.as_deref())
            .filter(|aud| !aud.is_empty())
    }

    /// Parses the configured algorithm names.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for unknown names, `none`, or an
    /// HMAC algorithm while shared secrets are not allowed.
    pub fn parsed_algorithms(&self) -> Result<Vec<Algorithm>, ConfigError> {
        let mut algorithms = Vec::with_capacity(self.allowed_algorithms.len());
        for name in &self.allowed_algorithms {
            let algorithm = Algorithm::from_str(name).map_err(|_| {
                ConfigError::InvalidValue(format!("Unsupported JWS algorithm: '{}'", name))
            })?;
            if is_hmac(algorithm) && !self.allow_shared_secret {
                return Err(ConfigError::InvalidValue(format!(
                    "Algorithm '{}' requires allow_shared_secret = true",
                    name
                )));
            }
            if !algorithms.contains(&algorithm) {
                algorithms.push(algorithm);
            }
        }
        Ok(algorithms)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no expected audience is configured,
    /// and `ConfigError::InvalidValue` if:
    /// - The token endpoint URL is not an absolute URL
    /// - The algorithm allow-list is empty or contains a rejected name
    /// - A mandatory claim name is empty
    /// - The sweep interval or replay cache capacity is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.expected_audience().is_none() {
            return Err(ConfigError::Missing(
                "token_endpoint_alias or token_endpoint_url".to_string(),
            ));
        }

        if let Some(ref endpoint) = self.token_endpoint_url {
            url::Url::parse(endpoint).map_err(|e| {
                ConfigError::InvalidValue(format!(
                    "token_endpoint_url '{}' is not a valid URL: {}",
                    endpoint, e
                ))
            })?;
        }

        if self.allowed_algorithms.is_empty() {
            return Err(ConfigError::InvalidValue(
                "allowed_algorithms cannot be empty".to_string(),
            ));
        }
        self.parsed_algorithms()?;

        if self.mandatory_claims.iter().any(|claim| claim.trim().is_empty()) {
            return Err(ConfigError::InvalidValue(
                "mandatory_claims cannot contain empty names".to_string(),
            ));
        }

        if self.replay_sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "replay_sweep_interval must be > 0".to_string(),
            ));
        }

        if self.replay_cache_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "replay_cache_capacity must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Returns `true` for the shared-secret (HMAC) algorithms.
#[must_use]
pub fn is_hmac(algorithm: Algorithm) -> bool {
    matches!(
        algorithm,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    )
}
