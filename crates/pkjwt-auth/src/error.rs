//! Client authentication error types.
//!
//! Only one error ever reaches the grant pipeline from the authenticator:
//! `invalid_request`, raised when the client assertion is missing or cannot
//! be parsed. Every other failure in the validation chain resolves to a plain
//! `false` and is recorded through `tracing` with a
//! [`RejectionReason`](crate::claims::RejectionReason).

use crate::config::ConfigError;

/// Errors surfaced by the authenticator and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request is missing a required parameter or carries a malformed one.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// An error occurred in a storage collaborator (key registry, replay store).
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// The authenticator configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AuthError {
    /// Shorthand for [`AuthError::InvalidRequest`].
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns the OAuth 2.0 error code (RFC 6749 Section 5.2) for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Storage { .. } | Self::Configuration { .. } => "server_error",
        }
    }

    /// `true` for errors caused by the client request.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest { .. })
    }

    /// `true` for errors on the authorization server side.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}
