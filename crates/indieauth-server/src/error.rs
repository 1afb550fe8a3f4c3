//! Error types for the IndieAuth server.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.

use std::time::Duration;

/// Errors from a credential store backend.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Remote backend did not answer within the configured bound
    #[error("Store request timed out after {0:?}")]
    Timeout(Duration),

    /// Backend rejected or failed the request (network, non-success status, ...)
    #[error("Store backend unavailable: {0}")]
    Unavailable(String),

    /// Embedded document database error
    #[error("Document database error: {0}")]
    Database(#[from] sled::Error),

    /// Record could not be encoded
    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record has a shape the backend cannot hold
    #[error("Invalid record: {0}")]
    InvalidRecord(&'static str),

    /// The backend does not host this table
    #[error("Table '{0}' is not supported by this backend")]
    UnsupportedTable(&'static str),
}

impl StoreError {
    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Returns true if this error came from a timed-out request.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Errors from the authorization and token engine.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    /// Supplied password does not match the stored hash
    #[error("Invalid password")]
    InvalidCredentials,

    /// Authorization code is unknown, expired or already consumed
    #[error("Invalid authorization code")]
    InvalidCode,

    /// Bearer token is missing, malformed, unverifiable or not an access token
    #[error("Invalid token")]
    InvalidToken,

    /// Request parameters are malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Credential store failed
    #[error("Credential store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Token could not be signed
    #[error("Failed to sign token: {0}")]
    Signing(String),
}

impl AuthError {
    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// HTTP status code the boundary layer reports for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidCredentials | Self::InvalidToken => 403,
            Self::InvalidCode => 401,
            Self::InvalidRequest(_) => 400,
            Self::StoreUnavailable(_) | Self::Signing(_) => 500,
        }
    }

    /// OAuth-style error code for response bodies.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "access_denied",
            Self::InvalidCode => "invalid_grant",
            Self::InvalidToken => "invalid_token",
            Self::InvalidRequest(_) => "invalid_request",
            Self::StoreUnavailable(_) | Self::Signing(_) => "server_error",
        }
    }

    /// Returns true for unexpected failures that should be logged as server errors.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Signing(_))
    }

    /// Returns true if an idempotent read may be retried.
    ///
    /// Code issuance and token redemption are writes and are never retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(StoreError::Timeout(_)))
    }
}

/// Errors raised while assembling the server from configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A required setting is missing or empty
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    /// A setting has an unusable value
    #[error("Invalid configuration for '{field}': {message}")]
    Invalid {
        /// Setting that failed validation
        field: &'static str,
        /// Why the value was rejected
        message: String,
    },

    /// Password file could not be read or parsed
    #[error("Failed to load password file: {0}")]
    PasswordFile(String),

    /// Store backend could not be opened
    #[error("Failed to open credential store: {0}")]
    Store(#[from] StoreError),
}

impl ConfigError {
    /// Create an invalid setting error.
    #[must_use]
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid { field, message: message.into() }
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for engine operations.
pub type AuthResult<T> = Result<T, AuthError>;
