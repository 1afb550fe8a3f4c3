//! Configuration for the IndieAuth server.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default values.
pub mod defaults {
    use std::time::Duration;

    /// Lifetime of an unredeemed authorization code (2 minutes).
    pub const CODE_TTL: Duration = Duration::from_secs(120);

    /// Signing algorithm for stateless tokens.
    pub const TOKEN_ALGORITHM: &str = "HS256";

    /// Scope granted when the client does not ask for one.
    pub const SCOPE: &str = "create";

    /// Request timeout for the remote object store.
    pub const OBJECT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Connection timeout for the remote object store.
    pub const OBJECT_STORE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Retries for idempotent object-store reads.
    pub const OBJECT_STORE_READ_RETRIES: u32 = 2;

    /// Interval of the in-memory expiry sweep.
    pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

    /// Listen address.
    pub const BIND_ADDR: &str = "127.0.0.1:8080";
}

/// How access tokens are represented.
#[derive(Clone)]
pub enum TokenMode {
    /// Signed JWTs, verified without a store lookup.
    Stateless {
        /// JWS algorithm name (`HS256`, `HS384`, `HS512`).
        algorithm: String,
        /// Shared signing secret.
        secret: String,
        /// Embedded expiry; `None` issues tokens without `exp`.
        lifetime: Option<Duration>,
    },
    /// Opaque random tokens kept in the `tokens` table.
    Stateful,
}

impl std::fmt::Debug for TokenMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stateless { algorithm, lifetime, .. } => f
                .debug_struct("Stateless")
                .field("algorithm", algorithm)
                .field("lifetime", lifetime)
                .finish(),
            Self::Stateful => f.write_str("Stateful"),
        }
    }
}

/// Remote object store connection settings.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// Base URL of the S3-compatible endpoint (path-style addressing).
    pub endpoint: String,
    /// Bucket holding authorization codes.
    pub bucket: String,
    /// Optional bearer token sent with every request.
    pub auth_token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Retries for reads; writes are never retried.
    pub read_retries: u32,
}

impl ObjectStoreConfig {
    /// Settings for `bucket` at `endpoint` with default timeouts.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            auth_token: None,
            timeout: defaults::OBJECT_STORE_TIMEOUT,
            connect_timeout: defaults::OBJECT_STORE_CONNECT_TIMEOUT,
            read_retries: defaults::OBJECT_STORE_READ_RETRIES,
        }
    }
}

/// Credential store selection.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    /// In-process TTL cache; nothing survives a restart.
    Memory,
    /// Embedded document database at `path`.
    Document {
        /// Database directory.
        path: PathBuf,
    },
    /// Remote object store (authorization codes only).
    Object(ObjectStoreConfig),
}

impl StoreBackend {
    /// Short name for logs and health output.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Document { .. } => "document",
            Self::Object(_) => "object",
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Access token representation.
    pub token_mode: TokenMode,

    /// Credential store backend.
    pub store: StoreBackend,

    /// Secret salt appended to passwords before hashing.
    pub password_salt: String,

    /// JSON file mapping normalized `me` URLs to password hashes.
    pub passwords_path: Option<PathBuf>,

    /// Refuse to start without a password file.
    pub require_password: bool,

    /// Require the token request's `me` to match the grant's.
    pub require_subject_match: bool,

    /// Lifetime of unredeemed authorization codes.
    pub code_ttl: Duration,

    /// Lifetime of stored tokens; `None` keeps them forever.
    pub token_ttl: Option<Duration>,
}

impl Config {
    /// Create a configuration with default store and TTL settings.
    #[must_use]
    pub fn new(token_mode: TokenMode, password_salt: impl Into<String>) -> Self {
        Self {
            token_mode,
            store: StoreBackend::Memory,
            password_salt: password_salt.into(),
            passwords_path: None,
            require_password: true,
            require_subject_match: true,
            code_ttl: defaults::CODE_TTL,
            token_ttl: None,
        }
    }

    /// Create a test configuration: stateless HS256 tokens, memory store, no password gate.
    #[must_use]
    pub fn for_testing() -> Self {
        let mut config = Self::new(
            TokenMode::Stateless {
                algorithm: defaults::TOKEN_ALGORITHM.to_string(),
                secret: "test-signing-secret".to_string(),
                lifetime: None,
            },
            "test-salt",
        );
        config.require_password = false;
        config
    }

    /// Check that the settings can be assembled into a running server.
    ///
    /// # Errors
    ///
    /// Returns error on missing secrets or incompatible combinations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let TokenMode::Stateless { algorithm, secret, .. } = &self.token_mode {
            if secret.is_empty() {
                return Err(ConfigError::Missing("token secret"));
            }
            if !algorithm.starts_with("HS") {
                return Err(ConfigError::invalid(
                    "token algorithm",
                    format!("{algorithm} is not a shared-secret algorithm"),
                ));
            }
        }

        if self.stores_tokens() && matches!(self.store, StoreBackend::Object(_)) {
            return Err(ConfigError::invalid(
                "store",
                "the object store only holds authorization codes; stateful tokens need memory or document storage",
            ));
        }

        if self.require_password && self.passwords_path.is_none() {
            return Err(ConfigError::Missing("password file"));
        }

        if self.passwords_path.is_some() && self.password_salt.is_empty() {
            return Err(ConfigError::Missing("password salt"));
        }

        if self.code_ttl.is_zero() {
            return Err(ConfigError::invalid("code ttl", "must be greater than zero"));
        }

        Ok(())
    }

    /// Returns true when access tokens are kept in the store.
    #[must_use]
    pub const fn stores_tokens(&self) -> bool {
        matches!(self.token_mode, TokenMode::Stateful)
    }
}
