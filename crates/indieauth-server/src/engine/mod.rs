//! IndieAuth protocol engine.
//!
//! Two steps share one [`Engine`]:
//! - authorization: render the consent prompt, verify a presented code, or
//!   approve the request and issue a new code
//! - token: redeem a code for an access token, or verify a bearer token
//!
//! All state lives in the [`CredentialStore`]; the engine itself only holds
//! immutable configuration and the lock that makes redemption linearizable.

mod authorization;
mod jwt;
mod token;
mod types;

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::{Config, TokenMode};
use crate::credentials::PasswordTable;
use crate::error::{AuthError, ConfigError};
use crate::store::{self, CredentialStore, Record};

pub use authorization::APPROVE;
pub use jwt::{AccessClaims, JwtSigner};
pub use types::{
    AuthorizationForm, AuthorizationOutcome, AuthorizationRequest, Grant, Identity, IssuedToken,
    ResponseType, StoredToken, TokenInfo, TokenRequest,
};

/// How redeemed codes turn into access tokens.
#[derive(Debug)]
pub enum TokenMinter {
    /// Signed JWTs; nothing is stored.
    Stateless(JwtSigner),
    /// Random opaque tokens kept in the `tokens` table.
    Stateful,
}

/// Authorization and token engine shared by all request handlers.
pub struct Engine {
    store: Arc<dyn CredentialStore>,
    minter: TokenMinter,
    passwords: Option<PasswordTable>,
    require_subject_match: bool,
    redeem_lock: Mutex<()>,
}

impl Engine {
    /// Create an engine without a password gate.
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, minter: TokenMinter) -> Self {
        Self {
            store,
            minter,
            passwords: None,
            require_subject_match: true,
            redeem_lock: Mutex::new(()),
        }
    }

    /// Require approvals to present a password matching `passwords`.
    #[must_use]
    pub fn with_passwords(mut self, passwords: PasswordTable) -> Self {
        self.passwords = Some(passwords);
        self
    }

    /// Whether the token request's `me` must match the grant's.
    #[must_use]
    pub fn with_subject_match(mut self, required: bool) -> Self {
        self.require_subject_match = required;
        self
    }

    /// Assemble the engine described by `config`: store, token mode and password table.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the store cannot be opened.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let minter = match &config.token_mode {
            TokenMode::Stateless { algorithm, secret, lifetime } => {
                TokenMinter::Stateless(JwtSigner::new(algorithm, secret.as_bytes(), *lifetime)?)
            }
            TokenMode::Stateful => TokenMinter::Stateful,
        };

        let mut engine = Self::new(store::open(config)?, minter)
            .with_subject_match(config.require_subject_match);

        if let Some(ref path) = config.passwords_path {
            engine = engine.with_passwords(PasswordTable::load(path, config.password_salt.clone())?);
        }

        tracing::info!(
            backend = engine.store.backend(),
            stateful_tokens = matches!(engine.minter, TokenMinter::Stateful),
            password_gate = engine.passwords.is_some(),
            "Engine ready"
        );

        Ok(engine)
    }

    /// The underlying credential store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Returns true when access tokens are kept in the store.
    #[must_use]
    pub const fn stores_tokens(&self) -> bool {
        matches!(self.minter, TokenMinter::Stateful)
    }

    /// Returns true when approvals must carry a password.
    #[must_use]
    pub const fn requires_password(&self) -> bool {
        self.passwords.is_some()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("backend", &self.store.backend())
            .field("minter", &self.minter)
            .field("passwords", &self.passwords)
            .field("require_subject_match", &self.require_subject_match)
            .finish()
    }
}

/// Decode a stored record, treating unreadable records as absent.
fn decode_record<T: serde::de::DeserializeOwned>(record: Option<Record>) -> Option<T> {
    let record = record?;
    match serde_json::from_value(record) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring corrupt record");
            None
        }
    }
}

/// Encode a record for the store.
fn encode_record<T: serde::Serialize>(value: &T) -> Result<Record, AuthError> {
    serde_json::to_value(value).map_err(|e| AuthError::StoreUnavailable(e.into()))
}
