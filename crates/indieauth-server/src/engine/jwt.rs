//! Stateless access tokens signed with a shared secret.

use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::types::ResponseType;
use crate::error::{AuthError, AuthResult, ConfigError};

/// Claims embedded in an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub me: String,
    pub client_id: String,
    pub scope: String,
    pub response_type: ResponseType,
    /// Issuance time, Unix seconds.
    pub iat: i64,
    /// Fresh per issuance so two tokens for the same grant data never coincide.
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Signs and verifies access tokens.
pub struct JwtSigner {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Option<Duration>,
}

impl JwtSigner {
    /// Create a signer for an HMAC algorithm (`HS256`, `HS384`, `HS512`).
    ///
    /// # Errors
    ///
    /// Returns error for unknown or non-HMAC algorithms and empty secrets.
    pub fn new(algorithm: &str, secret: &[u8], lifetime: Option<Duration>) -> Result<Self, ConfigError> {
        let algorithm = Algorithm::from_str(algorithm)
            .map_err(|e| ConfigError::invalid("token algorithm", format!("{algorithm}: {e}")))?;
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ConfigError::invalid(
                "token algorithm",
                format!("{algorithm:?} needs a key pair, only HS256/HS384/HS512 are supported"),
            ));
        }
        if secret.is_empty() {
            return Err(ConfigError::Missing("token secret"));
        }

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            lifetime,
        })
    }

    /// Build claims for a new token issued now.
    #[must_use]
    pub fn claims(&self, me: &str, client_id: &str, scope: &str, response_type: ResponseType) -> AccessClaims {
        let now = chrono::Utc::now().timestamp();
        let exp = self.lifetime.map(|lifetime| {
            now.saturating_add(i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX))
        });

        AccessClaims {
            me: me.to_owned(),
            client_id: client_id.to_owned(),
            scope: scope.to_owned(),
            response_type,
            iat: now,
            nonce: uuid::Uuid::new_v4().to_string(),
            exp,
        }
    }

    /// Sign `claims` into a compact JWT.
    pub fn sign(&self, claims: &AccessClaims) -> AuthResult<String> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Verify signature and expiry, returning the embedded claims.
    ///
    /// Any signature, format or expiry problem is `InvalidToken`.
    pub fn verify(&self, token: &str) -> AuthResult<AccessClaims> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.required_spec_claims.clear();
        validation.validate_exp = self.lifetime.is_some();
        if validation.validate_exp {
            validation.set_required_spec_claims(&["exp"]);
        }

        decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected access token");
                AuthError::InvalidToken
            })
    }
}

impl std::fmt::Debug for JwtSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSigner")
            .field("algorithm", &self.algorithm)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}
