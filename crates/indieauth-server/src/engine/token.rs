//! Token step: code redemption and bearer token verification.

use super::types::{Grant, IssuedToken, ResponseType, StoredToken, TokenInfo, TokenRequest};
use super::{Engine, TokenMinter, decode_record, encode_record};
use crate::error::{AuthError, AuthResult};
use crate::identity::{GrantKey, normalize_me};
use crate::store::Table;

impl Engine {
    /// Verify the bearer token in an `Authorization` header value.
    ///
    /// Identification-only tokens (`response_type = id`) are never accepted as
    /// access tokens.
    pub async fn verify(&self, authorization: Option<&str>) -> AuthResult<TokenInfo> {
        let token = bearer_token(authorization).ok_or(AuthError::InvalidToken)?;

        match &self.minter {
            TokenMinter::Stateless(signer) => {
                let claims = signer.verify(token)?;
                if claims.response_type == ResponseType::Id {
                    tracing::debug!(client_id = %claims.client_id, "Rejected identification token");
                    return Err(AuthError::InvalidToken);
                }
                Ok(TokenInfo {
                    me: normalize_me(&claims.me),
                    client_id: claims.client_id,
                    scope: claims.scope,
                })
            }
            TokenMinter::Stateful => {
                let stored: Option<StoredToken> =
                    decode_record(self.store.get(Table::Tokens, token).await?);
                let stored = stored.ok_or(AuthError::InvalidToken)?;
                if stored.response_type == ResponseType::Id {
                    tracing::debug!(client_id = %stored.client_id, "Rejected identification token");
                    return Err(AuthError::InvalidToken);
                }
                Ok(TokenInfo {
                    me: normalize_me(&stored.me),
                    client_id: stored.client_id,
                    scope: stored.scope,
                })
            }
        }
    }

    /// Exchange an authorization code for an access token.
    ///
    /// The grant is consumed only after the token is minted (and, for stateful
    /// tokens, stored). If consuming fails, the stored token is rolled back and
    /// the grant stays redeemable.
    pub async fn redeem(&self, request: TokenRequest) -> AuthResult<IssuedToken> {
        let key = GrantKey::new(&request.code, &request.redirect_uri, &request.client_id);
        let _guard = self.redeem_lock.lock().await;

        let Some(grant) = decode_record::<Grant>(self.store.get(Table::AuthCodes, key.as_str()).await?) else {
            tracing::debug!(client_id = %request.client_id, "Token requested for unknown code");
            return Err(AuthError::InvalidCode);
        };

        let me = normalize_me(&grant.me);
        if self.require_subject_match && normalize_me(&request.me) != me {
            tracing::info!(client_id = %request.client_id, "Token requested for a different user");
            return Err(AuthError::InvalidCode);
        }

        let access_token = match &self.minter {
            TokenMinter::Stateless(signer) => {
                signer.sign(&signer.claims(&me, &grant.client_id, &grant.scope, grant.response_type))?
            }
            TokenMinter::Stateful => {
                let token = generate_token();
                let stored = StoredToken {
                    me: me.clone(),
                    client_id: grant.client_id.clone(),
                    scope: grant.scope.clone(),
                    access_token: token.clone(),
                    response_type: grant.response_type,
                };
                self.store.put(Table::Tokens, &token, encode_record(&stored)?).await?;
                token
            }
        };

        if let Err(e) = self.store.remove(Table::AuthCodes, key.as_str()).await {
            tracing::error!(error = %e, client_id = %grant.client_id, "Failed to consume authorization code");
            if self.stores_tokens() {
                if let Err(rollback) = self.store.remove(Table::Tokens, &access_token).await {
                    tracing::error!(error = %rollback, "Failed to roll back issued token");
                }
            }
            return Err(e.into());
        }

        tracing::info!(client_id = %grant.client_id, scope = %grant.scope, "Issued access token");

        Ok(IssuedToken { me, scope: grant.scope, access_token })
    }
}

/// Extract the token from `Bearer <token>`. The scheme is case-insensitive.
fn bearer_token(header: Option<&str>) -> Option<&str> {
    let (scheme, token) = header?.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty() && !token.contains(char::is_whitespace)).then_some(token)
}

/// Random opaque token (256 bits, hex).
fn generate_token() -> String {
    format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
}
