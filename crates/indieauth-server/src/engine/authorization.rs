//! Authorization step: consent prompt, code verification and code issuance.

use url::Url;

use super::types::{AuthorizationForm, AuthorizationOutcome, AuthorizationRequest, Grant, Identity};
use super::{Engine, decode_record, encode_record};
use crate::config::defaults;
use crate::error::{AuthError, AuthResult};
use crate::identity::{GrantKey, is_absolute_url, normalize_me};
use crate::store::Table;

/// Value of the `approve` field that grants the request.
pub const APPROVE: &str = "Approve";

impl Engine {
    /// Validate a prompt request and normalize its `me`.
    ///
    /// Read-only; the returned parameters are what the consent screen shows.
    pub fn prompt(&self, request: AuthorizationRequest) -> AuthResult<AuthorizationRequest> {
        validate_urls(&request.me, &request.client_id, &request.redirect_uri)?;
        Ok(AuthorizationRequest { me: normalize_me(&request.me), ..request })
    }

    /// Handle a POST to the authorization endpoint.
    pub async fn authorize(&self, form: AuthorizationForm) -> AuthResult<AuthorizationOutcome> {
        if let Some(ref code) = form.code {
            let identity = self.verify_code(code, &form.redirect_uri, &form.client_id).await?;
            return Ok(AuthorizationOutcome::Verified(identity));
        }

        if form.approve.as_deref() == Some(APPROVE) {
            return self.approve(form).await;
        }

        Err(AuthError::invalid_request("expected either `code` or `approve=Approve`"))
    }

    /// Look up the grant for a presented code and return its user.
    ///
    /// The grant is left in place; only the token step consumes it.
    pub async fn verify_code(&self, code: &str, redirect_uri: &str, client_id: &str) -> AuthResult<Identity> {
        let key = GrantKey::new(code, redirect_uri, client_id);
        let grant: Option<Grant> = decode_record(self.store.get(Table::AuthCodes, key.as_str()).await?);

        match grant {
            Some(grant) => {
                tracing::debug!(client_id = %client_id, "Verified authorization code");
                Ok(Identity { me: normalize_me(&grant.me) })
            }
            None => {
                tracing::debug!(client_id = %client_id, "Unknown authorization code");
                Err(AuthError::InvalidCode)
            }
        }
    }

    async fn approve(&self, form: AuthorizationForm) -> AuthResult<AuthorizationOutcome> {
        let me = form.me.as_deref().ok_or_else(|| AuthError::invalid_request("missing `me`"))?;
        validate_urls(me, &form.client_id, &form.redirect_uri)?;
        let me = normalize_me(me);

        if let Some(ref passwords) = self.passwords {
            if !passwords.verify(&me, form.password.as_deref().unwrap_or_default()) {
                tracing::info!(me = %me, client_id = %form.client_id, "Rejected approval with invalid password");
                return Err(AuthError::InvalidCredentials);
            }
        }

        let grant = Grant {
            me,
            client_id: form.client_id,
            redirect_uri: form.redirect_uri,
            state: form.state,
            response_type: form.response_type,
            scope: form.scope.unwrap_or_else(|| defaults::SCOPE.to_string()),
            code: uuid::Uuid::new_v4().to_string(),
        };
        let location = redirect_location(&grant.redirect_uri, &grant.code, grant.state.as_deref())?;

        self.store
            .put(Table::AuthCodes, grant.key().as_str(), encode_record(&grant)?)
            .await?;

        tracing::info!(
            client_id = %grant.client_id,
            response_type = grant.response_type.as_str(),
            scope = %grant.scope,
            "Issued authorization code"
        );

        Ok(AuthorizationOutcome::Redirect { location, code: grant.code })
    }
}

fn validate_urls(me: &str, client_id: &str, redirect_uri: &str) -> AuthResult<()> {
    for (field, value) in [("me", me), ("client_id", client_id), ("redirect_uri", redirect_uri)] {
        if !is_absolute_url(value) {
            return Err(AuthError::invalid_request(format!("`{field}` must be an absolute URL")));
        }
    }
    Ok(())
}

/// `redirect_uri` with `code` and `state` appended to its query string.
fn redirect_location(redirect_uri: &str, code: &str, state: Option<&str>) -> AuthResult<String> {
    let mut url = Url::parse(redirect_uri)
        .map_err(|e| AuthError::invalid_request(format!("`redirect_uri` is not a URL: {e}")))?;
    url.query_pairs_mut()
        .append_pair("code", code)
        .append_pair("state", state.unwrap_or_default());
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_location() {
        let location = redirect_location("https://app.example/cb", "abc", Some("xyz")).unwrap();
        assert_eq!(location, "https://app.example/cb?code=abc&state=xyz");
    }

    #[test]
    fn test_redirect_location_keeps_query_and_encodes_state() {
        let location = redirect_location("https://app.example/cb?v=1", "abc", Some("a b&c")).unwrap();
        assert_eq!(location, "https://app.example/cb?v=1&code=abc&state=a+b%26c");
    }

    #[test]
    fn test_redirect_location_empty_state() {
        let location = redirect_location("https://app.example/cb", "abc", None).unwrap();
        assert_eq!(location, "https://app.example/cb?code=abc&state=");
    }

    #[test]
    fn test_validate_urls_names_field() {
        let err = validate_urls("https://example.com", "app", "https://app.example/cb").unwrap_err();
        assert!(err.to_string().contains("client_id"));
    }
}
