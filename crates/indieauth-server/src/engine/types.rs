//! Request and record types for the authorization and token endpoints.

use serde::{Deserialize, Serialize};

use crate::config::defaults;
use crate::identity::GrantKey;

/// What the client asked the authorization endpoint for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Identification only; the code is verified at the authorization endpoint.
    #[default]
    Id,
    /// Authorization; the code is exchanged for an access token.
    Code,
}

impl ResponseType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Code => "code",
        }
    }
}

fn default_scope() -> String {
    defaults::SCOPE.to_string()
}

/// Parameters of an authorization request, as shown on the consent screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub me: String,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub response_type: ResponseType,
    #[serde(default = "default_scope")]
    pub scope: String,
}

/// Form posted to the authorization endpoint.
///
/// With `code`, the client verifies an authorization code. With
/// `approve=Approve`, the user approves the request and a code is issued.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizationForm {
    #[serde(default)]
    pub me: Option<String>,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub response_type: ResponseType,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub approve: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Result of a successful authorization POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    /// A presented code matched; the user is `me`.
    Verified(Identity),
    /// A new code was issued; send the user agent to `location`.
    Redirect {
        location: String,
        code: String,
    },
}

/// `{me}` response of a verified authorization code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub me: String,
}

/// An approved authorization awaiting redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub me: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub state: Option<String>,
    pub response_type: ResponseType,
    pub scope: String,
    pub code: String,
}

impl Grant {
    /// Store key derived from `(code, redirect_uri, client_id)`.
    #[must_use]
    pub fn key(&self) -> GrantKey {
        GrantKey::new(&self.code, &self.redirect_uri, &self.client_id)
    }
}

/// Form posted to the token endpoint to redeem a code.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub code: String,
    pub me: String,
    pub redirect_uri: String,
    pub client_id: String,
}

/// `{me, scope, access_token}` response of a redeemed code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub me: String,
    pub scope: String,
    pub access_token: String,
}

/// `{me, client_id, scope}` response of a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub me: String,
    pub client_id: String,
    pub scope: String,
}

/// A stateful token as kept in the `tokens` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub me: String,
    pub client_id: String,
    pub scope: String,
    pub access_token: String,
    pub response_type: ResponseType,
}
