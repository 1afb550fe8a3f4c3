//! Subject normalization and grant key derivation.

use std::fmt;

/// Normalize a `me` URL so it always ends with `/`.
///
/// Applied on every read and write so that comparisons never depend on
/// trailing-slash variation.
#[must_use]
pub fn normalize_me(me: &str) -> String {
    if me.ends_with('/') {
        me.to_owned()
    } else {
        format!("{me}/")
    }
}

/// Check that `value` parses as an absolute URL.
pub(crate) fn is_absolute_url(value: &str) -> bool {
    url::Url::parse(value).is_ok_and(|url| url.has_host())
}

/// Store key for an authorization-code grant.
///
/// The key is `code`, `redirect_uri` and `client_id` concatenated in that
/// order with no delimiter, so records written by one endpoint are found by
/// the other. Two distinct triples can collide when one field's suffix moves
/// into the next field's prefix (`("ab", "c", ..)` vs `("a", "bc", ..)`).
/// Codes are fixed-length UUIDs in practice, which keeps the boundary stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrantKey(String);

impl GrantKey {
    #[must_use]
    pub fn new(code: &str, redirect_uri: &str, client_id: &str) -> Self {
        let mut key = String::with_capacity(code.len() + redirect_uri.len() + client_id.len());
        key.push_str(code);
        key.push_str(redirect_uri);
        key.push_str(client_id);
        Self(key)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GrantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
