//! Credential storage for authorization-code grants and stateful tokens.
//!
//! Three interchangeable backends share the [`CredentialStore`] contract:
//! - [`MemoryStore`]: in-process TTL cache
//! - [`DocumentStore`]: embedded sled database with named tables
//! - [`ObjectStore`]: remote S3-compatible bucket (authorization codes only)
//!
//! `get` never fails for missing, expired or corrupt records; it reports
//! absence instead. Writes propagate backend failures.

mod document;
mod memory;
mod object;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{Config, StoreBackend};
use crate::error::StoreResult;

pub use document::{DocId, Document, DocumentStore};
pub use memory::MemoryStore;
pub use object::ObjectStore;

/// A stored record (a JSON object).
pub type Record = serde_json::Value;

/// Named key-space inside a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Authorization-code grants keyed by [`GrantKey`](crate::identity::GrantKey).
    AuthCodes,
    /// Stateful access tokens keyed by the token string.
    Tokens,
}

impl Table {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AuthCodes => "auth_codes",
            Self::Tokens => "tokens",
        }
    }
}

/// Per-table record lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    /// Lifetime of authorization codes.
    pub auth_codes: Duration,
    /// Lifetime of stored tokens; `None` never expires.
    pub tokens: Option<Duration>,
}

impl Expiry {
    #[must_use]
    pub const fn new(auth_codes: Duration, tokens: Option<Duration>) -> Self {
        Self { auth_codes, tokens }
    }

    /// Lifetime of records written to `table`.
    #[must_use]
    pub const fn ttl(&self, table: Table) -> Option<Duration> {
        match table {
            Table::AuthCodes => Some(self.auth_codes),
            Table::Tokens => self.tokens,
        }
    }
}

impl From<&Config> for Expiry {
    fn from(config: &Config) -> Self {
        Self::new(config.code_ttl, config.token_ttl)
    }
}

/// Key/value storage shared by the authorization and token endpoints.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Store or overwrite the record under `key`.
    async fn put(&self, table: Table, key: &str, record: Record) -> StoreResult<()>;

    /// Fetch the record under `key`, or `None` if missing or expired.
    async fn get(&self, table: Table, key: &str) -> StoreResult<Option<Record>>;

    /// Delete the record under `key`. Removing a missing key is not an error.
    async fn remove(&self, table: Table, key: &str) -> StoreResult<()>;

    /// Backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

/// Open the backend selected by `config`.
///
/// # Errors
///
/// Returns error if the backend cannot be initialized.
pub fn open(config: &Config) -> StoreResult<Arc<dyn CredentialStore>> {
    let expiry = Expiry::from(config);
    let store: Arc<dyn CredentialStore> = match &config.store {
        StoreBackend::Memory => Arc::new(MemoryStore::new(expiry)),
        StoreBackend::Document { path } => Arc::new(DocumentStore::open(path, expiry)?),
        StoreBackend::Object(settings) => Arc::new(ObjectStore::new(settings)?),
    };

    tracing::info!(backend = store.backend(), "Opened credential store");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        assert_eq!(Table::AuthCodes.name(), "auth_codes");
        assert_eq!(Table::Tokens.name(), "tokens");
    }

    #[test]
    fn test_expiry_per_table() {
        let expiry = Expiry::new(Duration::from_secs(120), None);
        assert_eq!(expiry.ttl(Table::AuthCodes), Some(Duration::from_secs(120)));
        assert_eq!(expiry.ttl(Table::Tokens), None);
    }
}
