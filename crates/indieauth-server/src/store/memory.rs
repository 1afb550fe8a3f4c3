//! In-process TTL cache.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{CredentialStore, Expiry, Record, Table};
use crate::config::defaults;
use crate::error::StoreResult;

struct Entry {
    record: Record,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

type Tables = Mutex<HashMap<Table, HashMap<String, Entry>>>;

/// Mutex-guarded map with per-entry expiry.
///
/// Expired entries are invisible to `get` as soon as their deadline passes and
/// are physically dropped either on that read or by a periodic sweep. The sweep
/// task lives exactly as long as the store.
pub struct MemoryStore {
    tables: Arc<Tables>,
    expiry: Expiry,
    sweeper: Option<JoinHandle<()>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(expiry: Expiry) -> Self {
        Self::with_sweep_interval(expiry, defaults::SWEEP_INTERVAL)
    }

    /// Create a store whose expiry sweep runs every `interval`.
    ///
    /// Outside a Tokio runtime no sweep is started; expiry is still enforced on read.
    #[must_use]
    pub fn with_sweep_interval(expiry: Expiry, interval: Duration) -> Self {
        let tables = Arc::new(Mutex::new(HashMap::new()));
        let sweeper = tokio::runtime::Handle::try_current()
            .ok()
            .map(|handle| handle.spawn(sweep_expired(Arc::downgrade(&tables), interval)));

        Self { tables, expiry, sweeper }
    }

    /// Number of live (unexpired) records in `table`.
    pub async fn len(&self, table: Table) -> usize {
        let now = Instant::now();
        let tables = self.tables.lock().await;
        tables
            .get(&table)
            .map(|entries| entries.values().filter(|e| !e.is_expired(now)).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn put(&self, table: Table, key: &str, record: Record) -> StoreResult<()> {
        let expires_at = self.expiry.ttl(table).map(|ttl| Instant::now() + ttl);
        let mut tables = self.tables.lock().await;
        tables.entry(table).or_default().insert(key.to_owned(), Entry { record, expires_at });
        Ok(())
    }

    async fn get(&self, table: Table, key: &str) -> StoreResult<Option<Record>> {
        let now = Instant::now();
        let mut tables = self.tables.lock().await;
        let Some(entries) = tables.get_mut(&table) else {
            return Ok(None);
        };

        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|entry| entry.record.clone()))
    }

    async fn remove(&self, table: Table, key: &str) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if let Some(entries) = tables.get_mut(&table) {
            entries.remove(key);
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").field("expiry", &self.expiry).finish()
    }
}

async fn sweep_expired(tables: Weak<Tables>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(tables) = tables.upgrade() else {
            break;
        };

        let now = Instant::now();
        let mut tables = tables.lock().await;
        for (table, entries) in tables.iter_mut() {
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now));
            let removed = before - entries.len();
            if removed > 0 {
                tracing::debug!(table = table.name(), count = removed, "Swept expired records");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expiry() -> Expiry {
        Expiry::new(Duration::from_secs(120), None)
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_code_expires_after_ttl() {
        let store = MemoryStore::new(expiry());
        store.put(Table::AuthCodes, "k", serde_json::json!({"code": "k"})).await.unwrap();

        tokio::time::advance(Duration::from_secs(119)).await;
        assert!(store.get(Table::AuthCodes, "k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get(Table::AuthCodes, "k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_without_ttl_never_expire() {
        let store = MemoryStore::new(expiry());
        store.put(Table::Tokens, "t", serde_json::json!({"access_token": "t"})).await.unwrap();

        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;
        assert!(store.get(Table::Tokens, "t").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_expired_entries() {
        let store = MemoryStore::with_sweep_interval(expiry(), Duration::from_secs(30));
        // Let the sweeper start its interval at t=0.
        settle().await;
        store.put(Table::AuthCodes, "k", serde_json::json!({})).await.unwrap();
        assert_eq!(store.len(Table::AuthCodes).await, 1);

        for _ in 0..6 {
            tokio::time::advance(Duration::from_secs(30)).await;
            settle().await;
        }

        let tables = store.tables.lock().await;
        assert!(tables.get(&Table::AuthCodes).is_none_or(HashMap::is_empty));
    }

    #[tokio::test]
    async fn test_tables_are_isolated() {
        let store = MemoryStore::new(expiry());
        store.put(Table::AuthCodes, "same", serde_json::json!({"t": "codes"})).await.unwrap();
        store.put(Table::Tokens, "same", serde_json::json!({"t": "tokens"})).await.unwrap();

        let code = store.get(Table::AuthCodes, "same").await.unwrap().unwrap();
        assert_eq!(code["t"], "codes");

        store.remove(Table::Tokens, "same").await.unwrap();
        store.remove(Table::Tokens, "same").await.unwrap();
        assert!(store.get(Table::Tokens, "same").await.unwrap().is_none());
        assert!(store.get(Table::AuthCodes, "same").await.unwrap().is_some());
    }
}
