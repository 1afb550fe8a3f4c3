//! Embedded document database backed by sled.
//!
//! Each [`Table`] is a sled tree of JSON documents addressed by a generated
//! `u64` identity. The store has no internal concurrency: every operation,
//! including multi-step ones like overwrite-by-key, holds one lock for its
//! whole duration. Disk work runs on tokio's blocking pool.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{CredentialStore, Expiry, Record, Table};
use crate::error::{StoreError, StoreResult};

/// Identity of a stored document.
pub type DocId = u64;

/// Reserved field holding the [`CredentialStore`] key.
const KEY_FIELD: &str = "_key";
/// Reserved field holding the expiry deadline in Unix milliseconds.
const EXPIRES_FIELD: &str = "_expires_at";

/// A document together with its identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocId,
    pub body: Record,
}

/// Disk-backed document store with named tables.
pub struct DocumentStore {
    db: sled::Db,
    expiry: Expiry,
    lock: Mutex<()>,
}

impl DocumentStore {
    /// Open or create the database directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the database cannot be opened.
    pub fn open(path: impl AsRef<Path>, expiry: Expiry) -> StoreResult<Self> {
        let db = sled::open(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "Opened document database");
        Ok(Self { db, expiry, lock: Mutex::new(()) })
    }

    /// Insert a new document and return its identity.
    pub async fn insert(&self, table: Table, body: Record) -> StoreResult<DocId> {
        let _guard = self.lock.lock().await;
        self.blocking(move |db| insert_locked(db, table, &body)).await
    }

    /// Return every live document whose fields equal all `predicates`.
    ///
    /// An empty predicate list matches every document in the table. Expired
    /// documents met during the scan are deleted, matching or not.
    pub async fn search(&self, table: Table, predicates: &[(&str, &str)]) -> StoreResult<Vec<Document>> {
        let predicates = owned(predicates);
        let _guard = self.lock.lock().await;
        self.blocking(move |db| search_locked(db, table, &predicates)).await
    }

    /// Delete a document by identity. Deleting twice is a no-op.
    pub async fn remove_document(&self, table: Table, id: DocId) -> StoreResult<()> {
        let _guard = self.lock.lock().await;
        self.blocking(move |db| remove_locked(db, table, id)).await
    }

    /// Run sled work on the blocking pool. Callers hold `lock`.
    async fn blocking<T, F>(&self, work: F) -> StoreResult<T>
    where
        F: FnOnce(&sled::Db) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || work(&db))
            .await
            .map_err(|e| StoreError::unavailable(format!("document task failed: {e}")))?
    }
}

fn tree(db: &sled::Db, table: Table) -> StoreResult<sled::Tree> {
    Ok(db.open_tree(table.name())?)
}

fn insert_locked(db: &sled::Db, table: Table, body: &Record) -> StoreResult<DocId> {
    let tree = tree(db, table)?;
    let id = db.generate_id()?;
    tree.insert(id.to_be_bytes(), serde_json::to_vec(body)?)?;
    tree.flush()?;
    Ok(id)
}

fn search_locked(db: &sled::Db, table: Table, predicates: &[(String, String)]) -> StoreResult<Vec<Document>> {
    let tree = tree(db, table)?;
    let now = now_millis();
    let mut found = Vec::new();
    let mut purged = 0usize;

    for item in tree.iter() {
        let (key, value) = item?;
        let Some(id) = decode_id(&key) else {
            tracing::warn!(table = table.name(), "Skipping document with malformed identity");
            continue;
        };
        let body: Record = match serde_json::from_slice(&value) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(table = table.name(), id, error = %e, "Skipping corrupt document");
                continue;
            }
        };
        if is_expired(&body, now) {
            tree.remove(&key)?;
            purged += 1;
            continue;
        }
        if matches_all(&body, predicates) {
            found.push(Document { id, body });
        }
    }

    if purged > 0 {
        tree.flush()?;
        tracing::debug!(table = table.name(), purged, "Purged expired documents");
    }

    Ok(found)
}

fn remove_locked(db: &sled::Db, table: Table, id: DocId) -> StoreResult<()> {
    let tree = tree(db, table)?;
    if tree.remove(id.to_be_bytes())?.is_some() {
        tree.flush()?;
    }
    Ok(())
}

fn remove_key_locked(db: &sled::Db, table: Table, key: &str) -> StoreResult<()> {
    for doc in search_locked(db, table, &[(KEY_FIELD.to_owned(), key.to_owned())])? {
        remove_locked(db, table, doc.id)?;
    }
    Ok(())
}

#[async_trait]
impl CredentialStore for DocumentStore {
    async fn put(&self, table: Table, key: &str, record: Record) -> StoreResult<()> {
        let Value::Object(mut body) = record else {
            return Err(StoreError::InvalidRecord("document records must be JSON objects"));
        };
        body.insert(KEY_FIELD.to_owned(), Value::from(key));
        body.insert(
            EXPIRES_FIELD.to_owned(),
            self.expiry.ttl(table).map_or(Value::Null, |ttl| {
                let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
                Value::from(now_millis().saturating_add(ttl_ms))
            }),
        );

        let key = key.to_owned();
        let _guard = self.lock.lock().await;
        self.blocking(move |db| {
            remove_key_locked(db, table, &key)?;
            insert_locked(db, table, &Value::Object(body))?;
            Ok(())
        })
        .await
    }

    async fn get(&self, table: Table, key: &str) -> StoreResult<Option<Record>> {
        let predicates = [(KEY_FIELD.to_owned(), key.to_owned())];
        let _guard = self.lock.lock().await;
        let found = self.blocking(move |db| search_locked(db, table, &predicates)).await?;
        Ok(found.into_iter().next().map(|doc| strip_reserved(doc.body)))
    }

    async fn remove(&self, table: Table, key: &str) -> StoreResult<()> {
        let key = key.to_owned();
        let _guard = self.lock.lock().await;
        self.blocking(move |db| remove_key_locked(db, table, &key)).await
    }

    fn backend(&self) -> &'static str {
        "document"
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore").field("expiry", &self.expiry).finish()
    }
}

fn owned(predicates: &[(&str, &str)]) -> Vec<(String, String)> {
    predicates.iter().map(|(field, value)| ((*field).to_owned(), (*value).to_owned())).collect()
}

fn is_expired(body: &Record, now: i64) -> bool {
    body.get(EXPIRES_FIELD).and_then(Value::as_i64).is_some_and(|at| now >= at)
}

fn matches_all<F: AsRef<str>, V: AsRef<str>>(body: &Record, predicates: &[(F, V)]) -> bool {
    predicates
        .iter()
        .all(|(field, expected)| body.get(field.as_ref()).and_then(Value::as_str) == Some(expected.as_ref()))
}

fn strip_reserved(mut body: Record) -> Record {
    if let Value::Object(fields) = &mut body {
        fields.remove(KEY_FIELD);
        fields.remove(EXPIRES_FIELD);
    }
    body
}

fn decode_id(key: &[u8]) -> Option<DocId> {
    key.try_into().ok().map(DocId::from_be_bytes)
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_all_requires_every_predicate() {
        let body = serde_json::json!({"code": "abc", "client_id": "https://app.example"});
        assert!(matches_all::<&str, &str>(&body, &[]));
        assert!(matches_all(&body, &[("code", "abc")]));
        assert!(matches_all(&body, &[("code", "abc"), ("client_id", "https://app.example")]));
        assert!(!matches_all(&body, &[("code", "abc"), ("client_id", "https://other.example")]));
        assert!(!matches_all(&body, &[("missing", "abc")]));
    }

    #[test]
    fn test_strip_reserved() {
        let body = serde_json::json!({"me": "https://example.com/", "_key": "k", "_expires_at": 1});
        assert_eq!(strip_reserved(body), serde_json::json!({"me": "https://example.com/"}));
    }

    #[test]
    fn test_is_expired() {
        assert!(is_expired(&serde_json::json!({"_expires_at": 10}), 10));
        assert!(!is_expired(&serde_json::json!({"_expires_at": 11}), 10));
        assert!(!is_expired(&serde_json::json!({"_expires_at": null}), 10));
        assert!(!is_expired(&serde_json::json!({"code": "abc"}), 10));
    }

    #[test]
    fn test_decode_id() {
        assert_eq!(decode_id(&42u64.to_be_bytes()), Some(42));
        assert_eq!(decode_id(b"short"), None);
    }
}
