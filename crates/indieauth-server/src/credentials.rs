//! Password verification against a salted SHA-256 hash table.

use std::collections::HashMap;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::ConfigError;
use crate::identity::normalize_me;

/// Hash a password the way the password file stores it.
///
/// Computes `HEX(SHA256(password ++ salt))`.
#[must_use]
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Password hashes keyed by normalized `me`, loaded once at startup.
#[derive(Clone)]
pub struct PasswordTable {
    hashes: HashMap<String, String>,
    salt: String,
}

impl PasswordTable {
    /// Create an empty table using `salt`.
    #[must_use]
    pub fn new(salt: impl Into<String>) -> Self {
        Self { hashes: HashMap::new(), salt: salt.into() }
    }

    /// Load a JSON object of `{"<me>": "<hex hash>"}` from `path`.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a string map.
    pub fn load(path: impl AsRef<Path>, salt: impl Into<String>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::PasswordFile(format!("{}: {e}", path.display())))?;
        let entries: HashMap<String, String> = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::PasswordFile(format!("{}: {e}", path.display())))?;

        let mut table = Self::new(salt);
        for (me, hash) in entries {
            table.insert_hash(&me, hash);
        }

        tracing::info!(path = %path.display(), users = table.len(), "Loaded password file");
        Ok(table)
    }

    /// Register a precomputed hash for `me`.
    pub fn insert_hash(&mut self, me: &str, hash: impl Into<String>) {
        self.hashes.insert(normalize_me(me), hash.into().to_ascii_lowercase());
    }

    /// Hash `password` with this table's salt and register it for `me`.
    pub fn insert_password(&mut self, me: &str, password: &str) {
        let hash = hash_password(password, &self.salt);
        self.insert_hash(me, hash);
    }

    /// Check `password` for `me`.
    ///
    /// Unknown users still pay for a hash and a full-length comparison.
    #[must_use]
    pub fn verify(&self, me: &str, password: &str) -> bool {
        let computed = hash_password(password, &self.salt);
        let Some(stored) = self.hashes.get(&normalize_me(me)) else {
            let _ = constant_time_eq(computed.as_bytes(), computed.as_bytes());
            return false;
        };
        constant_time_eq(computed.as_bytes(), stored.as_bytes())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

impl std::fmt::Debug for PasswordTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordTable").field("users", &self.hashes.len()).finish()
    }
}

/// Compare two byte strings without short-circuiting on the first difference.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
