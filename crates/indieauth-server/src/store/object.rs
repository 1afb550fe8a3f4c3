//! Remote object store for authorization codes.
//!
//! Talks to an S3-compatible endpoint with path-style addressing:
//! - `PUT {endpoint}/{bucket}/{key}` stores the JSON record
//! - `GET` fetches it, any failure other than a timeout reads as absence
//! - `DELETE` removes it, a missing object counts as removed
//!
//! Reads go through retry middleware with exponential backoff. Writes are
//! sent once so a slow upload is never issued twice.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use url::Url;

use super::{CredentialStore, Record, Table};
use crate::config::ObjectStoreConfig;
use crate::error::{StoreError, StoreResult};

/// Bucket-backed store for short-lived authorization codes.
pub struct ObjectStore {
    /// Client with retry middleware, used for `GET`.
    reader: ClientWithMiddleware,

    /// Plain client, used for `PUT` and `DELETE`.
    writer: Client,

    /// `{endpoint}/{bucket}`.
    bucket_url: Url,

    /// Per-request timeout, reported in `StoreError::Timeout`.
    timeout: Duration,
}

impl ObjectStore {
    /// Create a store for the configured bucket.
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is not a valid base URL or the HTTP client
    /// cannot be built.
    pub fn new(settings: &ObjectStoreConfig) -> StoreResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(ref token) = settings.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| StoreError::unavailable(format!("invalid object store token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let writer = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| StoreError::unavailable(format!("failed to build HTTP client: {e}")))?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(100), Duration::from_secs(2))
            .build_with_max_retries(settings.read_retries);

        let reader = ClientBuilder::new(writer.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        let mut bucket_url = Url::parse(&settings.endpoint)
            .map_err(|e| StoreError::unavailable(format!("invalid object store endpoint: {e}")))?;
        bucket_url
            .path_segments_mut()
            .map_err(|()| StoreError::unavailable("object store endpoint cannot be a base URL"))?
            .pop_if_empty()
            .push(&settings.bucket);

        Ok(Self { reader, writer, bucket_url, timeout: settings.timeout })
    }

    /// URL of the object holding `key`. The key is one percent-encoded path segment.
    fn object_url(&self, key: &str) -> StoreResult<Url> {
        let mut url = self.bucket_url.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::unavailable("object store endpoint cannot be a base URL"))?
            .push(key);
        Ok(url)
    }

    fn classify(&self, error: &reqwest::Error) -> StoreError {
        if error.is_timeout() {
            StoreError::Timeout(self.timeout)
        } else {
            StoreError::unavailable(error.to_string())
        }
    }
}

fn check_table(table: Table) -> StoreResult<()> {
    match table {
        Table::AuthCodes => Ok(()),
        Table::Tokens => Err(StoreError::UnsupportedTable(table.name())),
    }
}

#[async_trait]
impl CredentialStore for ObjectStore {
    async fn put(&self, table: Table, key: &str, record: Record) -> StoreResult<()> {
        check_table(table)?;
        let url = self.object_url(key)?;
        let body = serde_json::to_vec(&record)?;

        let response = self
            .writer
            .put(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::unavailable(format!("object upload failed with status {status}")));
        }

        tracing::debug!(table = table.name(), "Uploaded record to object store");
        Ok(())
    }

    async fn get(&self, table: Table, key: &str) -> StoreResult<Option<Record>> {
        check_table(table)?;
        let url = self.object_url(key)?;

        let response = match self.reader.get(url).send().await {
            Ok(response) => response,
            Err(reqwest_middleware::Error::Reqwest(e)) if e.is_timeout() => {
                return Err(StoreError::Timeout(self.timeout));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Object store read failed, treating as missing");
                return Ok(None);
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            tracing::warn!(status = %status, "Object store read rejected, treating as missing");
            return Ok(None);
        }

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) if e.is_timeout() => return Err(StoreError::Timeout(self.timeout)),
            Err(e) => {
                tracing::warn!(error = %e, "Object body unreadable, treating as missing");
                return Ok(None);
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(error = %e, "Object body is not valid JSON, treating as missing");
                Ok(None)
            }
        }
    }

    async fn remove(&self, table: Table, key: &str) -> StoreResult<()> {
        check_table(table)?;
        let url = self.object_url(key)?;

        let response = self.writer.delete(url).send().await.map_err(|e| self.classify(&e))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(StoreError::unavailable(format!("object delete failed with status {status}")))
        }
    }

    fn backend(&self) -> &'static str {
        "object"
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("bucket_url", &self.bucket_url.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}
