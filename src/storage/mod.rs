//! Storage listing source.
//!
//! The cache consumes object storage through the [`StorageBackend`] trait:
//! listing under a prefix, minting time-limited signed retrieval URLs, and the
//! get/put/delete operations the mutation paths need. The production adapter
//! lives in [`s3`]; tests substitute their own implementations.

pub mod s3;
#[cfg(test)]
pub mod testing;

use crate::error::SiteError;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// A single object as returned by a listing: key plus modification time.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// List all objects under the given key prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, SiteError>;

    /// Mint a time-limited signed retrieval URL for one object.
    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, SiteError>;

    /// Fetch an object's body.
    async fn get(&self, key: &str) -> Result<Bytes, SiteError>;

    /// Store an object with the given content type.
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), SiteError>;

    /// Delete an object.
    async fn delete(&self, key: &str) -> Result<(), SiteError>;
}
