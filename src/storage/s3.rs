//! S3 adapter over the `object_store` crate.
//!
//! Constructed once at startup; construction failure is fatal since the site
//! cannot serve anything without a reachable bucket. The handle is cheap to
//! clone and safe for concurrent use.

use crate::config::StorageConfig;
use crate::error::SiteError;
use crate::storage::{StorageBackend, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct S3Storage {
    store: Arc<AmazonS3>,
}

impl S3Storage {
    /// Build the S3 client from the environment (credentials) and config
    /// (bucket, region).
    pub fn new(config: &StorageConfig) -> Result<Self, SiteError> {
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .build()
            .map_err(|e| SiteError::Config(format!("failed to build S3 client: {e}")))?;

        debug!(bucket = %config.bucket, region = %config.region, "S3 client ready");

        Ok(Self {
            store: Arc::new(store),
        })
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, SiteError> {
        let prefix_path = Path::from(prefix);
        let start = std::time::Instant::now();

        let metas = self
            .store
            .list(Some(&prefix_path))
            .try_collect::<Vec<_>>()
            .await?;

        debug!(
            prefix = prefix,
            objects = metas.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Listed bucket prefix"
        );

        Ok(metas
            .into_iter()
            .map(|meta| StoredObject {
                key: meta.location.to_string(),
                last_modified: meta.last_modified,
            })
            .collect())
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, SiteError> {
        let url = self
            .store
            .signed_url(Method::GET, &Path::from(key), ttl)
            .await?;
        Ok(url.to_string())
    }

    async fn get(&self, key: &str) -> Result<Bytes, SiteError> {
        let result = self.store.get(&Path::from(key)).await?;
        Ok(result.bytes().await?)
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), SiteError> {
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());

        self.store
            .put_opts(
                &Path::from(key),
                PutPayload::from(body),
                PutOptions {
                    attributes,
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SiteError> {
        self.store.delete(&Path::from(key)).await?;
        Ok(())
    }
}
