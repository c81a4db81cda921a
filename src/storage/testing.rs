//! In-memory storage backend for tests.

use crate::error::SiteError;
use crate::storage::{StorageBackend, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct MemoryStorage {
    pub objects: Mutex<Vec<StoredObject>>,
    pub bodies: Mutex<HashMap<String, Bytes>>,
    /// Keys for which signed-URL minting fails.
    pub unsignable: HashSet<String>,
    /// When set, every list call fails.
    pub fail_listing: bool,
    pub list_calls: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects(keys: &[(&str, DateTime<Utc>)]) -> Self {
        let storage = Self::new();
        {
            let mut objects = storage.objects.lock().unwrap();
            for (key, last_modified) in keys {
                objects.push(StoredObject {
                    key: key.to_string(),
                    last_modified: *last_modified,
                });
            }
        }
        storage
    }

    pub fn insert_body(&self, key: &str, body: &str) {
        self.bodies
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::copy_from_slice(body.as_bytes()));
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, SiteError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing {
            return Err(SiteError::Storage("listing unavailable".into()));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn signed_url(&self, key: &str, _ttl: Duration) -> Result<String, SiteError> {
        if self.unsignable.contains(key) {
            return Err(SiteError::Storage(format!("cannot sign {key}")));
        }
        Ok(format!("https://signed.example/{key}"))
    }

    async fn get(&self, key: &str) -> Result<Bytes, SiteError> {
        self.bodies
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| SiteError::Storage(format!("no such object: {key}")))
    }

    async fn put(&self, key: &str, body: Bytes, _content_type: &str) -> Result<(), SiteError> {
        self.bodies.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SiteError> {
        self.objects.lock().unwrap().retain(|o| o.key != key);
        self.bodies.lock().unwrap().remove(key);
        Ok(())
    }
}
