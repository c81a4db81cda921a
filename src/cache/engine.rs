//! Snapshot cache engine.
//!
//! One engine instance owns one snapshot: an atomically-replaceable `Arc` of
//! derived records. Readers clone the `Arc` and are never blocked by a refresh
//! in flight; writers replace the whole snapshot, never mutate it in place.
//! Refreshes are serialized by an async mutex, so concurrent triggers
//! converging on `refresh()` are safe and cannot pile up unboundedly (each
//! caller waits for at most one in-flight refresh).

use crate::error::SiteError;
use crate::metrics::SharedMetrics;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error};

/// Produces a fresh, fully-built record set from the backing storage.
#[async_trait]
pub trait RecordSource: Send + Sync + 'static {
    type Record: Clone + Send + Sync + 'static;

    async fn fetch(&self) -> Result<Vec<Self::Record>, SiteError>;
}

/// Trigger-facing seam: anything that can be asked to refresh now.
#[async_trait]
pub trait Refreshable: Send + Sync {
    async fn refresh(&self);
}

pub struct Cache<S: RecordSource> {
    name: &'static str,
    source: S,
    snapshot: RwLock<Arc<Vec<S::Record>>>,
    refresh_gate: Mutex<()>,
    metrics: Option<SharedMetrics>,
}

impl<S: RecordSource> Cache<S> {
    /// Create an engine with an empty snapshot. The boot sequence performs an
    /// eager first refresh before serving traffic; until one succeeds, readers
    /// see an empty list rather than an error.
    pub fn new(name: &'static str, source: S, metrics: Option<SharedMetrics>) -> Self {
        Self {
            name,
            source,
            snapshot: RwLock::new(Arc::new(Vec::new())),
            refresh_gate: Mutex::new(()),
            metrics,
        }
    }

    /// Current snapshot, immediately. Never triggers a refresh.
    pub async fn get(&self) -> Arc<Vec<S::Record>> {
        self.snapshot.read().await.clone()
    }

    /// Re-derive the snapshot from storage and publish it atomically.
    ///
    /// A failed fetch logs and leaves the previous snapshot untouched; the
    /// next scheduled trigger retries. Errors never reach callers.
    pub async fn refresh(&self) {
        let _gate = self.refresh_gate.lock().await;
        debug!(cache = self.name, "Refreshing snapshot");

        match self.source.fetch().await {
            Ok(records) => {
                let count = records.len();
                *self.snapshot.write().await = Arc::new(records);
                debug!(cache = self.name, records = count, "Snapshot replaced");
                if let Some(m) = &self.metrics {
                    m.record_refresh(self.name, "ok");
                    m.set_cache_records(self.name, count);
                }
            }
            Err(e) => {
                error!(cache = self.name, error = %e, "Refresh failed, keeping previous snapshot");
                if let Some(m) = &self.metrics {
                    m.record_refresh(self.name, "error");
                }
            }
        }
    }

}

#[async_trait]
impl<S: RecordSource> Refreshable for Cache<S> {
    async fn refresh(&self) {
        Cache::refresh(self).await;
    }
}
