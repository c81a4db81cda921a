//! Mutation paths: upload and delete for audio and sheet-music assets.
//!
//! Each successful mutation fires the on-demand refresh trigger synchronously
//! so the next read reflects the change without waiting for the ticker.

use crate::cache::engine::Refreshable;
use crate::cache::sheetmusic::{normalize_dropbox_url, slugify, SheetMusicJson};
use crate::error::SiteError;
use crate::storage::StorageBackend;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub struct AdminOps {
    storage: Arc<dyn StorageBackend>,
    audio_cache: Arc<dyn Refreshable>,
    sheet_cache: Arc<dyn Refreshable>,
    audio_prefix: String,
    sheet_prefix: String,
}

impl AdminOps {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        audio_cache: Arc<dyn Refreshable>,
        sheet_cache: Arc<dyn Refreshable>,
        audio_prefix: String,
        sheet_prefix: String,
    ) -> Self {
        Self {
            storage,
            audio_cache,
            sheet_cache,
            audio_prefix,
            sheet_prefix,
        }
    }

    /// Upload a local audio file under the audio prefix.
    pub async fn upload_audio(&self, file_path: &Path) -> Result<String, SiteError> {
        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SiteError::Internal(format!("invalid file path: {}", file_path.display())))?;

        let content_type = if file_name.ends_with(".wav") {
            "audio/wav"
        } else {
            "audio/mpeg"
        };

        let body = tokio::fs::read(file_path).await?;
        let key = format!("{}{}", self.audio_prefix, file_name);

        info!(key = %key, bytes = body.len(), "Uploading audio");
        self.storage
            .put(&key, Bytes::from(body), content_type)
            .await?;

        self.audio_cache.refresh().await;
        Ok(key)
    }

    /// Delete an audio object; bare names are resolved under the audio prefix.
    pub async fn delete_audio(&self, key: &str) -> Result<String, SiteError> {
        let key = if key.starts_with(&self.audio_prefix) {
            key.to_string()
        } else {
            format!("{}{}", self.audio_prefix, key)
        };

        info!(key = %key, "Deleting audio");
        self.storage.delete(&key).await?;

        self.audio_cache.refresh().await;
        Ok(key)
    }

    /// Store a sheet-music entry as a JSON object keyed by the slugified
    /// display name.
    pub async fn put_sheet_json(&self, display_name: &str, url: &str) -> Result<String, SiteError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(SiteError::Internal("empty display name".into()));
        }

        let key = format!("{}{}.json", self.sheet_prefix, slugify(display_name));
        let item = SheetMusicJson {
            display_name: display_name.to_string(),
            url: normalize_dropbox_url(url.trim()),
        };
        let body = serde_json::to_vec_pretty(&item)?;

        info!(key = %key, "Uploading sheet music entry");
        self.storage
            .put(&key, Bytes::from(body), "application/json")
            .await?;

        self.sheet_cache.refresh().await;
        Ok(key)
    }

    /// Delete a sheet-music entry by key or bare slug.
    pub async fn delete_sheet_music(&self, key: &str) -> Result<String, SiteError> {
        let mut key = key.trim().to_string();
        if key.is_empty() {
            return Err(SiteError::Internal("empty key".into()));
        }
        if !key.starts_with(&self.sheet_prefix) {
            key = format!("{}{}", self.sheet_prefix, key);
        }
        if !key.to_lowercase().ends_with(".json") {
            key = format!("{}.json", key);
        }

        info!(key = %key, "Deleting sheet music entry");
        self.storage.delete(&key).await?;

        self.sheet_cache.refresh().await;
        Ok(key)
    }
}
