//! Derived-record builder for the sheet-music page.
//!
//! Sheet music lives in storage as small JSON objects naming a display title
//! and a Dropbox link. The builder lists the prefix, reads each `.json`
//! object, fills a title-cased fallback name when the stored one is blank,
//! normalizes the Dropbox link so it previews instead of downloading, and
//! sorts by display name.

use crate::cache::audio::title_case;
use crate::cache::engine::RecordSource;
use crate::error::SiteError;
use crate::storage::StorageBackend;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// JSON object shape stored in the bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetMusicJson {
    #[serde(rename = "display_name", default)]
    pub display_name: String,
    #[serde(rename = "url", default)]
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct SheetMusicRecord {
    pub display_name: String,
    pub external_url: String,
    pub storage_key: String,
}

pub struct SheetMusicSource {
    storage: Arc<dyn StorageBackend>,
    prefix: String,
}

impl SheetMusicSource {
    pub fn new(storage: Arc<dyn StorageBackend>, prefix: String) -> Self {
        Self { storage, prefix }
    }
}

#[async_trait]
impl RecordSource for SheetMusicSource {
    type Record = SheetMusicRecord;

    async fn fetch(&self) -> Result<Vec<SheetMusicRecord>, SiteError> {
        let objects = self.storage.list(&self.prefix).await?;

        let mut records = Vec::with_capacity(objects.len());
        for object in objects {
            if object.key == self.prefix || !object.key.to_lowercase().ends_with(".json") {
                continue;
            }

            // One unreadable or malformed object skips that entry only.
            let body = match self.storage.get(&object.key).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(key = %object.key, error = %e, "Failed reading sheet object, skipping");
                    continue;
                }
            };
            let item: SheetMusicJson = match serde_json::from_slice(&body) {
                Ok(item) => item,
                Err(e) => {
                    warn!(key = %object.key, error = %e, "Malformed sheet JSON, skipping");
                    continue;
                }
            };

            let display_name = if item.display_name.trim().is_empty() {
                fallback_name_from_key(&object.key, &self.prefix)
            } else {
                item.display_name.trim().to_string()
            };

            records.push(SheetMusicRecord {
                display_name,
                external_url: normalize_dropbox_url(&item.url),
                storage_key: object.key,
            });
        }

        records.sort_by(|a, b| {
            a.display_name
                .to_lowercase()
                .cmp(&b.display_name.to_lowercase())
        });
        Ok(records)
    }
}

/// Title-cased name derived from the key when the stored display name is
/// blank: strip prefix and extension, underscores and hyphens become spaces.
pub fn fallback_name_from_key(key: &str, prefix: &str) -> String {
    let base = key.strip_prefix(prefix).unwrap_or(key);
    let stem = match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    };
    title_case(&stem.replace(['_', '-'], " "))
}

/// Object key slug derived from a display name for uploads.
pub fn slugify(name: &str) -> String {
    let lowered = name.trim().to_lowercase().replace([' ', '-'], "_");
    let filtered: String = lowered
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect();
    filtered.trim_matches('_').to_string()
}

/// Force Dropbox share links to preview mode (`dl=0`). Non-Dropbox URLs pass
/// through unchanged.
pub fn normalize_dropbox_url(url: &str) -> String {
    if url.is_empty() || !url.to_lowercase().contains("dropbox.com") {
        return url.to_string();
    }
    if let Some(query_start) = url.find('?') {
        let (base, query) = url.split_at(query_start);
        let query = &query[1..];

        let mut params: Vec<String> = query
            .split('&')
            .filter(|p| !p.is_empty() && !p.starts_with("dl="))
            .map(|p| p.to_string())
            .collect();
        params.push("dl=0".to_string());
        format!("{}?{}", base, params.join("&"))
    } else {
        format!("{}?dl=0", url)
    }
}
