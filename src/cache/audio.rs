//! Derived-record builder for the music page.
//!
//! Turns a raw listing of the audio prefix into display-ready records: `.wav`
//! objects paired with their same-titled `.png` cover image, presigned URLs
//! minted per object, a shared fallback image for tracks without cover art,
//! newest first.

use crate::cache::engine::RecordSource;
use crate::error::SiteError;
use crate::storage::{StorageBackend, StoredObject};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct AudioRecord {
    pub display_title: String,
    pub audio_url: String,
    pub image_url: String,
    pub last_modified: DateTime<Utc>,
    pub storage_key: String,
}

pub struct AudioSource {
    storage: Arc<dyn StorageBackend>,
    prefix: String,
    fallback_image_key: String,
    presign_ttl: Duration,
}

impl AudioSource {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        prefix: String,
        fallback_image_key: String,
        presign_ttl: Duration,
    ) -> Self {
        Self {
            storage,
            prefix,
            fallback_image_key,
            presign_ttl,
        }
    }
}

#[async_trait]
impl RecordSource for AudioSource {
    type Record = AudioRecord;

    async fn fetch(&self) -> Result<Vec<AudioRecord>, SiteError> {
        let objects = self.storage.list(&self.prefix).await?;
        build_audio_records(
            &*self.storage,
            objects,
            &self.prefix,
            &self.fallback_image_key,
            self.presign_ttl,
        )
        .await
    }
}

enum AudioFileKind {
    Wav,
    Png,
}

fn classify_extension(key: &str) -> Option<AudioFileKind> {
    if key.ends_with(".wav") {
        Some(AudioFileKind::Wav)
    } else if key.ends_with(".png") {
        Some(AudioFileKind::Png)
    } else {
        None
    }
}

/// Derive the human-readable title from a storage key: basename without
/// extension, underscores as spaces, each word capitalized. Doubles as the
/// join key between an audio object and its cover image.
pub fn derive_title(key: &str) -> String {
    let base = key.rsplit('/').next().unwrap_or(key);
    let stem = match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    };
    title_case(&stem.replace('_', " "))
}

pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

async fn build_audio_records(
    storage: &dyn StorageBackend,
    objects: Vec<StoredObject>,
    prefix: &str,
    fallback_image_key: &str,
    presign_ttl: Duration,
) -> Result<Vec<AudioRecord>, SiteError> {
    // Listing order is preserved for tracks so the final sort stays stable.
    let mut tracks: Vec<AudioRecord> = Vec::new();
    let mut images: HashMap<String, String> = HashMap::new();

    for object in objects {
        if object.key == prefix || object.key.trim_end_matches('/') == prefix.trim_end_matches('/')
        {
            continue;
        }
        let Some(kind) = classify_extension(&object.key) else {
            continue;
        };

        let title = derive_title(&object.key);
        let url = match storage.signed_url(&object.key, presign_ttl).await {
            Ok(url) => url,
            Err(e) => {
                warn!(key = %object.key, error = %e, "Failed to presign object, skipping");
                continue;
            }
        };

        match kind {
            AudioFileKind::Wav => tracks.push(AudioRecord {
                display_title: title,
                audio_url: url,
                image_url: String::new(),
                last_modified: object.last_modified,
                storage_key: object.key,
            }),
            AudioFileKind::Png => {
                images.insert(title, url);
            }
        }
    }

    // The fallback image is minted once and shared by every track without
    // cover art. A mint failure degrades those tracks to an empty image URL
    // rather than failing the whole listing.
    let fallback_url = match storage.signed_url(fallback_image_key, presign_ttl).await {
        Ok(url) => url,
        Err(e) => {
            warn!(key = fallback_image_key, error = %e, "Failed to presign fallback image");
            String::new()
        }
    };

    for track in &mut tracks {
        match images.get(&track.display_title) {
            Some(url) => track.image_url = url.clone(),
            None => {
                debug!(title = %track.display_title, "No cover image, using fallback");
                track.image_url = fallback_url.clone();
            }
        }
    }

    tracks.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::MemoryStorage;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    async fn build(storage: &MemoryStorage) -> Vec<AudioRecord> {
        let objects = storage.list("audio/").await.unwrap();
        build_audio_records(
            storage,
            objects,
            "audio/",
            "audio/unknown.png",
            Duration::from_secs(1800),
        )
        .await
        .unwrap()
    }

    #[test]
    fn derives_title_from_key() {
        assert_eq!(derive_title("audio/this_is_a_test.mp3"), "This Is A Test");
        assert_eq!(derive_title("audio/sally_goodin.wav"), "Sally Goodin");
        assert_eq!(derive_title("no_dir.wav"), "No Dir");
        assert_eq!(derive_title("audio/UPPER_case.wav"), "Upper Case");
    }

    #[tokio::test]
    async fn pairs_audio_with_same_titled_image() {
        let storage = MemoryStorage::with_objects(&[
            ("audio/sally_goodin.wav", at(0)),
            ("audio/sally_goodin.png", at(0)),
        ]);

        let records = build(&storage).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].display_title, "Sally Goodin");
        assert_eq!(records[0].audio_url, "https://signed.example/audio/sally_goodin.wav");
        assert_eq!(records[0].image_url, "https://signed.example/audio/sally_goodin.png");
    }

    #[tokio::test]
    async fn missing_image_gets_fallback_url() {
        let storage = MemoryStorage::with_objects(&[("audio/a.wav", at(0))]);

        let records = build(&storage).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].image_url, "https://signed.example/audio/unknown.png");
    }

    #[tokio::test]
    async fn sorts_by_recency_descending() {
        let storage = MemoryStorage::with_objects(&[
            ("audio/first.wav", at(1)),
            ("audio/second.wav", at(2)),
            ("audio/third.wav", at(3)),
        ]);

        let records = build(&storage).await;
        let titles: Vec<&str> = records.iter().map(|r| r.display_title.as_str()).collect();
        assert_eq!(titles, vec!["Third", "Second", "First"]);
    }

    #[tokio::test]
    async fn skips_bare_prefix_and_foreign_extensions() {
        let storage = MemoryStorage::with_objects(&[
            ("audio/", at(0)),
            ("audio/readme.txt", at(0)),
            ("audio/tune.wav", at(0)),
        ]);

        let records = build(&storage).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].storage_key, "audio/tune.wav");
    }

    #[tokio::test]
    async fn presign_failure_excludes_only_that_record() {
        let mut storage = MemoryStorage::with_objects(&[
            ("audio/good.wav", at(1)),
            ("audio/bad.wav", at(2)),
        ]);
        storage.unsignable.insert("audio/bad.wav".to_string());

        let records = build(&storage).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].display_title, "Good");
    }

    #[tokio::test]
    async fn listing_failure_propagates_from_source() {
        let mut storage = MemoryStorage::with_objects(&[("audio/a.wav", at(0))]);
        storage.fail_listing = true;

        let source = AudioSource::new(
            Arc::new(storage),
            "audio/".to_string(),
            "audio/unknown.png".to_string(),
            Duration::from_secs(1800),
        );
        assert!(source.fetch().await.is_err());
    }

    #[tokio::test]
    async fn fallback_mint_failure_leaves_image_url_empty() {
        let mut storage = MemoryStorage::with_objects(&[("audio/a.wav", at(0))]);
        storage.unsignable.insert("audio/unknown.png".to_string());

        let records = build(&storage).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].image_url, "");
    }
}
