use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;

/// Default presigned-URL lifetime: 30 minutes.
const DEFAULT_PRESIGN_TTL_SECS: u64 = 30 * 60;
/// Default safety margin subtracted from the presign TTL for the refresh ticker.
const DEFAULT_SAFETY_MARGIN_SECS: u64 = 60;
/// Default sleep between notification-queue polls.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
/// Default interval for the sheet-music background refresh: 6 hours.
const DEFAULT_SHEET_REFRESH_SECS: u64 = 6 * 60 * 60;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    pub audio_prefix: String,
    pub sheet_prefix: String,
    pub fallback_image_key: String,
    pub presign_ttl: Duration,
    /// Subtracted from the presign TTL to get the ticker interval, so a
    /// refresh always lands before the signed URLs in the snapshot expire.
    pub safety_margin: Duration,
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Poller is disabled when no queue URL is configured.
    pub queue_url: Option<String>,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub notify: NotifyConfig,
    pub sheet_refresh_interval: Duration,
    pub blog_dir: String,
    pub resume_url: Option<String>,
    /// Empty `TRAFFIC_DB_PATH` disables request logging.
    pub traffic_db_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bucket = env::var("S3_BUCKET").context("S3_BUCKET is required")?;

        let presign_ttl_secs = parse_secs("PRESIGN_TTL_SECS", DEFAULT_PRESIGN_TTL_SECS);
        let safety_margin_secs = parse_secs("REFRESH_SAFETY_MARGIN_SECS", DEFAULT_SAFETY_MARGIN_SECS);
        validate_refresh_bounds(safety_margin_secs, presign_ttl_secs)?;

        Ok(Self {
            server: ServerConfig {
                port: env::var("PORT").unwrap_or_else(|_| "8080".to_string()).parse()?,
            },
            storage: StorageConfig {
                bucket,
                region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                audio_prefix: ensure_trailing_slash(
                    &env::var("AUDIO_PREFIX").unwrap_or_else(|_| "audio/".to_string()),
                ),
                sheet_prefix: ensure_trailing_slash(
                    &env::var("SHEET_PREFIX").unwrap_or_else(|_| "sheetmusic/".to_string()),
                ),
                fallback_image_key: env::var("FALLBACK_IMAGE_KEY")
                    .unwrap_or_else(|_| "audio/unknown.png".to_string()),
                presign_ttl: Duration::from_secs(presign_ttl_secs),
                safety_margin: Duration::from_secs(safety_margin_secs),
            },
            notify: NotifyConfig {
                queue_url: env::var("SQS_QUEUE_URL").ok().filter(|v| !v.is_empty()),
                poll_interval: Duration::from_secs(parse_secs(
                    "SQS_POLL_INTERVAL_SECS",
                    DEFAULT_POLL_INTERVAL_SECS,
                )),
            },
            sheet_refresh_interval: Duration::from_secs(parse_secs(
                "SHEET_REFRESH_INTERVAL_SECS",
                DEFAULT_SHEET_REFRESH_SECS,
            )),
            blog_dir: env::var("BLOG_DIR").unwrap_or_else(|_| "posts".to_string()),
            resume_url: env::var("RESUME_URL").ok().filter(|v| !v.is_empty()),
            traffic_db_path: match env::var("TRAFFIC_DB_PATH") {
                Ok(path) => Some(path).filter(|p| !p.is_empty()),
                Err(_) => Some("traffic.db".to_string()),
            },
        })
    }

    /// Interval for the audio refresh ticker, keyed to presign expiry.
    pub fn audio_refresh_interval(&self) -> Duration {
        self.storage.presign_ttl - self.storage.safety_margin
    }
}

/// The ticker interval is `ttl - margin`, so the margin must sit strictly
/// inside the TTL.
fn validate_refresh_bounds(margin_secs: u64, ttl_secs: u64) -> Result<()> {
    if margin_secs == 0 {
        bail!("REFRESH_SAFETY_MARGIN_SECS must be positive");
    }
    if margin_secs >= ttl_secs {
        bail!(
            "REFRESH_SAFETY_MARGIN_SECS ({}) must be smaller than PRESIGN_TTL_SECS ({})",
            margin_secs,
            ttl_secs
        );
    }
    Ok(())
}

fn parse_secs(var: &str, default: u64) -> u64 {
    env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

pub fn ensure_trailing_slash(p: &str) -> String {
    if p.is_empty() || p.ends_with('/') {
        p.to_string()
    } else {
        format!("{}/", p)
    }
}
