//! Request traffic log.
//!
//! Every page request is recorded in a small embedded SQLite database, with a
//! second table flagging probes for well-known admin and exploit paths.
//! Recording is best-effort: a write failure logs and the response proceeds.

use crate::error::SiteError;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

const SUSPICIOUS_PATHS: &[&str] = &[
    "/wp-admin", "/wp-login", "/wp-content", "/wordpress",
    "/.env", "/.git", "/.gitignore", "/.htaccess",
    "/phpmyadmin", "/pma", "/mysql", "/adminer",
    "/admin", "/administrator", "/login", "/signin",
    "/config", "/backup", "/db", "/database",
    "/shell", "/cmd", "/eval", "/exec",
    "/api/", "/xmlrpc.php", "/wp-json",
];

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    ip TEXT NOT NULL,
    user_agent TEXT,
    referrer TEXT,
    timestamp TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS suspicious_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    ip TEXT NOT NULL,
    user_agent TEXT,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_requests_timestamp ON requests(timestamp);
CREATE INDEX IF NOT EXISTS idx_suspicious_timestamp ON suspicious_requests(timestamp);
";

pub fn is_suspicious_path(path: &str) -> bool {
    let lowered = path.to_lowercase();
    SUSPICIOUS_PATHS.iter().any(|p| lowered.contains(p))
}

#[derive(Debug, Clone)]
pub struct RequestEntry {
    pub path: String,
    pub ip: String,
    pub user_agent: String,
    pub referrer: String,
}

#[derive(Debug, Clone, Copy)]
pub struct TrafficSummary {
    pub total: i64,
    pub suspicious: i64,
}

pub struct TrafficLog {
    conn: Arc<Mutex<Connection>>,
}

impl TrafficLog {
    pub fn open(path: &str) -> Result<Self, SiteError> {
        let log = Self::init(Connection::open(path)?)?;
        info!(path = path, "Traffic log ready");
        Ok(log)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, SiteError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, SiteError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Record one request, additionally flagging it when the path matches a
    /// known probe pattern. Failures log and are otherwise swallowed.
    pub async fn record(&self, entry: RequestEntry) {
        let conn = self.conn.clone();
        let result = tokio::task::spawn_blocking(move || {
            let now = Utc::now().to_rfc3339();
            let conn = conn
                .lock()
                .map_err(|_| SiteError::Internal("traffic log lock poisoned".into()))?;
            conn.execute(
                "INSERT INTO requests (path, ip, user_agent, referrer, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![entry.path, entry.ip, entry.user_agent, entry.referrer, now],
            )?;
            if is_suspicious_path(&entry.path) {
                conn.execute(
                    "INSERT INTO suspicious_requests (path, ip, user_agent, timestamp)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![entry.path, entry.ip, entry.user_agent, now],
                )?;
            }
            Ok::<(), SiteError>(())
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Failed to record request"),
            Err(e) => error!(error = %e, "Traffic writer task failed"),
        }
    }

    pub fn summary(&self) -> Result<TrafficSummary, SiteError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| SiteError::Internal("traffic log lock poisoned".into()))?;
        let total = conn.query_row("SELECT COUNT(*) FROM requests", [], |row| row.get(0))?;
        let suspicious =
            conn.query_row("SELECT COUNT(*) FROM suspicious_requests", [], |row| row.get(0))?;
        Ok(TrafficSummary { total, suspicious })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str) -> RequestEntry {
        RequestEntry {
            path: path.to_string(),
            ip: "203.0.113.7".to_string(),
            user_agent: "test-agent".to_string(),
            referrer: String::new(),
        }
    }

    #[test]
    fn flags_known_probe_paths() {
        assert!(is_suspicious_path("/wp-admin/setup.php"));
        assert!(is_suspicious_path("/.ENV"));
        assert!(is_suspicious_path("/site/phpMyAdmin/index.php"));
        assert!(!is_suspicious_path("/music"));
        assert!(!is_suspicious_path("/sheet-music"));
    }

    #[tokio::test]
    async fn records_requests_and_flags_suspicious_ones() {
        let log = TrafficLog::open_in_memory().unwrap();

        log.record(entry("/music")).await;
        log.record(entry("/wp-login.php")).await;

        let summary = log.summary().unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.suspicious, 1);
    }

    #[tokio::test]
    async fn open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traffic.db");

        let log = TrafficLog::open(path.to_str().unwrap()).unwrap();
        log.record(entry("/")).await;

        assert!(path.exists());
        assert_eq!(log.summary().unwrap().total, 1);
    }
}
