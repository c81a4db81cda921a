//! Refresh triggers.
//!
//! Two background loops drive the cache engines: a fixed-interval ticker and
//! the storage-notification poller. The third trigger, on-demand refresh after
//! a mutation, is fired inline by the admin paths. Triggers are unordered with
//! respect to each other; refreshes are idempotent and serialized inside the
//! engine, so convergence is safe by construction.

use crate::cache::engine::Refreshable;
use crate::metrics::SharedMetrics;
use crate::notify::{NotificationQueue, StorageEventEnvelope};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

const MAX_MESSAGES_PER_POLL: i32 = 5;

/// Spawn a loop refreshing `cache` every `interval` until the shutdown signal
/// flips. For the audio cache the interval is the presign TTL minus a safety
/// margin, so no reader is ever handed a snapshot of expired URLs.
pub fn spawn_periodic_refresh(
    cache: Arc<dyn Refreshable>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The eager boot refresh already happened; skip the immediate tick.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("Periodic refresh tick");
                    cache.refresh().await;
                }
                res = shutdown_rx.changed() => {
                    // A closed channel means the server task is gone; stop as
                    // if signalled.
                    if res.is_err() || *shutdown_rx.borrow() {
                        info!("Periodic refresh loop stopped");
                        return;
                    }
                }
            }
        }
    })
}

/// Where a notification's object key points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relevance {
    Audio,
    SheetMusic,
    Unrelated,
}

pub fn classify_key(key: &str, audio_prefix: &str, sheet_prefix: &str) -> Relevance {
    if key.starts_with(audio_prefix) {
        Relevance::Audio
    } else if key.starts_with(sheet_prefix) {
        Relevance::SheetMusic
    } else {
        Relevance::Unrelated
    }
}

pub struct NotificationPoller {
    queue: Arc<dyn NotificationQueue>,
    audio_cache: Arc<dyn Refreshable>,
    sheet_cache: Arc<dyn Refreshable>,
    audio_prefix: String,
    sheet_prefix: String,
    poll_interval: Duration,
    metrics: Option<SharedMetrics>,
}

impl NotificationPoller {
    pub fn new(
        queue: Arc<dyn NotificationQueue>,
        audio_cache: Arc<dyn Refreshable>,
        sheet_cache: Arc<dyn Refreshable>,
        audio_prefix: String,
        sheet_prefix: String,
        poll_interval: Duration,
        metrics: Option<SharedMetrics>,
    ) -> Self {
        Self {
            queue,
            audio_cache,
            sheet_cache,
            audio_prefix,
            sheet_prefix,
            poll_interval,
            metrics,
        }
    }

    pub fn spawn(self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown_rx).await })
    }

    /// Long-poll loop. Receive errors and empty batches back off by sleeping
    /// the poll interval; the loop never terminates on its own and never
    /// surfaces errors beyond a log line.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Starting notification poller");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let messages = match self.queue.receive(MAX_MESSAGES_PER_POLL).await {
                Ok(messages) => messages,
                Err(e) => {
                    error!(error = %e, "Failed to receive notifications");
                    if self.sleep_or_shutdown(&mut shutdown_rx).await {
                        break;
                    }
                    continue;
                }
            };

            if messages.is_empty() {
                if self.sleep_or_shutdown(&mut shutdown_rx).await {
                    break;
                }
                continue;
            }

            for message in messages {
                self.handle_message(&message.body).await;
                // Acknowledge exactly once, relevant or not, so irrelevant and
                // malformed payloads are never redelivered.
                if let Err(e) = self.queue.acknowledge(&message.receipt_handle).await {
                    error!(error = %e, "Failed to acknowledge notification");
                }
            }
        }

        info!("Notification poller stopped");
    }

    async fn handle_message(&self, body: &str) {
        let envelope = match StorageEventEnvelope::parse(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, "Malformed notification payload, dropping");
                self.note("malformed");
                return;
            }
        };

        for record in &envelope.records {
            let key = record.decoded_key();
            match classify_key(&key, &self.audio_prefix, &self.sheet_prefix) {
                Relevance::Audio => {
                    info!(event = %record.event_name, key = %key, "Audio change event, refreshing cache");
                    self.note("audio");
                    self.audio_cache.refresh().await;
                }
                Relevance::SheetMusic => {
                    info!(event = %record.event_name, key = %key, "Sheet music change event, refreshing cache");
                    self.note("sheetmusic");
                    self.sheet_cache.refresh().await;
                }
                Relevance::Unrelated => {
                    debug!(key = %key, "Notification not relevant");
                    self.note("unrelated");
                }
            }
        }
    }

    fn note(&self, relevance: &str) {
        if let Some(m) = &self.metrics {
            m.record_notification(relevance);
        }
    }

    /// Returns true when shutdown was signalled (or the channel closed)
    /// during the backoff sleep.
    async fn sleep_or_shutdown(&self, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => false,
            res = shutdown_rx.changed() => res.is_err() || *shutdown_rx.borrow(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SiteError;
    use crate::notify::QueueMessage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingCache {
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl Refreshable for CountingCache {
        async fn refresh(&self) {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct ScriptedQueue {
        pending: Mutex<Vec<QueueMessage>>,
        acks: Mutex<Vec<String>>,
    }

    impl ScriptedQueue {
        fn with_bodies(bodies: &[&str]) -> Self {
            let queue = Self::default();
            {
                let mut pending = queue.pending.lock().unwrap();
                for (i, body) in bodies.iter().enumerate() {
                    pending.push(QueueMessage {
                        body: body.to_string(),
                        receipt_handle: format!("receipt-{i}"),
                    });
                }
            }
            queue
        }
    }

    #[async_trait]
    impl NotificationQueue for ScriptedQueue {
        async fn receive(&self, _max: i32) -> Result<Vec<QueueMessage>, SiteError> {
            Ok(std::mem::take(&mut *self.pending.lock().unwrap()))
        }

        async fn acknowledge(&self, receipt_handle: &str) -> Result<(), SiteError> {
            self.acks.lock().unwrap().push(receipt_handle.to_string());
            Ok(())
        }
    }

    fn envelope(key: &str) -> String {
        format!(
            r#"{{"Records":[{{"eventName":"ObjectCreated:Put","s3":{{"object":{{"key":"{key}"}}}}}}]}}"#
        )
    }

    struct Fixture {
        queue: Arc<ScriptedQueue>,
        audio: Arc<CountingCache>,
        sheet: Arc<CountingCache>,
    }

    async fn poll_once(bodies: &[&str]) -> Fixture {
        let queue = Arc::new(ScriptedQueue::with_bodies(bodies));
        let audio = Arc::new(CountingCache::default());
        let sheet = Arc::new(CountingCache::default());

        let poller = NotificationPoller::new(
            queue.clone(),
            audio.clone(),
            sheet.clone(),
            "audio/".to_string(),
            "sheetmusic/".to_string(),
            Duration::from_millis(5),
            None,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = poller.spawn(shutdown_rx);
        // First poll drains the scripted batch; the empty follow-up poll hits
        // the backoff sleep where the shutdown signal is observed.
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        Fixture { queue, audio, sheet }
    }

    #[test]
    fn classifies_by_prefix() {
        assert_eq!(classify_key("audio/x.wav", "audio/", "sheetmusic/"), Relevance::Audio);
        assert_eq!(
            classify_key("sheetmusic/x.json", "audio/", "sheetmusic/"),
            Relevance::SheetMusic
        );
        assert_eq!(classify_key("other/x", "audio/", "sheetmusic/"), Relevance::Unrelated);
    }

    #[tokio::test]
    async fn audio_key_refreshes_only_audio_cache() {
        let fx = poll_once(&[&envelope("audio/new_tune.wav")]).await;
        assert_eq!(fx.audio.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(fx.sheet.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(fx.queue.acks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sheet_key_refreshes_only_sheet_cache() {
        let fx = poll_once(&[&envelope("sheetmusic/new_tune.json")]).await;
        assert_eq!(fx.audio.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(fx.sheet.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(fx.queue.acks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unrelated_key_refreshes_neither_but_still_acks() {
        let fx = poll_once(&[&envelope("backups/dump.sql")]).await;
        assert_eq!(fx.audio.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(fx.sheet.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(fx.queue.acks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_body_is_acked_exactly_once_and_not_retried() {
        let fx = poll_once(&["this is not json"]).await;
        assert_eq!(fx.audio.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(fx.sheet.refreshes.load(Ordering::SeqCst), 0);
        let acks = fx.queue.acks.lock().unwrap();
        assert_eq!(acks.as_slice(), &["receipt-0".to_string()]);
    }

    #[tokio::test]
    async fn url_escaped_keys_route_correctly() {
        let fx = poll_once(&[&envelope("audio/red%20haired%20boy.wav")]).await;
        assert_eq!(fx.audio.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn periodic_ticker_refreshes_until_shutdown() {
        let cache = Arc::new(CountingCache::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = spawn_periodic_refresh(
            cache.clone(),
            Duration::from_millis(10),
            shutdown_rx,
        );
        tokio::time::sleep(Duration::from_millis(55)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(cache.refreshes.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn dropped_shutdown_sender_stops_ticker() {
        let cache = Arc::new(CountingCache::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = spawn_periodic_refresh(cache, Duration::from_secs(3600), shutdown_rx);
        drop(shutdown_tx);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("ticker must exit when the channel closes")
            .unwrap();
    }

    #[tokio::test]
    async fn dropped_shutdown_sender_stops_poller() {
        let poller = NotificationPoller::new(
            Arc::new(ScriptedQueue::default()),
            Arc::new(CountingCache::default()),
            Arc::new(CountingCache::default()),
            "audio/".to_string(),
            "sheetmusic/".to_string(),
            Duration::from_secs(3600),
            None,
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = poller.spawn(shutdown_rx);
        drop(shutdown_tx);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("poller must exit when the channel closes")
            .unwrap();
    }
}
