//! Prometheus metrics, rendered at `/metrics`.

use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Gauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

pub type SharedMetrics = Arc<Metrics>;

pub struct Metrics {
    registry: Registry,
    /// Refresh attempts by cache and outcome (`ok` / `error`).
    refresh_total: IntCounterVec,
    /// Records currently held by each cache snapshot.
    cache_records: IntGaugeVec,
    /// Queue notifications by relevance (`audio` / `sheetmusic` / `unrelated` / `malformed`).
    notifications_total: IntCounterVec,
    boot_duration_seconds: Gauge,
}

pub fn create_metrics() -> SharedMetrics {
    Arc::new(Metrics::new())
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();

        let refresh_total = IntCounterVec::new(
            Opts::new("cache_refresh_total", "Cache refresh attempts by outcome"),
            &["cache", "outcome"],
        )
        .expect("valid metric definition");

        let cache_records = IntGaugeVec::new(
            Opts::new("cache_records", "Records in the current cache snapshot"),
            &["cache"],
        )
        .expect("valid metric definition");

        let notifications_total = IntCounterVec::new(
            Opts::new(
                "notifications_total",
                "Storage-change notifications by relevance",
            ),
            &["relevance"],
        )
        .expect("valid metric definition");

        let boot_duration_seconds = Gauge::new(
            "boot_duration_seconds",
            "Time from process start to serving traffic",
        )
        .expect("valid metric definition");

        registry
            .register(Box::new(refresh_total.clone()))
            .expect("register refresh_total");
        registry
            .register(Box::new(cache_records.clone()))
            .expect("register cache_records");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(boot_duration_seconds.clone()))
            .expect("register boot_duration_seconds");

        Self {
            registry,
            refresh_total,
            cache_records,
            notifications_total,
            boot_duration_seconds,
        }
    }

    pub fn record_refresh(&self, cache: &str, outcome: &str) {
        self.refresh_total.with_label_values(&[cache, outcome]).inc();
    }

    pub fn set_cache_records(&self, cache: &str, count: usize) {
        self.cache_records
            .with_label_values(&[cache])
            .set(count as i64);
    }

    pub fn record_notification(&self, relevance: &str) {
        self.notifications_total
            .with_label_values(&[relevance])
            .inc();
    }

    pub fn set_boot_duration(&self, seconds: f64) {
        self.boot_duration_seconds.set(seconds);
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder
            .encode(&self.registry.gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_registered_metrics() {
        let metrics = create_metrics();
        metrics.record_refresh("audio", "ok");
        metrics.set_cache_records("audio", 3);
        metrics.record_notification("unrelated");

        let output = metrics.render();
        assert!(output.contains("cache_refresh_total"));
        assert!(output.contains("cache_records"));
        assert!(output.contains("notifications_total"));
    }
}
