//! In-process metrics for context registry activity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Histogram for sweep latency.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s
    buckets: [AtomicU64; 9],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 9] = [1, 5, 10, 25, 50, 100, 250, 500, 1000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds. Values past the last bound land in it.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum.load(Ordering::Relaxed) as f64 / count as f64
        }
    }
}

/// Collected metrics for the context store.
#[derive(Debug, Default)]
pub struct Metrics {
    // Registry lifecycle
    pub contexts_created: Counter,
    pub capacity_evictions: Counter,
    pub stale_evictions: Counter,
    pub contexts_removed: Counter,

    // Cleanup
    pub cleanup_sweeps: Counter,
    pub items_cleaned: Counter,
    pub sweep_latency_ms: Histogram,

    // Limits
    pub limit_updates: Counter,
    pub limit_rejections: Counter,

    // Gauges
    pub live_contexts: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub contexts_created: u64,
    pub capacity_evictions: u64,
    pub stale_evictions: u64,
    pub contexts_removed: u64,
    pub cleanup_sweeps: u64,
    pub items_cleaned: u64,
    pub sweep_latency_mean_ms: f64,
    pub limit_updates: u64,
    pub limit_rejections: u64,
    pub live_contexts: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            contexts_created: self.contexts_created.get(),
            capacity_evictions: self.capacity_evictions.get(),
            stale_evictions: self.stale_evictions.get(),
            contexts_removed: self.contexts_removed.get(),
            cleanup_sweeps: self.cleanup_sweeps.get(),
            items_cleaned: self.items_cleaned.get(),
            sweep_latency_mean_ms: self.sweep_latency_ms.mean(),
            limit_updates: self.limit_updates.get(),
            limit_rejections: self.limit_rejections.get(),
            live_contexts: self.live_contexts.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
