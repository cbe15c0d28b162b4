//! Per-agent performance metrics: call/failure counters and a latency
//! histogram, each agent keeping its own so a slow or failing role never
//! skews another's figures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

/// Logarithmic-bucket latency histogram covering 1us to 10s with roughly
/// 10% relative error, sufficient for p50/p90/p95/p99/p999 reporting.
#[derive(Debug)]
pub struct LatencyHistogram {
    inner: Mutex<HistogramInner>,
}

#[derive(Debug)]
struct HistogramInner {
    buckets: Vec<u64>,
    count: u64,
    sum_us: u64,
    min_us: u64,
    max_us: u64,
}

static BUCKET_BOUNDS_US: &[u64] = &[
    1, 2, 5, 10, 20, 50, 100, 200, 500, 1_000, 2_000, 5_000, 10_000, 20_000, 50_000, 100_000, 200_000, 500_000,
    1_000_000, 2_000_000, 5_000_000, 10_000_000, u64::MAX,
];

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HistogramInner {
                buckets: vec![0u64; BUCKET_BOUNDS_US.len()],
                count: 0,
                sum_us: 0,
                min_us: u64::MAX,
                max_us: 0,
            }),
        }
    }

    pub fn record(&self, latency_us: u64) {
        let mut inner = self.inner.lock();
        inner.count += 1;
        inner.sum_us = inner.sum_us.saturating_add(latency_us);
        inner.min_us = inner.min_us.min(latency_us);
        inner.max_us = inner.max_us.max(latency_us);
        let idx = BUCKET_BOUNDS_US.partition_point(|&bound| bound < latency_us);
        let bucket_idx = idx.min(inner.buckets.len() - 1);
        inner.buckets[bucket_idx] += 1;
    }

    pub fn record_duration(&self, duration: Duration) {
        self.record(duration.as_micros() as u64);
    }

    pub fn percentile(&self, p: f64) -> u64 {
        let inner = self.inner.lock();
        self.percentile_locked(&inner, p)
    }

    fn percentile_locked(&self, inner: &HistogramInner, p: f64) -> u64 {
        if inner.count == 0 {
            return 0;
        }
        let target = ((p / 100.0) * inner.count as f64).ceil() as u64;
        let mut cumulative = 0u64;
        for (i, &bucket_count) in inner.buckets.iter().enumerate() {
            cumulative += bucket_count;
            if cumulative >= target {
                return BUCKET_BOUNDS_US[i];
            }
        }
        inner.max_us
    }

    pub fn p50(&self) -> u64 {
        self.percentile(50.0)
    }

    pub fn p95(&self) -> u64 {
        self.percentile(95.0)
    }

    pub fn p99(&self) -> u64 {
        self.percentile(99.0)
    }

    pub fn p999(&self) -> u64 {
        self.percentile(99.9)
    }

    pub fn mean(&self) -> f64 {
        let inner = self.inner.lock();
        if inner.count == 0 {
            0.0
        } else {
            inner.sum_us as f64 / inner.count as f64
        }
    }

    pub fn count(&self) -> u64 {
        self.inner.lock().count
    }
}

/// Call/failure counters plus a latency histogram for a single agent role.
#[derive(Debug, Default)]
pub struct AgentMetrics {
    calls: AtomicU64,
    failures: AtomicU64,
    latency: LatencyHistogram,
    last_error: Mutex<Option<String>>,
}

impl AgentMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, latency: Duration) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.latency.record_duration(latency);
    }

    pub fn record_failure(&self, latency: Duration, error: impl ToString) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.latency.record_duration(latency);
        *self.last_error.lock() = Some(error.to_string());
    }

    pub fn snapshot(&self, role: &str) -> AgentMetricsSnapshot {
        AgentMetricsSnapshot {
            role: role.to_string(),
            calls: self.calls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            p50_us: self.latency.p50(),
            p95_us: self.latency.p95(),
            p99_us: self.latency.p99(),
            p999_us: self.latency.p999(),
            last_error: self.last_error.lock().clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentMetricsSnapshot {
    pub role: String,
    pub calls: u64,
    pub failures: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub p999_us: u64,
    pub last_error: Option<String>,
}
