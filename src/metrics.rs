//! Metrics collection for the resolver
//!
//! Atomic counters and a bounded duration sample buffer, exported in the
//! Prometheus text format by the `/metrics` endpoint.
//!
//! # Example
//!
//! ```rust,no_run
//! use clipresolve::metrics::global_metrics;
//! use std::time::Duration;
//!
//! global_metrics().record_success("video-element", Duration::from_millis(1800));
//! let output = global_metrics().to_prometheus_format();
//! ```

use crate::error::ErrorKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{OnceLock, RwLock};
use std::time::{Duration, Instant};

/// Maximum number of duration samples to keep
const MAX_HISTOGRAM_SAMPLES: usize = 1000;

/// Resolver metrics
///
/// Thread-safe; counters are plain atomics, breakdowns sit behind RwLocks.
#[derive(Debug)]
pub struct Metrics {
    /// Resolutions attempted
    pub resolutions_total: AtomicU64,
    /// Resolutions that produced a media URL
    pub resolutions_succeeded: AtomicU64,
    /// Resolutions that ended in an error
    pub resolutions_failed: AtomicU64,
    /// Navigations performed
    pub navigations_total: AtomicU64,
    /// Browsing contexts opened
    pub contexts_opened: AtomicU64,
    /// Browsing contexts torn down
    pub contexts_closed: AtomicU64,
    /// Requests rejected by the rate limiter
    pub rate_limited_total: AtomicU64,

    /// Browsing contexts currently open
    pub active_contexts: AtomicI64,

    resolution_durations: RwLock<RingBuffer<Duration>>,
    failures_by_kind: RwLock<HashMap<ErrorKind, u64>>,
    hits_by_strategy: RwLock<HashMap<String, u64>>,
    start_time: RwLock<Option<Instant>>,
}

/// Fixed-capacity sample buffer that overwrites its oldest entries
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    data: Vec<T>,
    capacity: usize,
    write_pos: usize,
    total_samples: u64,
}

impl<T: Clone + Ord> RingBuffer<T> {
    fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            write_pos: 0,
            total_samples: 0,
        }
    }

    fn push(&mut self, value: T) {
        if self.data.len() < self.capacity {
            self.data.push(value);
        } else {
            self.data[self.write_pos] = value;
        }
        self.write_pos = (self.write_pos + 1) % self.capacity;
        self.total_samples += 1;
    }

    /// Samples currently held
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether no samples were recorded
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Samples ever recorded, including overwritten ones
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Percentile over held samples (0.0 to 1.0)
    pub fn percentile(&self, p: f64) -> Option<T> {
        if self.data.is_empty() {
            return None;
        }
        let mut sorted = self.data.clone();
        sorted.sort();
        let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted.get(idx).cloned()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create an empty collector
    pub fn new() -> Self {
        Self {
            resolutions_total: AtomicU64::new(0),
            resolutions_succeeded: AtomicU64::new(0),
            resolutions_failed: AtomicU64::new(0),
            navigations_total: AtomicU64::new(0),
            contexts_opened: AtomicU64::new(0),
            contexts_closed: AtomicU64::new(0),
            rate_limited_total: AtomicU64::new(0),
            active_contexts: AtomicI64::new(0),
            resolution_durations: RwLock::new(RingBuffer::new(MAX_HISTOGRAM_SAMPLES)),
            failures_by_kind: RwLock::new(HashMap::new()),
            hits_by_strategy: RwLock::new(HashMap::new()),
            start_time: RwLock::new(None),
        }
    }

    /// Record a resolution that produced a media URL
    pub fn record_success(&self, strategy: &str, duration: Duration) {
        self.resolutions_total.fetch_add(1, Ordering::Relaxed);
        self.resolutions_succeeded.fetch_add(1, Ordering::Relaxed);
        self.push_duration(duration);

        if let Ok(mut breakdown) = self.hits_by_strategy.write() {
            *breakdown.entry(strategy.to_string()).or_insert(0) += 1;
        }
    }

    /// Record a failed resolution
    pub fn record_failure(&self, kind: ErrorKind, duration: Duration) {
        self.resolutions_total.fetch_add(1, Ordering::Relaxed);
        self.resolutions_failed.fetch_add(1, Ordering::Relaxed);
        self.push_duration(duration);

        if let Ok(mut breakdown) = self.failures_by_kind.write() {
            *breakdown.entry(kind).or_insert(0) += 1;
        }
    }

    /// Record a navigation
    pub fn record_navigation(&self) {
        self.navigations_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a context being handed out
    pub fn record_context_opened(&self) {
        self.contexts_opened.fetch_add(1, Ordering::Relaxed);
        self.active_contexts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a context teardown
    pub fn record_context_closed(&self) {
        self.contexts_closed.fetch_add(1, Ordering::Relaxed);
        self.active_contexts.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a request rejected by the rate limiter
    pub fn record_rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }

    fn push_duration(&self, duration: Duration) {
        if let Ok(mut durations) = self.resolution_durations.write() {
            durations.push(duration);
        }
    }

    /// Snapshot of recorded resolution durations
    pub fn resolution_durations(&self) -> Option<RingBuffer<Duration>> {
        self.resolution_durations.read().ok().map(|d| d.clone())
    }

    /// Failure count for one error kind
    pub fn failures_of(&self, kind: ErrorKind) -> u64 {
        self.failures_by_kind
            .read()
            .ok()
            .and_then(|m| m.get(&kind).copied())
            .unwrap_or(0)
    }

    /// Seconds since [`init`] was called
    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .read()
            .ok()
            .and_then(|t| *t)
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    /// Convert metrics to Prometheus text format
    pub fn to_prometheus_format(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "clipresolve_resolutions_total {}\n",
            self.resolutions_total.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "clipresolve_resolutions_succeeded_total {}\n",
            self.resolutions_succeeded.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "clipresolve_resolutions_failed_total {}\n",
            self.resolutions_failed.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "clipresolve_navigations_total {}\n",
            self.navigations_total.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "clipresolve_contexts_opened_total {}\n",
            self.contexts_opened.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "clipresolve_contexts_closed_total {}\n",
            self.contexts_closed.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "clipresolve_rate_limited_total {}\n",
            self.rate_limited_total.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "clipresolve_active_contexts {}\n",
            self.active_contexts.load(Ordering::Relaxed)
        ));

        if let Ok(breakdown) = self.failures_by_kind.read() {
            for kind in ErrorKind::ALL {
                let count = breakdown.get(&kind).copied().unwrap_or(0);
                output.push_str(&format!(
                    "clipresolve_failures_total{{kind=\"{}\"}} {}\n",
                    kind.as_str(),
                    count
                ));
            }
        }

        if let Ok(breakdown) = self.hits_by_strategy.read() {
            let mut strategies: Vec<_> = breakdown.iter().collect();
            strategies.sort();
            for (strategy, count) in strategies {
                output.push_str(&format!(
                    "clipresolve_strategy_hits_total{{strategy=\"{}\"}} {}\n",
                    strategy, count
                ));
            }
        }

        if let Ok(durations) = self.resolution_durations.read() {
            for (label, p) in [("p50", 0.5), ("p95", 0.95), ("p99", 0.99)] {
                if let Some(value) = durations.percentile(p) {
                    output.push_str(&format!(
                        "clipresolve_resolution_duration_{}_ms {}\n",
                        label,
                        value.as_millis()
                    ));
                }
            }
        }

        output
    }
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get or initialize the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Initialize global metrics (call once at startup)
pub fn init() {
    if let Ok(mut start_time) = global_metrics().start_time.write() {
        start_time.get_or_insert_with(Instant::now);
    }
}
