//! Status, health and metrics handlers
//!
//! - `/health` - liveness check
//! - `/status` - version, uptime, pool counters, memory and latency
//! - `/metrics` - Prometheus text export
//!
//! # Example Response
//!
//! ```json
//! {
//!   "version": "0.1.0",
//!   "uptime_seconds": 3600,
//!   "requests_served": 1024,
//!   "pool": { "live_sessions": 1, "contexts_in_use": 2, "...": "..." },
//!   "latency": { "p50_ms": 2450.0, "p95_ms": 6100.0, "p99_ms": 9800.0 }
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use hdrhistogram::Histogram;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, instrument};

use super::rate_limit::ClientRateLimiter;
use crate::browser::PoolStats;
use crate::metrics::global_metrics;
use crate::Resolver;

/// Server version from Cargo.toml
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server name from Cargo.toml
pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Health status (always "healthy" if responding)
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

/// Resolution outcome counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionCounts {
    /// Resolutions attempted
    pub total: u64,
    /// Resolutions that produced a media URL
    pub succeeded: u64,
    /// Resolutions that failed
    pub failed: u64,
}

/// `/status` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Crate version
    pub version: String,
    /// Crate name
    pub name: String,
    /// Seconds since start
    pub uptime_seconds: u64,
    /// Download requests answered, errors included
    pub requests_served: u64,
    /// Download requests answered with an error
    pub error_count: u64,
    /// Resolver outcomes
    pub resolutions: ResolutionCounts,
    /// Session pool counters
    pub pool: PoolStats,
    /// Process memory
    pub memory: MemoryMetrics,
    /// Download handler latency
    pub latency: LatencyMetrics,
    /// Always "running"
    pub status: String,
    /// RFC 3339
    pub timestamp: String,
}

/// Process memory in bytes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryMetrics {
    /// Resident set size
    pub rss_bytes: u64,
    /// Virtual size
    pub virtual_bytes: u64,
}

/// Latency summary in milliseconds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyMetrics {
    /// Median
    pub p50_ms: f64,
    /// 95th percentile
    pub p95_ms: f64,
    /// 99th percentile
    pub p99_ms: f64,
    /// Samples recorded
    pub total_requests: u64,
    /// Mean
    pub mean_ms: f64,
    /// Slowest
    pub max_ms: f64,
}

/// Resolution latencies, 1us to 60s at 3 significant figures
#[derive(Debug)]
pub struct LatencyHistogram {
    inner: RwLock<Histogram<u64>>,
}

impl LatencyHistogram {
    /// Empty histogram
    pub fn new() -> Self {
        let histogram =
            Histogram::new_with_bounds(1, 60_000_000, 3).expect("histogram bounds are valid");
        Self {
            inner: RwLock::new(histogram),
        }
    }

    /// Out-of-range values are dropped
    pub fn record_duration(&self, duration: Duration) {
        let _ = self.inner.write().record(duration.as_micros() as u64);
    }

    /// Samples recorded
    pub fn count(&self) -> u64 {
        self.inner.read().len()
    }

    /// Percentiles converted to milliseconds.
    pub fn metrics(&self) -> LatencyMetrics {
        let hist = self.inner.read();
        LatencyMetrics {
            p50_ms: hist.value_at_percentile(50.0) as f64 / 1000.0,
            p95_ms: hist.value_at_percentile(95.0) as f64 / 1000.0,
            p99_ms: hist.value_at_percentile(99.0) as f64 / 1000.0,
            total_requests: hist.len(),
            mean_ms: hist.mean() / 1000.0,
            max_ms: hist.max() as f64 / 1000.0,
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state of the HTTP adapter
pub struct AppState {
    resolver: Resolver,
    limiter: ClientRateLimiter,
    start_time: Instant,
    latency_histogram: LatencyHistogram,
    total_requests: AtomicU64,
    error_count: AtomicU64,
}

impl AppState {
    /// State around a resolver and a per-client rate limiter
    pub fn new(resolver: Resolver, limiter: ClientRateLimiter) -> Self {
        Self {
            resolver,
            limiter,
            start_time: Instant::now(),
            latency_histogram: LatencyHistogram::new(),
            total_requests: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    /// The resolver requests are served with
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// The per-client rate limiter
    pub fn limiter(&self) -> &ClientRateLimiter {
        &self.limiter
    }

    /// Get the server uptime in seconds.
    #[inline]
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Record an answered request and its latency.
    #[inline]
    pub fn record_latency(&self, duration: Duration) {
        self.latency_histogram.record_duration(duration);
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the latency metrics.
    #[inline]
    pub fn latency_metrics(&self) -> LatencyMetrics {
        self.latency_histogram.metrics()
    }

    /// Get the total number of requests processed.
    #[inline]
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Record an error.
    #[inline]
    pub fn record_error(&self) -> u64 {
        self.error_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get the total error count.
    #[inline]
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }
}

/// Collect memory metrics for the current process using sysinfo.
fn collect_memory_metrics() -> MemoryMetrics {
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    match system.process(pid) {
        Some(process) => MemoryMetrics {
            rss_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
        },
        None => {
            debug!("Could not find current process in sysinfo");
            MemoryMetrics::default()
        }
    }
}

/// `GET /health`
#[instrument(skip_all)]
pub async fn health_handler() -> impl IntoResponse {
    debug!("Health check requested");
    (StatusCode::OK, Json(HealthResponse::default()))
}

/// `GET /status`
#[instrument(skip_all)]
pub async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Status check requested");

    let metrics = global_metrics();
    let response = StatusResponse {
        version: SERVER_VERSION.to_string(),
        name: SERVER_NAME.to_string(),
        uptime_seconds: state.uptime_seconds(),
        requests_served: state.total_requests(),
        error_count: state.error_count(),
        resolutions: ResolutionCounts {
            total: metrics.resolutions_total.load(Ordering::Relaxed),
            succeeded: metrics.resolutions_succeeded.load(Ordering::Relaxed),
            failed: metrics.resolutions_failed.load(Ordering::Relaxed),
        },
        pool: state.resolver().stats().await,
        memory: collect_memory_metrics(),
        latency: state.latency_metrics(),
        status: "running".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(response))
}

/// `GET /metrics`
#[instrument(skip_all)]
pub async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        global_metrics().to_prometheus_format(),
    )
}

/// Routes for `/health`, `/status` and `/metrics`
pub fn status_router() -> axum::Router<Arc<AppState>> {
    use axum::routing::get;

    axum::Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
}
