//! Per-client request rate limiting
//!
//! Fixed-window counters keyed by peer address. Every resolution holds a
//! browser context for seconds, so a single client must not be able to queue
//! up the whole pool.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Number of tracked clients above which expired windows are pruned
const PRUNE_THRESHOLD: usize = 1024;

/// Fixed-window counter for one client
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Maximum requests per window
    max_requests: u32,
    /// Window length
    window: Duration,
    /// Requests counted in the current window
    request_count: u32,
    /// Window start time
    window_start: Instant,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            request_count: 0,
            window_start: Instant::now(),
        }
    }

    /// Check if a request is allowed (and count it if so)
    pub fn check(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.request_count = 0;
        }

        if self.request_count < self.max_requests {
            self.request_count += 1;
            true
        } else {
            false
        }
    }

    /// Get remaining requests in current window
    pub fn remaining(&self) -> u32 {
        self.max_requests.saturating_sub(self.request_count)
    }

    /// Time until the current window ends
    pub fn retry_after(&self) -> Duration {
        self.window.saturating_sub(self.window_start.elapsed())
    }

    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.window_start) >= self.window
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request may proceed
    Allowed {
        /// Requests left in this window
        remaining: u32,
    },
    /// Request must be rejected
    Limited {
        /// Seconds until the window resets (at least 1)
        retry_after_secs: u64,
    },
}

/// Rate limiters for every client seen
#[derive(Debug)]
pub struct ClientRateLimiter {
    max_requests: u32,
    window: Duration,
    clients: Mutex<HashMap<IpAddr, RateLimiter>>,
}

impl ClientRateLimiter {
    /// Allow `max_requests` per `window` for each client address
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Count a request from `client`
    pub fn check(&self, client: IpAddr) -> RateDecision {
        let mut clients = self.clients.lock();

        if clients.len() >= PRUNE_THRESHOLD {
            let now = Instant::now();
            clients.retain(|_, limiter| !limiter.expired(now));
        }

        let limiter = clients
            .entry(client)
            .or_insert_with(|| RateLimiter::new(self.max_requests, self.window));

        if limiter.check() {
            RateDecision::Allowed {
                remaining: limiter.remaining(),
            }
        } else {
            RateDecision::Limited {
                retry_after_secs: limiter.retry_after().as_secs().max(1),
            }
        }
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.clients.lock().len()
    }
}
