//! Per-IP sliding-window rate limiter
//!
//! Keeps an ordered window of request timestamps per IP, pruned of entries
//! older than the window on every access. Every `check` call mutates state:
//! processing the same record twice inflates the count. Stale IPs are never
//! evicted, so memory is bounded by distinct IPs times the quota, not by
//! total records processed.

use std::collections::{HashMap, VecDeque};

use crate::config::LimiterConfig;

/// Sliding-window rate limiter keyed by IP
///
/// Owned by the classification engine and injected per run; never a
/// process-wide singleton, so independent runs do not cross-contaminate.
pub struct RateLimiter {
    window_ms: i64,
    max_requests: usize,
    windows: HashMap<String, VecDeque<i64>>,
}

impl RateLimiter {
    pub fn new(config: &LimiterConfig) -> Self {
        Self {
            window_ms: config.window_ms,
            max_requests: config.max_requests,
            windows: HashMap::new(),
        }
    }

    /// Record a request for `ip` at `now_ms` and report whether the quota
    /// is exceeded. Prunes timestamps older than the window, appends `now_ms`,
    /// then compares the window length against the quota.
    pub fn check(&mut self, ip: &str, now_ms: i64) -> bool {
        let window = self
            .windows
            .entry(ip.to_string())
            .or_insert_with(VecDeque::new);

        while let Some(&oldest) = window.front() {
            if now_ms - oldest > self.window_ms {
                window.pop_front();
            } else {
                break;
            }
        }

        window.push_back(now_ms);
        window.len() > self.max_requests
    }

    /// Number of distinct IPs currently tracked
    pub fn tracked_ips(&self) -> usize {
        self.windows.len()
    }
}
