//! Sliding-window request limiter.
//!
//! One instance is built per deployment unit and handed to every
//! [`GuardedProvider`](crate::GuardedProvider) that should share its budget.
//! Counters are keyed by scope (typically the provider name), so separate
//! scopes never consume each other's allowance.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-scope sliding-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    scopes: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            scopes: Mutex::new(HashMap::new()),
        }
    }

    /// Build from the `[rate_limit]` config section. Returns `None` when
    /// rate limiting is disabled.
    pub fn from_config(config: &cardwise_config::RateLimitConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.max_requests, Duration::from_secs(config.window_secs)))
    }

    /// Record a request for `scope` if it fits in the window.
    ///
    /// Returns `true` if allowed. Rejected requests are not recorded.
    pub fn check(&self, scope: &str) -> bool {
        let now = Instant::now();
        let mut scopes = self.scopes.lock().unwrap_or_else(|e| e.into_inner());

        let timestamps = scopes.entry(scope.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }

    /// How long until `scope` may send again. Zero when it may send now.
    pub fn retry_after(&self, scope: &str) -> Duration {
        let now = Instant::now();
        let scopes = self.scopes.lock().unwrap_or_else(|e| e.into_inner());

        let Some(timestamps) = scopes.get(scope) else {
            return Duration::ZERO;
        };

        let live: Vec<&Instant> = timestamps
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .collect();

        if live.len() < self.max_requests {
            return Duration::ZERO;
        }

        live.first()
            .map(|oldest| self.window.saturating_sub(now.duration_since(**oldest)))
            .unwrap_or(Duration::ZERO)
    }

    /// Requests still available to `scope` in the current window.
    pub fn remaining(&self, scope: &str) -> usize {
        let now = Instant::now();
        let scopes = self.scopes.lock().unwrap_or_else(|e| e.into_inner());
        let used = scopes
            .get(scope)
            .map(|ts| ts.iter().filter(|t| now.duration_since(**t) < self.window).count())
            .unwrap_or(0);
        self.max_requests.saturating_sub(used)
    }
}
