//! Fixed-window rate limiting.
//!
//! Bounds authentication attempts per client-identifying key (for example
//! a network origin) per time window. The check is non-blocking and runs
//! before any token parsing.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::RateLimitConfig;

/// Per-key counting window.
#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window rate limiter keyed by an opaque client key.
///
/// Keys are independent of token subjects: the limiter protects the
/// service from a noisy client, not a noisy subject.
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    /// Creates a limiter from configuration.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            window: config.window,
            max_requests: config.max_requests,
        }
    }

    /// Records an attempt for `client_key` and returns whether it is
    /// within the limit.
    ///
    /// The first attempt in a window always passes; attempt N+1 within
    /// the same window fails once N equals the configured maximum.
    pub fn allow(&self, client_key: &str) -> bool {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(client_key.to_string())
            .or_insert(Window {
                started: now,
                count: 0,
            });

        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= self.max_requests {
            tracing::debug!(client = %client_key, "rate limit exceeded");
            return false;
        }

        entry.count += 1;
        true
    }

    /// Removes windows that have been idle past their expiry.
    ///
    /// Called by the background sweeper; limits memory growth from
    /// one-shot clients.
    pub fn prune_stale(&self) -> u64 {
        let before = self.windows.len();
        let window = self.window;
        self.windows
            .retain(|_, w| w.started.elapsed() < window);
        (before - self.windows.len()) as u64
    }

    /// Returns the number of tracked client keys.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}
