//! Per-Client Rate Limiting
//!
//! Fixed-window request governor keyed by client identifier (the gateway
//! keys it by client IP). One [`RateWindow`] per client lives in a
//! process-wide map: on each check, the window resets to `count = 1` once
//! its duration has elapsed, otherwise the count increments, and the call
//! is denied when the post-increment count exceeds the budget.
//!
//! State is local to one process instance. Entries are never evicted; the
//! map is a process-lifetime cache and grows with the number of distinct
//! clients. Both are accepted limitations of this design; a multi-instance
//! deployment needs a shared external counter instead.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::config::RateLimitConfig;

/// Default window duration
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Default request budget per window
pub const DEFAULT_MAX_REQUESTS: u32 = 10;

/// Outcome of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    /// Request is within budget
    Allowed {
        /// Requests left in the current window
        remaining: u32,
    },

    /// Budget exhausted; caller should answer with a rate-limit status
    Denied {
        /// Seconds until the window resets
        retry_after_secs: u64,
    },
}

impl RateDecision {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Per-client counter within the current window
#[derive(Debug, Clone)]
struct RateWindow {
    /// Requests seen since `window_start`
    count: u32,

    /// When the current window opened
    window_start: Instant,
}

/// Fixed-window rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Per-client windows. Never pruned; see module docs.
    windows: Arc<RwLock<HashMap<String, RateWindow>>>,

    /// Window duration
    window: Duration,

    /// Request budget per window
    max_requests: u32,

    /// Disabled limiters allow everything
    enabled: bool,
}

impl RateLimiter {
    /// Create a limiter from configuration.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            window: Duration::from_secs(config.window_secs),
            max_requests: config.max_requests,
            enabled: config.enabled,
        }
    }

    /// Create a limiter with the default 60 s / 10 request budget.
    pub fn default_limits() -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            window: DEFAULT_WINDOW,
            max_requests: DEFAULT_MAX_REQUESTS,
            enabled: true,
        }
    }

    /// Create a disabled limiter (for testing and local development).
    pub fn disabled() -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            window: DEFAULT_WINDOW,
            max_requests: DEFAULT_MAX_REQUESTS,
            enabled: false,
        }
    }

    /// Check whether a request from `client_id` is within budget.
    pub async fn check(&self, client_id: &str) -> RateDecision {
        self.check_at(client_id, Instant::now()).await
    }

    /// Check against an explicit clock reading. Internal so tests can walk
    /// time forward without sleeping.
    async fn check_at(&self, client_id: &str, now: Instant) -> RateDecision {
        if !self.enabled {
            return RateDecision::Allowed {
                remaining: u32::MAX,
            };
        }

        // Single write lock covers the whole read-modify-write so
        // concurrent requests for one client cannot interleave.
        let mut windows = self.windows.write().await;
        let window = windows.entry(client_id.to_string()).or_insert(RateWindow {
            count: 0,
            window_start: now,
        });

        if now.duration_since(window.window_start) > self.window {
            window.count = 1;
            window.window_start = now;
        } else {
            window.count += 1;
        }

        if window.count > self.max_requests {
            let elapsed = now.duration_since(window.window_start);
            let retry_after = self.window.saturating_sub(elapsed);
            RateDecision::Denied {
                retry_after_secs: retry_after.as_secs().max(1),
            }
        } else {
            RateDecision::Allowed {
                remaining: self.max_requests - window.count,
            }
        }
    }

    /// Number of distinct clients tracked so far.
    pub async fn tracked_clients(&self) -> usize {
        self.windows.read().await.len()
    }
}
