//! Per-client request counting.
//!
//! Callers depend on the [`RateLimiter`] trait. The bundled
//! [`FixedWindowLimiter`] keeps its counters in process memory, so limits are
//! per instance: a deployment with several processes needs a limiter backed
//! by a shared store instead.

use std::{collections::HashMap, sync::Mutex};

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    Deny,
}

pub trait RateLimiter: Send + Sync {
    /// Counts one attempt for `key` at `now` and decides whether to admit it.
    fn check(&self, key: &str, now: DateTime<Utc>) -> RateDecision;
}

/// At most `max` admissions per key in each aligned window of length
/// `window`. Buckets whose window began more than `retention` ago are dropped
/// on every check.
pub struct FixedWindowLimiter {
    max: u32,
    window_ms: i64,
    retention_ms: i64,
    buckets: Mutex<HashMap<(String, i64), u32>>,
}

impl FixedWindowLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self::with_retention(max, window, window)
    }

    pub fn with_retention(max: u32, window: Duration, retention: Duration) -> Self {
        Self {
            max,
            window_ms: window.num_milliseconds().max(1),
            retention_ms: retention.num_milliseconds().max(0),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// 3 submissions per client per UTC minute, remembered for an hour.
    pub fn contact_form() -> Self {
        Self::with_retention(3, Duration::minutes(1), Duration::hours(1))
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check(&self, key: &str, now: DateTime<Utc>) -> RateDecision {
        let now_ms = now.timestamp_millis();
        let window = now_ms.div_euclid(self.window_ms);
        let cutoff = now_ms - self.retention_ms;

        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let window_ms = self.window_ms;
        // Keep the live window even when retention is shorter than a window.
        buckets.retain(|(_, w), _| *w == window || w * window_ms >= cutoff);

        let count = buckets.entry((key.to_string(), window)).or_insert(0);
        if *count >= self.max {
            return RateDecision::Deny;
        }
        *count += 1;
        RateDecision::Allow
    }
}
