//! Per-tool token buckets.
//!
//! Each distinct tool name gets one bucket that refills continuously at
//! `rate_per_min / 60` tokens per second, capped at the per-minute rate
//! (the burst size). A dispatch needs at least one whole token. Buckets
//! live for the process lifetime and are shared across conversations; a
//! single mutex is enough at per-tool granularity.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Shared rate limiter keyed by tool name.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to debit one token from `name`'s bucket at rate `rate_per_min`.
    ///
    /// Returns false when fewer than 1.0 tokens are available; the bucket
    /// is refilled but not debited in that case. A rate of 0 always admits.
    pub fn try_acquire(&self, name: &str, rate_per_min: u32) -> bool {
        self.try_acquire_at(name, rate_per_min, Instant::now())
    }

    /// Clock-injected variant used by tests.
    pub fn try_acquire_at(&self, name: &str, rate_per_min: u32, now: Instant) -> bool {
        if rate_per_min == 0 {
            return true;
        }
        let rate = f64::from(rate_per_min);
        let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");
        let bucket = buckets.entry(name.to_string()).or_insert(Bucket {
            tokens: rate,
            last_refill: now,
        });
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = rate.min(bucket.tokens + elapsed * (rate / 60.0));
        bucket.last_refill = now;
        if bucket.tokens < 1.0 {
            return false;
        }
        bucket.tokens -= 1.0;
        true
    }

    /// Drop all buckets. Test isolation only.
    pub fn clear(&self) {
        self.buckets
            .lock()
            .expect("rate limiter lock poisoned")
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn bucket_starts_full() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        for _ in 0..30 {
            assert!(limiter.try_acquire_at("tool", 30, now));
        }
        assert!(!limiter.try_acquire_at("tool", 30, now));
    }

    #[test]
    fn refills_proportionally_to_elapsed_time() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();
        for _ in 0..60 {
            assert!(limiter.try_acquire_at("tool", 60, t0));
        }
        assert!(!limiter.try_acquire_at("tool", 60, t0));

        // 60/min refills one token per second
        let t1 = t0 + Duration::from_millis(1_100);
        assert!(limiter.try_acquire_at("tool", 60, t1));
        assert!(!limiter.try_acquire_at("tool", 60, t1));
    }

    #[test]
    fn refill_caps_at_burst_size() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();
        limiter.try_acquire_at("tool", 2, t0);
        // an hour later the bucket holds at most the per-minute rate
        let t1 = t0 + Duration::from_secs(3_600);
        assert!(limiter.try_acquire_at("tool", 2, t1));
        assert!(limiter.try_acquire_at("tool", 2, t1));
        assert!(!limiter.try_acquire_at("tool", 2, t1));
    }

    #[test]
    fn zero_rate_disables_limiting() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        for _ in 0..1_000 {
            assert!(limiter.try_acquire_at("tool", 0, now));
        }
    }

    #[test]
    fn buckets_are_per_tool() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        assert!(limiter.try_acquire_at("a", 1, now));
        assert!(!limiter.try_acquire_at("a", 1, now));
        assert!(limiter.try_acquire_at("b", 1, now));
    }
}
