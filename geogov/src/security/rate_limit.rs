//! Token-bucket rate limiting keyed by caller.
//!
//! Buckets refill continuously at `capacity / window` tokens per second up
//! to `capacity`. All buckets live behind one mutex so increments for a key
//! are totally ordered; a rejected request does not consume a token.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Bucket-map size at which stale entries are swept.
const GC_THRESHOLD: usize = 1_024;

#[derive(Debug, Clone, PartialEq)]
pub enum RateDecision {
    Permitted,
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_permitted(&self) -> bool {
        matches!(self, RateDecision::Permitted)
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    updated: Instant,
}

/// Token-bucket limiter shared across all in-flight requests.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    capacity: f64,
    refill_rate: f64,
    window: Duration,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl TokenBucketLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        let capacity = f64::from(max_requests.max(1));
        let window = if window.is_zero() {
            Duration::from_secs(1)
        } else {
            window
        };
        Self {
            capacity,
            refill_rate: capacity / window.as_secs_f64(),
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn allow(&self, key: &str) -> RateDecision {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());

        if buckets.len() >= GC_THRESHOLD {
            let window = self.window;
            buckets.retain(|_, bucket| now.duration_since(bucket.updated) < window);
        }

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            updated: now,
        });

        // Continuous refill since the last touch.
        let elapsed = now.duration_since(bucket.updated).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.capacity);
        bucket.updated = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateDecision::Permitted
        } else {
            let seconds = (1.0 - bucket.tokens) / self.refill_rate;
            RateDecision::Limited {
                retry_after: Duration::from_secs_f64(seconds),
            }
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Limiter selected by configuration: the disabled mode never blocks.
#[derive(Debug)]
pub enum RateLimiter {
    Noop,
    TokenBucket(TokenBucketLimiter),
}

impl RateLimiter {
    pub fn from_settings(enabled: bool, max_requests: u32, window: Duration) -> Self {
        if enabled {
            RateLimiter::TokenBucket(TokenBucketLimiter::new(max_requests, window))
        } else {
            RateLimiter::Noop
        }
    }

    pub fn allow(&self, key: &str) -> RateDecision {
        match self {
            RateLimiter::Noop => RateDecision::Permitted,
            RateLimiter::TokenBucket(limiter) => limiter.allow(key),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, RateLimiter::TokenBucket(_))
    }
}
