//! Fixed-window request counting.

use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimit {
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window }
    }

    pub const fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { count: u32 },
    /// `retry_after` is whole seconds until the window resets, rounded up.
    Limited { count: u32, retry_after: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at_ms: i64,
}

/// Per-key counters. The reset/increment for one key runs under that key's
/// shard lock, so concurrent requests for the same key never undercount.
///
/// Keys are never evicted.
#[derive(Debug, Default)]
pub struct FixedWindowLimiter {
    windows: DashMap<String, Window>,
}

impl FixedWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, key: &str, limit: &RateLimit) -> RateDecision {
        self.check_at(key, limit, Utc::now().timestamp_millis())
    }

    pub fn check_at(&self, key: &str, limit: &RateLimit, now_ms: i64) -> RateDecision {
        let fresh = Window {
            count: 0,
            reset_at_ms: now_ms.saturating_add(limit.window_ms()),
        };

        let mut window = self.windows.entry(key.to_string()).or_insert(fresh);
        if now_ms > window.reset_at_ms {
            *window = fresh;
        }
        // Rejected requests still count toward the window.
        window.count = window.count.saturating_add(1);

        if window.count > limit.max_requests {
            let remaining_ms = (window.reset_at_ms - now_ms).max(0) as u64;
            RateDecision::Limited {
                count: window.count,
                retry_after: remaining_ms.div_ceil(1000),
            }
        } else {
            RateDecision::Allowed { count: window.count }
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    const LIMIT: RateLimit = RateLimit::new(3, Duration::from_secs(60));

    #[test]
    fn limits_after_max_requests() {
        let limiter = FixedWindowLimiter::new();
        let t0 = 1_700_000_000_000;

        for i in 1..=3 {
            assert_eq!(limiter.check_at("ip:1", &LIMIT, t0 + i), RateDecision::Allowed { count: i as u32 });
        }
        assert_eq!(
            limiter.check_at("ip:1", &LIMIT, t0 + 10_000),
            RateDecision::Limited { count: 4, retry_after: 51 }
        );
    }

    #[test]
    fn retry_after_rounds_up() {
        let limiter = FixedWindowLimiter::new();
        let t0 = 0;
        for _ in 0..3 {
            limiter.check_at("k", &LIMIT, t0);
        }
        assert_eq!(
            limiter.check_at("k", &LIMIT, t0 + 59_001),
            RateDecision::Limited { count: 4, retry_after: 1 }
        );
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = FixedWindowLimiter::new();
        let t0 = 5_000;
        for _ in 0..5 {
            limiter.check_at("user:42", &LIMIT, t0);
        }
        assert!(matches!(limiter.check_at("user:42", &LIMIT, t0 + 60_000), RateDecision::Limited { .. }));
        assert_eq!(limiter.check_at("user:42", &LIMIT, t0 + 60_001), RateDecision::Allowed { count: 1 });
    }

    #[test]
    fn keys_are_independent() {
        let limiter = FixedWindowLimiter::new();
        for _ in 0..4 {
            limiter.check_at("a", &LIMIT, 0);
        }
        assert_eq!(limiter.check_at("b", &LIMIT, 0), RateDecision::Allowed { count: 1 });
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn concurrent_checks_do_not_undercount() {
        let limiter = Arc::new(FixedWindowLimiter::new());
        let limit = RateLimit::per_minute(10_000);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        limiter.check_at("shared", &limit, 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(limiter.check_at("shared", &limit, 1), RateDecision::Allowed { count: 2001 });
    }
}
