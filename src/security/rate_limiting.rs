use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::RateLimitConfig;

/// Time source for the limiter. Production uses [`SystemClock`]; tests
/// inject a controllable clock so window expiry is exercised without
/// sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub remaining: usize,
    pub retry_after: Option<Duration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitMetrics {
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub blocked_requests: u64,
    pub active_clients: usize,
}

#[derive(Debug)]
struct RequestRecord {
    timestamps: Vec<Instant>,
    blocked_until: Option<Instant>,
}

/// Per-user sliding-window limiter with a temporary block after a
/// violation.
pub struct RateLimiter<C: Clock = SystemClock> {
    config: RateLimitConfig,
    clock: C,
    records: Mutex<HashMap<String, RequestRecord>>,
    metrics: Mutex<RateLimitMetrics>,
    whitelist: HashSet<String>,
    blacklist: HashSet<String>,
    last_cleanup: Mutex<Instant>,
}

impl RateLimiter<SystemClock> {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(config: RateLimitConfig, clock: C) -> Self {
        let now = clock.now();
        Self {
            config,
            clock,
            records: Mutex::new(HashMap::new()),
            metrics: Mutex::new(RateLimitMetrics::default()),
            whitelist: HashSet::new(),
            blacklist: HashSet::new(),
            last_cleanup: Mutex::new(now),
        }
    }

    pub fn add_to_whitelist(&mut self, user_id: impl Into<String>) {
        self.whitelist.insert(user_id.into());
    }

    pub fn add_to_blacklist(&mut self, user_id: impl Into<String>) {
        self.blacklist.insert(user_id.into());
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_seconds)
    }

    fn block_duration(&self) -> Duration {
        Duration::from_secs(self.config.block_seconds)
    }

    /// Record one request attempt and decide whether it may proceed.
    pub fn check(&self, user_id: &str) -> RateLimitStatus {
        let mut metrics = self.metrics.lock().unwrap_or_else(|e| e.into_inner());
        metrics.total_requests += 1;

        if !self.config.enabled || self.whitelist.contains(user_id) {
            metrics.allowed_requests += 1;
            return RateLimitStatus {
                allowed: true,
                remaining: self.config.max_requests,
                retry_after: None,
            };
        }
        if self.blacklist.contains(user_id) {
            metrics.blocked_requests += 1;
            return RateLimitStatus {
                allowed: false,
                remaining: 0,
                retry_after: None,
            };
        }
        drop(metrics);

        let now = self.clock.now();
        self.maybe_cleanup(now);

        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let record = records.entry(user_id.to_string()).or_insert(RequestRecord {
            timestamps: Vec::new(),
            blocked_until: None,
        });

        if let Some(until) = record.blocked_until {
            if now < until {
                let mut metrics = self.metrics.lock().unwrap_or_else(|e| e.into_inner());
                metrics.blocked_requests += 1;
                return RateLimitStatus {
                    allowed: false,
                    remaining: 0,
                    retry_after: Some(until - now),
                };
            }
            record.blocked_until = None;
            record.timestamps.clear();
        }

        let window = self.window();
        record.timestamps.retain(|t| now.duration_since(*t) < window);

        if record.timestamps.len() >= self.config.max_requests {
            let until = now + self.block_duration();
            record.blocked_until = Some(until);
            let mut metrics = self.metrics.lock().unwrap_or_else(|e| e.into_inner());
            metrics.blocked_requests += 1;
            return RateLimitStatus {
                allowed: false,
                remaining: 0,
                retry_after: Some(self.block_duration()),
            };
        }

        record.timestamps.push(now);
        let remaining = self.config.max_requests - record.timestamps.len();
        let mut metrics = self.metrics.lock().unwrap_or_else(|e| e.into_inner());
        metrics.allowed_requests += 1;
        metrics.active_clients = records.len();
        RateLimitStatus {
            allowed: true,
            remaining,
            retry_after: None,
        }
    }

    /// Drop records with no activity inside the window and no active block.
    fn maybe_cleanup(&self, now: Instant) {
        let mut last = self.last_cleanup.lock().unwrap_or_else(|e| e.into_inner());
        if now.duration_since(*last) < self.window() {
            return;
        }
        *last = now;
        drop(last);

        let window = self.window();
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.retain(|_, record| {
            let blocked = record.blocked_until.map(|u| now < u).unwrap_or(false);
            let active = record
                .timestamps
                .iter()
                .any(|t| now.duration_since(*t) < window);
            blocked || active
        });
    }

    pub fn metrics(&self) -> RateLimitMetrics {
        self.metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone)]
    struct FakeClock {
        now: Arc<Mutex<Instant>>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                now: Arc::new(Mutex::new(Instant::now())),
            }
        }

        fn advance(&self, d: Duration) {
            *self.now.lock().unwrap() += d;
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }

    fn config(max_requests: usize) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            max_requests,
            window_seconds: 60,
            block_seconds: 300,
        }
    }

    #[test]
    fn allows_up_to_the_window_limit() {
        let limiter = RateLimiter::with_clock(config(3), FakeClock::new());
        for _ in 0..3 {
            assert!(limiter.check("u-1").allowed);
        }
        assert!(!limiter.check("u-1").allowed);
    }

    #[test]
    fn violation_blocks_for_the_block_duration() {
        let clock = FakeClock::new();
        let limiter = RateLimiter::with_clock(config(1), clock.clone());
        assert!(limiter.check("u-1").allowed);
        let denied = limiter.check("u-1");
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Some(Duration::from_secs(300)));

        // Still blocked after the window alone has passed.
        clock.advance(Duration::from_secs(61));
        assert!(!limiter.check("u-1").allowed);

        // Unblocked once the block duration elapses.
        clock.advance(Duration::from_secs(300));
        assert!(limiter.check("u-1").allowed);
    }

    #[test]
    fn window_slides_with_the_clock() {
        let clock = FakeClock::new();
        let limiter = RateLimiter::with_clock(config(2), clock.clone());
        assert!(limiter.check("u-1").allowed);
        clock.advance(Duration::from_secs(61));
        assert!(limiter.check("u-1").allowed);
        assert!(limiter.check("u-1").allowed);
    }

    #[test]
    fn users_are_limited_independently() {
        let limiter = RateLimiter::with_clock(config(1), FakeClock::new());
        assert!(limiter.check("u-1").allowed);
        assert!(limiter.check("u-2").allowed);
        assert!(!limiter.check("u-1").allowed);
    }

    #[test]
    fn whitelist_bypasses_and_blacklist_denies() {
        let mut limiter = RateLimiter::with_clock(config(1), FakeClock::new());
        limiter.add_to_whitelist("vip");
        limiter.add_to_blacklist("banned");
        for _ in 0..5 {
            assert!(limiter.check("vip").allowed);
        }
        assert!(!limiter.check("banned").allowed);
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let mut cfg = config(1);
        cfg.enabled = false;
        let limiter = RateLimiter::with_clock(cfg, FakeClock::new());
        for _ in 0..10 {
            assert!(limiter.check("u-1").allowed);
        }
    }
}
