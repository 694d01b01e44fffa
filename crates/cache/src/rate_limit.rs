use crate::clock::{Clock, SystemClock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_REQUESTS_PER_WINDOW: u32 = 5;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Buckets idle for longer than this many windows are evicted.
const IDLE_WINDOWS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window: Duration,
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: DEFAULT_REQUESTS_PER_WINDOW,
            window: DEFAULT_WINDOW,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl RateLimitConfig {
    /// Zero values fall back to the defaults.
    pub fn new(requests_per_window: u32, window: Duration) -> Self {
        Self {
            requests_per_window: if requests_per_window == 0 {
                DEFAULT_REQUESTS_PER_WINDOW
            } else {
                requests_per_window
            },
            window: if window.is_zero() { DEFAULT_WINDOW } else { window },
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Read `RATE_LIMIT_REQUESTS` and `RATE_LIMIT_WINDOW`. Missing, invalid or
    /// non-positive values fall back to the defaults.
    pub fn from_env() -> Self {
        let requests = std::env::var("RATE_LIMIT_REQUESTS")
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|v| *v > 0)
            .map(|v| v.min(u32::MAX as i64) as u32)
            .unwrap_or(DEFAULT_REQUESTS_PER_WINDOW);

        let window = std::env::var("RATE_LIMIT_WINDOW")
            .ok()
            .and_then(|v| parse_window(&v))
            .unwrap_or(DEFAULT_WINDOW);

        Self::new(requests, window)
    }

    pub fn refill_interval(&self) -> Duration {
        (self.window / self.requests_per_window).max(Duration::from_nanos(1))
    }

    pub fn idle_timeout(&self) -> Duration {
        self.window * IDLE_WINDOWS
    }
}

/// Parse durations like `1m`, `30s`, `500ms`, `2h` or bare seconds. Zero and
/// unparseable input yield `None`.
pub fn parse_window(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits.parse().ok()?;

    let duration = match unit.trim() {
        "" | "s" => Duration::from_secs(value),
        "ms" => Duration::from_millis(value),
        "m" => Duration::from_secs(value.checked_mul(60)?),
        "h" => Duration::from_secs(value.checked_mul(3600)?),
        _ => return None,
    };

    (!duration.is_zero()).then_some(duration)
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
    last_seen: Instant,
}

impl Bucket {
    fn full(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        }
    }

    /// Credit whole tokens earned since the last refill, never above capacity.
    fn refill(&mut self, now: Instant, interval: Duration, capacity: u32) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let earned = (elapsed.as_nanos() / interval.as_nanos()).min(capacity as u128) as u32;
        if earned == 0 {
            return;
        }

        if self.tokens.saturating_add(earned) >= capacity {
            self.tokens = capacity;
            self.last_refill = now;
        } else {
            self.tokens += earned;
            self.last_refill += interval * earned;
        }
    }

    fn try_take(&mut self) -> bool {
        if self.tokens == 0 {
            return false;
        }
        self.tokens -= 1;
        true
    }
}

struct Inner {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    buckets: Mutex<HashMap<String, Bucket>>,
    sweeper: Mutex<Option<CancellationToken>>,
}

impl Inner {
    fn buckets(&self) -> MutexGuard<'_, HashMap<String, Bucket>> {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sweep(&self) -> usize {
        let now = self.clock.now();
        let idle = self.config.idle_timeout();
        let mut buckets = self.buckets();
        let before = buckets.len();
        buckets.retain(|_, b| now.saturating_duration_since(b.last_seen) <= idle);
        before - buckets.len()
    }
}

/// Token-bucket limiter keyed by client identity. Cloning shares the same
/// buckets and sweep task.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                buckets: Mutex::new(HashMap::new()),
                sweeper: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.inner.config
    }

    /// Take one token from `key`'s bucket. Denial is a normal outcome.
    pub fn allow(&self, key: &str) -> bool {
        let config = &self.inner.config;
        let capacity = config.requests_per_window;
        let interval = config.refill_interval();
        let now = self.inner.clock.now();

        let mut buckets = self.inner.buckets();
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::full(capacity, now));

        bucket.refill(now, interval, capacity);
        bucket.last_seen = now;
        bucket.try_take()
    }

    /// Tokens currently left for `key`, without refilling or touching it.
    pub fn remaining(&self, key: &str) -> Option<u32> {
        self.inner.buckets().get(key).map(|b| b.tokens)
    }

    pub fn bucket_count(&self) -> usize {
        self.inner.buckets().len()
    }

    /// Drop buckets idle for longer than three windows. Returns how many went.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    /// Spawn the periodic sweep onto the current tokio runtime. Calling it
    /// while a sweep task is already running does nothing.
    pub fn start(&self) {
        let mut sweeper = self.inner.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        if sweeper.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let inner = self.inner.clone();
        let period = inner.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = inner.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, "Evicted idle rate limit buckets");
                        }
                    }
                }
            }

            tracing::debug!("Rate limit sweeper stopped");
        });

        *sweeper = Some(token);
    }

    pub fn stop(&self) {
        let token = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(token) = token {
            token.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(config: RateLimitConfig) -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(config, clock.clone());
        (clock, limiter)
    }

    #[test]
    fn test_default_allows_five_per_minute() {
        let (clock, limiter) = limiter(RateLimitConfig::default());

        for i in 0..5 {
            assert!(limiter.allow("127.0.0.1"), "request {} should pass", i + 1);
        }
        assert!(!limiter.allow("127.0.0.1"));

        clock.advance(Duration::from_secs(60));
        assert!(limiter.allow("127.0.0.1"));
    }

    #[test]
    fn test_refills_one_token_per_interval() {
        let (clock, limiter) = limiter(RateLimitConfig::default());
        for _ in 0..5 {
            limiter.allow("k");
        }

        clock.advance(Duration::from_secs(11));
        assert!(!limiter.allow("k"));

        clock.advance(Duration::from_secs(1));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));

        // Partial progress toward the next token is kept.
        clock.advance(Duration::from_secs(6));
        assert!(!limiter.allow("k"));
        clock.advance(Duration::from_secs(6));
        assert!(limiter.allow("k"));
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let (clock, limiter) = limiter(RateLimitConfig::default());
        limiter.allow("k");

        clock.advance(Duration::from_secs(3600));
        limiter.allow("k");
        assert_eq!(limiter.remaining("k"), Some(4));
    }

    #[test]
    fn test_custom_config() {
        let (clock, limiter) = limiter(RateLimitConfig::new(2, Duration::from_secs(1)));

        assert!(limiter.allow("192.168.0.1"));
        assert!(limiter.allow("192.168.0.1"));
        assert!(!limiter.allow("192.168.0.1"));

        clock.advance(Duration::from_secs(1));
        assert!(limiter.allow("192.168.0.1"));
    }

    #[test]
    fn test_keys_are_independent() {
        let (_, limiter) = limiter(RateLimitConfig::new(1, Duration::from_secs(60)));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(limiter.allow("b"));
    }

    #[test]
    fn test_non_positive_values_fall_back() {
        let config = RateLimitConfig::new(0, Duration::ZERO);
        assert_eq!(config.requests_per_window, DEFAULT_REQUESTS_PER_WINDOW);
        assert_eq!(config.window, DEFAULT_WINDOW);
        assert_eq!(config.refill_interval(), Duration::from_secs(12));
    }

    #[test]
    fn test_parse_window() {
        assert_eq!(parse_window("1m"), Some(Duration::from_secs(60)));
        assert_eq!(parse_window("1s"), Some(Duration::from_secs(1)));
        assert_eq!(parse_window("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_window("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_window(" 45 "), Some(Duration::from_secs(45)));
        assert_eq!(parse_window("0s"), None);
        assert_eq!(parse_window("-1m"), None);
        assert_eq!(parse_window("soon"), None);
        assert_eq!(parse_window(""), None);
    }

    #[test]
    fn test_sweep_evicts_idle_buckets() {
        let (clock, limiter) = limiter(RateLimitConfig::default());
        limiter.allow("old");

        clock.advance(Duration::from_secs(120));
        limiter.allow("fresh");

        clock.advance(Duration::from_secs(61));
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.bucket_count(), 1);
        assert!(limiter.remaining("old").is_none());

        // An evicted key starts over with a full bucket.
        for _ in 0..5 {
            assert!(limiter.allow("old"));
        }
    }

    #[test]
    fn test_concurrent_keys_stay_within_capacity() {
        let (_, limiter) = limiter(RateLimitConfig::default());
        let keys: Vec<String> = (0..32).map(|i| format!("10.0.0.{}", i)).collect();
        let granted = Mutex::new(HashMap::<String, u32>::new());

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..10 {
                        for key in &keys {
                            if limiter.allow(key) {
                                *granted.lock().unwrap().entry(key.clone()).or_default() += 1;
                            }
                        }
                    }
                });
            }
        });

        let granted = granted.into_inner().unwrap();
        assert_eq!(granted.len(), keys.len());
        for key in &keys {
            assert_eq!(granted[key], DEFAULT_REQUESTS_PER_WINDOW);
            assert_eq!(limiter.remaining(key), Some(0));
        }
    }

    #[tokio::test]
    async fn test_background_sweep_lifecycle() {
        let clock = Arc::new(ManualClock::new());
        let config = RateLimitConfig {
            sweep_interval: Duration::from_millis(10),
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::with_clock(config, clock.clone());

        limiter.start();
        limiter.start();
        assert!(limiter.is_running());

        limiter.allow("idle");
        clock.advance(Duration::from_secs(181));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(limiter.bucket_count(), 0);

        limiter.stop();
        assert!(!limiter.is_running());

        limiter.allow("idle");
        clock.advance(Duration::from_secs(181));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(limiter.bucket_count(), 1);
    }
}
