//! Token-bucket admission control keyed by bucket name
//!
//! Each named bucket is a `governor` GCRA limiter, which behaves as a token
//! bucket refilled continuously: tokens at time T = min(capacity, tokens at
//! T0 + (T - T0) * rate). Buckets live for the lifetime of the registry and
//! are shared by every call site using the same name.
//!
//! Buckets read time from the registry's clock. The default [`TokioClock`]
//! follows the tokio timer, so a paused test runtime also pauses refills.

use crate::error::{CoordError, CoordResult};
use governor::clock::{Clock, Reference};
use governor::middleware::NoOpMiddleware;
use governor::nanos::Nanos;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

type DirectLimiter<C> =
    RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Upper bound on wait-and-retry cycles for one admission
const MAX_ADMISSION_ATTEMPTS: u32 = 8;

/// Governor clock driven by `tokio::time::Instant`
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    type Instant = Nanos;

    fn now(&self) -> Nanos {
        Nanos::from(self.origin.elapsed())
    }
}

/// Per-bucket configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    /// Maximum burst of immediately available tokens
    pub capacity: u32,
    /// Tokens added per second (capped at capacity)
    pub refill_per_second: f64,
    /// How long an admission may wait for a token (0 = fail immediately)
    pub max_wait_ms: u64,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            refill_per_second: 1.0,
            max_wait_ms: 0,
        }
    }
}

impl BucketConfig {
    pub fn validate(&self) -> CoordResult<()> {
        self.quota().map(|_| ())
    }

    /// Interval between two refilled tokens
    fn period(&self) -> CoordResult<Duration> {
        if !(self.refill_per_second.is_finite() && self.refill_per_second > 0.0) {
            return Err(CoordError::InvalidConfig(format!(
                "bucket refill rate must be positive, got {}",
                self.refill_per_second
            )));
        }
        Duration::try_from_secs_f64(1.0 / self.refill_per_second).map_err(|_| {
            CoordError::InvalidConfig(format!(
                "bucket refill rate {} is too low",
                self.refill_per_second
            ))
        })
    }

    fn quota(&self) -> CoordResult<Quota> {
        let burst = NonZeroU32::new(self.capacity).ok_or_else(|| {
            CoordError::InvalidConfig("bucket capacity must be at least 1".to_string())
        })?;
        Quota::with_period(self.period()?)
            .map(|quota| quota.allow_burst(burst))
            .ok_or_else(|| {
                CoordError::InvalidConfig(format!(
                    "bucket refill rate {} is too high",
                    self.refill_per_second
                ))
            })
    }

    fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// Registry of named token buckets
///
/// Construct once per process (or per test) and share via `Arc`.
pub struct RateLimiterRegistry<C: Clock = TokioClock> {
    buckets: Mutex<HashMap<String, Arc<DirectLimiter<C>>>>,
    clock: C,
}

impl RateLimiterRegistry<TokioClock> {
    pub fn new() -> Self {
        Self::with_clock(TokioClock::new())
    }
}

impl Default for RateLimiterRegistry<TokioClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> RateLimiterRegistry<C>
where
    C: Clock + Clone,
{
    /// Registry whose buckets all read `clock`
    pub fn with_clock(clock: C) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Get or create the named bucket
    ///
    /// The first configuration registered under a name defines the bucket.
    fn bucket(&self, name: &str, config: &BucketConfig) -> CoordResult<Arc<DirectLimiter<C>>> {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = buckets.get(name) {
            return Ok(Arc::clone(existing));
        }
        let limiter = Arc::new(RateLimiter::direct_with_clock(
            config.quota()?,
            self.clock.clone(),
        ));
        debug!(
            bucket = name,
            capacity = config.capacity,
            refill_per_second = config.refill_per_second,
            "Created rate limit bucket"
        );
        buckets.insert(name.to_string(), Arc::clone(&limiter));
        Ok(limiter)
    }

    /// Take one token from the named bucket
    ///
    /// Waits for a token while the wait fits inside `max_wait_ms`; otherwise
    /// fails with `RateLimitExceeded`, which callers treat as transient.
    pub async fn acquire(&self, name: &str, config: &BucketConfig) -> CoordResult<()> {
        let limiter = self.bucket(name, config)?;
        let started = self.clock.now();

        for attempt in 1..=MAX_ADMISSION_ATTEMPTS {
            let not_until = match limiter.check() {
                Ok(()) => return Ok(()),
                Err(not_until) => not_until,
            };

            let now = self.clock.now();
            let wait = not_until.wait_time_from(now);
            let waited = Duration::from(now.duration_since(started));
            if waited + wait > config.max_wait() {
                debug!(
                    bucket = name,
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    "Rate limit exceeded"
                );
                return Err(CoordError::RateLimitExceeded(name.to_string()));
            }

            debug!(
                bucket = name,
                attempt,
                wait_ms = wait.as_millis() as u64,
                "Rate limiting: waiting for token"
            );
            tokio::time::sleep(wait).await;
        }

        Err(CoordError::RateLimitExceeded(name.to_string()))
    }

    /// Run `operation` once a token has been acquired
    ///
    /// The operation is not invoked at all when admission is denied.
    pub async fn execute_with_rate_limit<F, Fut, T>(
        &self,
        name: &str,
        config: &BucketConfig,
        operation: F,
    ) -> CoordResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire(name, config).await?;
        Ok(operation().await)
    }

    /// Names of all buckets created so far
    pub fn bucket_names(&self) -> Vec<String> {
        let buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = buckets.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bursty() -> BucketConfig {
        BucketConfig {
            capacity: 5,
            refill_per_second: 1.0,
            max_wait_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_burst_then_deny_then_refill() {
        let clock = FakeRelativeClock::default();
        let registry = RateLimiterRegistry::with_clock(clock.clone());
        let config = bursty();

        for i in 0..5 {
            assert!(
                registry.acquire("burst", &config).await.is_ok(),
                "call {} should be admitted",
                i
            );
        }

        let denied = registry.acquire("burst", &config).await;
        assert!(matches!(denied, Err(CoordError::RateLimitExceeded(ref b)) if b == "burst"));

        clock.advance(Duration::from_millis(999));
        assert!(registry.acquire("burst", &config).await.is_err());

        // One token refills after one second
        clock.advance(Duration::from_millis(1));
        assert!(registry.acquire("burst", &config).await.is_ok());
        assert!(registry.acquire("burst", &config).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_runtime_wait_follows_tokio_clock() {
        let registry = RateLimiterRegistry::new();
        let config = BucketConfig {
            capacity: 1,
            refill_per_second: 1.0,
            max_wait_ms: 2000,
        };

        assert!(registry.acquire("paced", &config).await.is_ok());
        let started = tokio::time::Instant::now();
        assert!(registry.acquire("paced", &config).await.is_ok());
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(1) && waited < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_beyond_max_wait_is_denied_without_sleeping() {
        let registry = RateLimiterRegistry::new();
        let config = BucketConfig {
            capacity: 1,
            refill_per_second: 1.0,
            max_wait_ms: 500,
        };

        assert!(registry.acquire("short", &config).await.is_ok());
        let started = tokio::time::Instant::now();
        let denied = registry.acquire("short", &config).await;
        assert!(matches!(denied, Err(CoordError::RateLimitExceeded(_))));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_buckets_are_isolated_by_name() {
        let registry = RateLimiterRegistry::new();
        let config = BucketConfig {
            capacity: 1,
            refill_per_second: 0.1,
            max_wait_ms: 0,
        };

        assert!(registry.acquire("a", &config).await.is_ok());
        assert!(registry.acquire("a", &config).await.is_err());
        assert!(registry.acquire("b", &config).await.is_ok());
        assert_eq!(registry.bucket_names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_shared_name_shares_tokens() {
        let registry = Arc::new(RateLimiterRegistry::new());
        let config = BucketConfig {
            capacity: 3,
            refill_per_second: 0.1,
            max_wait_ms: 0,
        };

        let mut handles = Vec::new();
        for _ in 0..6 {
            let registry = Arc::clone(&registry);
            let config = config.clone();
            handles.push(tokio::spawn(async move {
                registry.acquire("shared", &config).await.is_ok()
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 3);
    }

    #[tokio::test]
    async fn test_denied_operation_is_not_run() {
        let registry = RateLimiterRegistry::new();
        let config = BucketConfig {
            capacity: 1,
            refill_per_second: 0.1,
            max_wait_ms: 0,
        };
        let runs = AtomicUsize::new(0);

        let first = registry
            .execute_with_rate_limit("op", &config, || async {
                runs.fetch_add(1, Ordering::SeqCst);
                42
            })
            .await;
        assert_eq!(first.unwrap(), 42);

        let second = registry
            .execute_with_rate_limit("op", &config, || async {
                runs.fetch_add(1, Ordering::SeqCst);
                43
            })
            .await;
        assert!(second.is_err());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_admission_succeeds_within_max_wait() {
        let registry = RateLimiterRegistry::new();
        let config = BucketConfig {
            capacity: 1,
            refill_per_second: 20.0,
            max_wait_ms: 500,
        };

        assert!(registry.acquire("wait", &config).await.is_ok());
        // Next token arrives after 50ms, well inside max_wait
        let started = tokio::time::Instant::now();
        assert!(registry.acquire("wait", &config).await.is_ok());
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(50) && waited < Duration::from_millis(100));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let zero_capacity = BucketConfig {
            capacity: 0,
            ..BucketConfig::default()
        };
        assert!(zero_capacity.validate().is_err());

        let negative_rate = BucketConfig {
            refill_per_second: -1.0,
            ..BucketConfig::default()
        };
        assert!(negative_rate.validate().is_err());
    }

    #[tokio::test]
    async fn test_vanishing_refill_rate_is_invalid_not_a_panic() {
        let config = BucketConfig {
            capacity: 1,
            refill_per_second: 1e-300,
            max_wait_ms: 0,
        };
        assert!(matches!(config.validate(), Err(CoordError::InvalidConfig(_))));

        let registry = RateLimiterRegistry::new();
        let result = registry.acquire("slow", &config).await;
        assert!(matches!(result, Err(CoordError::InvalidConfig(_))));
        assert!(registry.bucket_names().is_empty());
    }
}
