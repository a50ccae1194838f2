//! Keyed token-bucket rate limiter with a sliding request window.
//!
//! Each key owns an independent bucket holding up to `capacity` tokens that
//! refill continuously over `window`. A check deducts `weight` tokens or is
//! denied with the time needed to earn them back. Buckets are created lazily
//! and live until reset.
//!
//! The provider may report its own view of usage through response headers;
//! [`RateLimiter::update_from_headers`] folds that back into the bucket so
//! that local accounting never drifts optimistic.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::backoff::{Backoff, BackoffConfig};
use super::circuit_breaker::{ConfigError, ConfigResult};
use super::clock::{Clock, SystemClock};

/// Usage headers inspected by [`RateLimiter::update_from_headers`]
pub const USAGE_HEADERS: [&str; 2] = ["x-business-use-case-usage", "x-app-usage"];

/// Configuration for [`RateLimiter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Maximum number of tokens a bucket can hold
    pub capacity: u32,
    /// Time over which an empty bucket refills completely
    pub window: Duration,
    /// Backoff parameters for [`RateLimiter::calculate_backoff`]
    pub backoff: BackoffConfig,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { capacity: 200, window: Duration::from_secs(3600), backoff: BackoffConfig::default() }
    }
}

impl RateLimiterConfig {
    /// Create a new configuration builder
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.capacity == 0 {
            return Err(ConfigError::invalid("capacity must be greater than 0"));
        }
        if self.window.as_millis() == 0 {
            return Err(ConfigError::invalid("window must be at least one millisecond"));
        }
        self.backoff.validate()
    }

    fn window_ms(&self) -> u64 {
        u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Builder for RateLimiterConfig
#[derive(Debug, Default)]
pub struct RateLimiterConfigBuilder {
    config: RateLimiterConfig,
}

impl RateLimiterConfigBuilder {
    pub fn new() -> Self {
        Self { config: RateLimiterConfig::default() }
    }

    pub fn capacity(mut self, capacity: u32) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.config.backoff = backoff;
        self
    }

    pub fn build(self) -> ConfigResult<RateLimiterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// A check was denied; nothing was deducted
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Rate limit exceeded for `{key}`, retry after {retry_after:?}")]
pub struct RateLimitExceeded {
    pub key: String,
    pub retry_after: Duration,
}

/// Usage report for one key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStats {
    pub tokens_remaining: f64,
    pub requests_in_window: usize,
    /// Rounded share of capacity currently consumed
    pub percentage_used: u32,
    pub successful_calls: u64,
}

#[derive(Debug)]
struct RateLimitBucket {
    tokens: f64,
    last_refill: u64,
    request_timestamps: VecDeque<u64>,
    successful_calls: u64,
}

impl RateLimitBucket {
    fn full(capacity: u32, now: u64) -> Self {
        Self {
            tokens: f64::from(capacity),
            last_refill: now,
            request_timestamps: VecDeque::new(),
            successful_calls: 0,
        }
    }
}

/// Keyed token bucket rate limiter
///
/// Distinct keys never share tokens. Each check runs while holding the key's
/// map entry, so refill, prune and deduct are atomic per key.
pub struct RateLimiter<C: Clock = SystemClock> {
    config: RateLimiterConfig,
    buckets: DashMap<String, RateLimitBucket>,
    backoff: Backoff,
    clock: Arc<C>,
}

impl<C: Clock> std::fmt::Debug for RateLimiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

impl RateLimiter<SystemClock> {
    /// Create a rate limiter backed by the system clock
    pub fn new(config: RateLimiterConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a rate limiter with a custom clock (useful for testing)
    pub fn with_clock(config: RateLimiterConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        let backoff = Backoff::new(config.backoff)?;

        Ok(Self { config, buckets: DashMap::new(), backoff, clock: Arc::new(clock) })
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Deduct `weight` tokens from `key`'s bucket or report how long to wait
    pub fn check_limit(&self, key: &str, weight: u32) -> Result<(), RateLimitExceeded> {
        let now = self.clock.millis_since_epoch();
        let mut bucket = self
            .buckets
            .entry(key.to_owned())
            .or_insert_with(|| RateLimitBucket::full(self.config.capacity, now));

        self.refill(&mut bucket, now);
        self.prune(&mut bucket, now);

        let needed = f64::from(weight);
        if bucket.tokens < needed {
            let retry_after = self.time_to_wait(weight);
            debug!(
                key,
                weight,
                tokens = bucket.tokens,
                retry_after_ms = retry_after.as_millis(),
                "rate limit exceeded"
            );
            return Err(RateLimitExceeded { key: key.to_owned(), retry_after });
        }

        bucket.tokens -= needed;
        bucket.request_timestamps.push_back(now);
        Ok(())
    }

    /// Post-call accounting hook; never fails
    pub fn track_usage(&self, key: &str) {
        let now = self.clock.millis_since_epoch();
        let mut bucket = self
            .buckets
            .entry(key.to_owned())
            .or_insert_with(|| RateLimitBucket::full(self.config.capacity, now));
        bucket.successful_calls += 1;
        debug!(key, successful_calls = bucket.successful_calls, "api usage tracked");
    }

    /// Current usage for `key`; an unseen key reports a full bucket
    pub fn usage_stats(&self, key: &str) -> UsageStats {
        let now = self.clock.millis_since_epoch();
        let capacity = f64::from(self.config.capacity);

        let Some(mut bucket) = self.buckets.get_mut(key) else {
            return UsageStats {
                tokens_remaining: capacity,
                requests_in_window: 0,
                percentage_used: 0,
                successful_calls: 0,
            };
        };

        self.refill(&mut bucket, now);
        self.prune(&mut bucket, now);

        let used = ((capacity - bucket.tokens) / capacity * 100.0).round().clamp(0.0, 100.0);
        UsageStats {
            tokens_remaining: bucket.tokens,
            requests_in_window: bucket.request_timestamps.len(),
            percentage_used: used as u32,
            successful_calls: bucket.successful_calls,
        }
    }

    /// Forget `key`'s bucket; the next check starts full
    pub fn reset(&self, key: &str) {
        self.buckets.remove(key);
    }

    /// Forget every bucket
    pub fn reset_all(&self) {
        self.buckets.clear();
    }

    /// Overwrite `key`'s tokens from a provider-reported usage percentage
    pub fn update_from_usage(&self, key: &str, call_count_percentage: f64) {
        let now = self.clock.millis_since_epoch();
        let capacity = f64::from(self.config.capacity);
        let used = (capacity * call_count_percentage / 100.0).floor();
        let tokens = (capacity - used).clamp(0.0, capacity);

        let mut bucket = self
            .buckets
            .entry(key.to_owned())
            .or_insert_with(|| RateLimitBucket::full(self.config.capacity, now));
        bucket.tokens = tokens;
        debug!(key, call_count_percentage, tokens, "bucket synced from provider usage");
    }

    /// Fold the provider's usage headers into `key`'s bucket
    ///
    /// Malformed headers are logged and ignored.
    pub fn update_from_headers(&self, headers: &HeaderMap, key: &str) {
        let mut highest: Option<f64> = None;

        for name in USAGE_HEADERS {
            let Some(value) = headers.get(name) else {
                continue;
            };
            let parsed = value
                .to_str()
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str::<Value>(raw).map_err(|e| e.to_string()));
            match parsed {
                Ok(usage) => {
                    if let Some(pct) = call_count(&usage) {
                        highest = Some(highest.map_or(pct, |current| current.max(pct)));
                    }
                }
                Err(error) => warn!(header = name, %error, "failed to parse rate limit header"),
            }
        }

        if let Some(pct) = highest {
            self.update_from_usage(key, pct);
        }
    }

    /// Delay before retry number `attempt`
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        self.backoff.calculate(attempt)
    }

    fn refill(&self, bucket: &mut RateLimitBucket, now: u64) {
        let elapsed = now.saturating_sub(bucket.last_refill);
        let window_ms = self.config.window_ms();
        let capacity = f64::from(self.config.capacity);
        let tokens_to_add = (elapsed as f64 * capacity / window_ms as f64).floor();

        if tokens_to_add > 0.0 {
            bucket.tokens = (bucket.tokens + tokens_to_add).min(capacity);
            bucket.last_refill = now;
        }
    }

    fn prune(&self, bucket: &mut RateLimitBucket, now: u64) {
        let window_start = now.saturating_sub(self.config.window_ms());
        while bucket.request_timestamps.front().is_some_and(|&ts| ts <= window_start) {
            bucket.request_timestamps.pop_front();
        }
    }

    fn time_to_wait(&self, weight: u32) -> Duration {
        let window_ms = u128::from(self.config.window_ms());
        let capacity = u128::from(self.config.capacity);
        let millis = (u128::from(weight) * window_ms).div_ceil(capacity);
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }
}

/// Extract the `call_count` percentage from either the flat app-usage shape
/// or the per-business `{id: [{call_count, ..}]}` shape.
fn call_count(usage: &Value) -> Option<f64> {
    if let Some(pct) = usage.get("call_count").and_then(Value::as_f64) {
        return Some(pct);
    }

    usage
        .as_object()?
        .values()
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(|entry| entry.get("call_count").and_then(Value::as_f64))
        .reduce(f64::max)
}
