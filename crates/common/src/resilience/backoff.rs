//! Exponential backoff with additive jitter.
//!
//! `delay(attempt) = min(base * 2^attempt + jitter, max)` where `jitter` is
//! drawn uniformly from `[0, max_jitter)`. Nothing here sleeps; callers decide
//! whether and how to wait.

use std::time::Duration;

use rand::Rng;

use super::circuit_breaker::{ConfigError, ConfigResult};

/// Parameters for [`Backoff`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl BackoffConfig {
    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.base_delay.is_zero() {
            return Err(ConfigError::invalid("base_delay must be greater than zero"));
        }
        if self.max_delay < self.base_delay {
            return Err(ConfigError::invalid("max_delay must not be below base_delay"));
        }
        Ok(())
    }
}

/// Exponential backoff calculator
#[derive(Debug, Clone, Copy, Default)]
pub struct Backoff {
    config: BackoffConfig,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Delay before retry number `attempt` (zero-based)
    pub fn calculate(&self, attempt: u32) -> Duration {
        let jitter_ms = millis(self.config.max_jitter);
        let jitter = if jitter_ms == 0 { 0 } else { rand::thread_rng().gen_range(0..jitter_ms) };
        self.calculate_with_jitter(attempt, Duration::from_millis(jitter))
    }

    /// Deterministic form of [`Backoff::calculate`] with a caller-supplied
    /// jitter.
    pub fn calculate_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        let exponential = millis(self.config.base_delay)
            .saturating_mul(2u64.checked_pow(attempt).unwrap_or(u64::MAX));
        let delay = exponential.saturating_add(millis(jitter)).min(millis(self.config.max_delay));
        Duration::from_millis(delay)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
