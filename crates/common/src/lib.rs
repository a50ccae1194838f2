//! Shared building blocks for the War Room gateway crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: serialization, error and randomness dependencies the
//!   runtime tier builds on
//! - `runtime`: resilience primitives (circuit breaker, rate limiter, backoff)
//! - `observability`: tracing output from the runtime tier

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

#[cfg(feature = "runtime")]
pub use resilience::{
    Backoff, BackoffConfig, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics,
    CircuitObserver, CircuitState, Clock, ConfigError, MockClock, RateLimitExceeded, RateLimiter,
    RateLimiterConfig, ResilienceError, ResilienceResult, SystemClock, UsageStats,
};
