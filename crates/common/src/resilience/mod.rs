//! Resilience primitives for outbound calls
//!
//! - **Circuit Breaker**: stops calling a failing dependency for a cooldown,
//!   then trials recovery with a limited number of calls
//! - **Rate Limiter**: keyed token buckets with a sliding request window and
//!   provider-usage feedback
//! - **Backoff**: capped exponential delays with jitter
//!
//! Everything here is generic over the guarded operation and the [`Clock`],
//! so tests run against a [`MockClock`] instead of sleeping.

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod rate_limiter;

pub use backoff::{Backoff, BackoffConfig};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerMetrics,
    CircuitObserver, CircuitSnapshot, CircuitState, ConfigError, ConfigResult, ResilienceError,
    ResilienceResult,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use rate_limiter::{
    RateLimitExceeded, RateLimiter, RateLimiterConfig, RateLimiterConfigBuilder, UsageStats,
    USAGE_HEADERS,
};
