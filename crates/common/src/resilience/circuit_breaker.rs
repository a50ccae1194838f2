//! Three-state circuit breaker guarding calls to a flaky dependency.
//!
//! The breaker counts failures inside a rolling monitoring window while
//! `Closed`, rejects calls outright while `Open`, and lets trial calls through
//! while `HalfOpen` until enough of them succeed. All transitions happen under
//! a single mutex that is never held across an `.await`; observers are
//! notified after the lock is released.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::clock::{Clock, SystemClock};

//==============================================================================
// Error Types
//==============================================================================

/// Configuration validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

/// Errors produced by a guarded operation
///
/// Generic over the operation's own error type so that the caller always gets
/// the original failure back, untouched.
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Circuit breaker is open, rejecting calls until `next_retry_at_ms`
    #[error("Circuit breaker is open until {next_retry_at_ms}ms since epoch")]
    CircuitOpen { next_retry_at_ms: u64 },

    /// The underlying operation failed
    #[error("Operation failed: {source}")]
    OperationFailed {
        #[source]
        source: E,
    },
}

/// Result type for resilience operations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

//==============================================================================
// State & Configuration
//==============================================================================

/// Circuit breaker states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    #[default]
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, allowing trial requests to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Failures inside the monitoring window before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call is allowed
    pub reset_timeout: Duration,
    /// Successful trial calls needed to close the circuit again
    pub half_open_requests: u32,
    /// Rolling window over which failures are counted
    pub monitoring_period: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_requests: 3,
            monitoring_period: Duration::from_secs(300),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold must be greater than 0"));
        }
        if self.half_open_requests == 0 {
            return Err(ConfigError::invalid("half_open_requests must be greater than 0"));
        }
        if self.reset_timeout.is_zero() {
            return Err(ConfigError::invalid("reset_timeout must be greater than zero"));
        }
        if self.monitoring_period.is_zero() {
            return Err(ConfigError::invalid("monitoring_period must be greater than zero"));
        }
        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    pub fn half_open_requests(mut self, requests: u32) -> Self {
        self.config.half_open_requests = requests;
        self
    }

    pub fn monitoring_period(mut self, period: Duration) -> Self {
        self.config.monitoring_period = period;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//==============================================================================
// Observers
//==============================================================================

/// Receives state transitions from a [`CircuitBreaker`]
///
/// Called synchronously on the thread that caused the transition. Must not
/// block.
pub trait CircuitObserver: Send + Sync {
    fn on_transition(&self, from: CircuitState, to: CircuitState);
}

struct TransitionCallback {
    target: CircuitState,
    callback: Box<dyn Fn() + Send + Sync>,
}

impl CircuitObserver for TransitionCallback {
    fn on_transition(&self, _from: CircuitState, to: CircuitState) {
        if to == self.target {
            (self.callback)();
        }
    }
}

//==============================================================================
// Snapshots
//==============================================================================

/// Point-in-time view of the breaker's state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    /// Failures currently counted inside the monitoring window
    pub failures: u32,
    pub last_failure_at_ms: Option<u64>,
    pub next_retry_at_ms: Option<u64>,
    pub half_open_successes: u32,
}

/// Circuit breaker metrics for monitoring
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub failures: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub rejected_calls: u64,
    /// Rounded percentage of successful calls; 100 when nothing ran yet
    pub success_rate: u32,
    pub last_failure_at_ms: Option<u64>,
    pub next_retry_at_ms: Option<u64>,
}

#[derive(Debug, Default)]
struct BreakerInner {
    state: CircuitState,
    failure_timestamps: VecDeque<u64>,
    failures: u32,
    last_failure_at: Option<u64>,
    next_retry_at: Option<u64>,
    half_open_successes: u32,
    total_successes: u64,
    total_failures: u64,
    rejected_calls: u64,
}

type Transition = (CircuitState, CircuitState);

//==============================================================================
// Circuit Breaker
//==============================================================================

/// Generic circuit breaker
///
/// Cloning is cheap and yields a handle onto the same state machine.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<BreakerInner>>,
    observers: Arc<RwLock<Vec<Arc<dyn CircuitObserver>>>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("observers", &self.observers.read().len())
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
            observers: Arc::clone(&self.observers),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a new circuit breaker backed by the system clock
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for CircuitBreaker<SystemClock> {
    fn default() -> Self {
        Self {
            config: CircuitBreakerConfig::default(),
            inner: Arc::new(Mutex::new(BreakerInner::default())),
            observers: Arc::new(RwLock::new(Vec::new())),
            clock: Arc::new(SystemClock),
        }
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a circuit breaker with a custom clock (useful for testing)
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;

        Ok(Self {
            config,
            inner: Arc::new(Mutex::new(BreakerInner::default())),
            observers: Arc::new(RwLock::new(Vec::new())),
            clock: Arc::new(clock),
        })
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Register an observer for every state transition
    pub fn add_observer(&self, observer: Arc<dyn CircuitObserver>) {
        self.observers.write().push(observer);
    }

    /// Run `callback` each time the circuit opens
    pub fn on_open(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.on_enter(CircuitState::Open, callback);
    }

    /// Run `callback` each time the circuit closes after recovery
    pub fn on_close(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.on_enter(CircuitState::Closed, callback);
    }

    /// Run `callback` each time the circuit starts trialing recovery
    pub fn on_half_open(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.on_enter(CircuitState::HalfOpen, callback);
    }

    fn on_enter(&self, target: CircuitState, callback: impl Fn() + Send + Sync + 'static) {
        self.add_observer(Arc::new(TransitionCallback { target, callback: Box::new(callback) }));
    }

    /// Execute an async operation with circuit breaker protection
    ///
    /// When the circuit is open and the cooldown has not elapsed the operation
    /// is not invoked. Otherwise its outcome is recorded and its error, if any,
    /// is handed back unchanged inside [`ResilienceError::OperationFailed`].
    #[instrument(skip(self, operation), fields(state = %self.state()))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.admit()?;

        match operation().await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(error) => {
                self.record_failure();
                debug!(error = %error, "guarded operation failed");
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    /// Synchronous counterpart of [`CircuitBreaker::execute`]
    pub fn call<F, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.admit()?;

        match operation() {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(error) => {
                self.record_failure();
                debug!(error = %error, "guarded operation failed");
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    /// Decide whether a call may proceed, moving Open to HalfOpen once the
    /// cooldown has elapsed.
    fn admit<E>(&self) -> ResilienceResult<(), E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let now = self.clock.millis_since_epoch();
        let transition = {
            let mut inner = self.inner.lock();
            if inner.state != CircuitState::Open {
                return Ok(());
            }
            let next_retry_at_ms = inner.next_retry_at.unwrap_or(now);
            if now < next_retry_at_ms {
                inner.rejected_calls += 1;
                debug!(next_retry_at_ms, "circuit open, rejecting call");
                return Err(ResilienceError::CircuitOpen { next_retry_at_ms });
            }
            Self::enter_half_open(&mut inner)
        };
        self.notify(transition);
        Ok(())
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            inner.total_successes += 1;
            match inner.state {
                CircuitState::HalfOpen => {
                    inner.half_open_successes += 1;
                    if inner.half_open_successes >= self.config.half_open_requests {
                        Some(Self::enter_closed(&mut inner))
                    } else {
                        None
                    }
                }
                CircuitState::Closed => {
                    inner.failures = 0;
                    inner.failure_timestamps.clear();
                    None
                }
                // Late completion of a call admitted before the circuit opened
                CircuitState::Open => None,
            }
        };
        if let Some(transition) = transition {
            self.notify(transition);
        }
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        let now = self.clock.millis_since_epoch();
        let transition = {
            let mut inner = self.inner.lock();
            inner.total_failures += 1;
            inner.last_failure_at = Some(now);

            // The failure window only counts while closed.
            match inner.state {
                CircuitState::HalfOpen => Some(self.enter_open(&mut inner, now)),
                CircuitState::Closed => {
                    inner.failure_timestamps.push_back(now);
                    let cutoff = now.saturating_sub(duration_millis(self.config.monitoring_period));
                    while inner.failure_timestamps.front().is_some_and(|&ts| ts <= cutoff) {
                        inner.failure_timestamps.pop_front();
                    }
                    inner.failures =
                        u32::try_from(inner.failure_timestamps.len()).unwrap_or(u32::MAX);
                    if inner.failures >= self.config.failure_threshold {
                        Some(self.enter_open(&mut inner, now))
                    } else {
                        None
                    }
                }
                CircuitState::Open => None,
            }
        };
        if let Some(transition) = transition {
            self.notify(transition);
        }
    }

    fn enter_open(&self, inner: &mut BreakerInner, now: u64) -> Transition {
        let from = inner.state;
        let next_retry_at = now.saturating_add(duration_millis(self.config.reset_timeout));
        inner.state = CircuitState::Open;
        inner.next_retry_at = Some(next_retry_at);
        inner.half_open_successes = 0;
        warn!(
            failures = inner.failures,
            next_retry_at_ms = next_retry_at,
            from = %from,
            "circuit breaker opened"
        );
        (from, CircuitState::Open)
    }

    fn enter_half_open(inner: &mut BreakerInner) -> Transition {
        let from = inner.state;
        inner.state = CircuitState::HalfOpen;
        inner.half_open_successes = 0;
        info!("circuit breaker half-open, trialing recovery");
        (from, CircuitState::HalfOpen)
    }

    fn enter_closed(inner: &mut BreakerInner) -> Transition {
        let from = inner.state;
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.failure_timestamps.clear();
        inner.next_retry_at = None;
        inner.half_open_successes = 0;
        info!("circuit breaker closed");
        (from, CircuitState::Closed)
    }

    fn notify(&self, (from, to): Transition) {
        let observers = self.observers.read().clone();
        for observer in observers {
            observer.on_transition(from, to);
        }
    }

    /// Get the current state of the circuit breaker
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Whether a call made right now would be let through
    pub fn is_call_permitted(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Open => {
                inner.next_retry_at.map_or(true, |at| self.clock.millis_since_epoch() >= at)
            }
            CircuitState::Closed | CircuitState::HalfOpen => true,
        }
    }

    /// Copy of the state machine's current values
    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        CircuitSnapshot {
            state: inner.state,
            failures: inner.failures,
            last_failure_at_ms: inner.last_failure_at,
            next_retry_at_ms: inner.next_retry_at,
            half_open_successes: inner.half_open_successes,
        }
    }

    /// Get circuit breaker metrics
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        let total = inner.total_successes + inner.total_failures;
        let success_rate = if total == 0 {
            100
        } else {
            u32::try_from((inner.total_successes * 100 + total / 2) / total).unwrap_or(100)
        };

        CircuitBreakerMetrics {
            state: inner.state,
            failures: inner.failures,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            rejected_calls: inner.rejected_calls,
            success_rate,
            last_failure_at_ms: inner.last_failure_at,
            next_retry_at_ms: inner.next_retry_at,
        }
    }

    /// Force the circuit back to a pristine closed state
    ///
    /// Observers are not notified.
    pub fn reset(&self) {
        *self.inner.lock() = BreakerInner::default();
        info!("circuit breaker manually reset to closed state");
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
