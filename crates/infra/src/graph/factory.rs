//! Wiring a [`GraphClient`] from a loaded [`Config`]

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use warroom_common::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitObserver, CircuitState, ConfigError, RateLimiter,
    RateLimiterConfig,
};
use warroom_domain::{Config, GraphError, Result};

use super::client::GraphClient;
use crate::auth::{TokenManager, TokenRefresher};
use crate::http::HttpClient;

/// Logs every breaker transition
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl CircuitObserver for LoggingObserver {
    fn on_transition(&self, from: CircuitState, to: CircuitState) {
        match to {
            CircuitState::Open => warn!(?from, "Graph circuit opened, shedding requests"),
            CircuitState::HalfOpen => info!(?from, "Graph circuit half-open, probing recovery"),
            CircuitState::Closed => info!(?from, "Graph circuit closed"),
        }
    }
}

/// Entry point for building the gateway's Graph components
pub struct GraphApi;

impl GraphApi {
    /// Build a client with every component sized from `config`
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Config` if the configuration fails validation or
    /// a component rejects its settings.
    pub fn from_config(config: &Config) -> Result<GraphClient> {
        config.validate()?;

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .user_agent(config.http.user_agent.clone())
            .build()?;

        let tokens = Arc::new(TokenManager::new(
            config.oauth.clone(),
            config.graph.clone(),
            http.clone(),
        ));

        let limiter_config = RateLimiterConfig::builder()
            .capacity(config.rate_limit.capacity)
            .window(Duration::from_millis(config.rate_limit.window_ms))
            .build()
            .map_err(config_error)?;

        let settings = config.circuit_breaker;
        let breaker_config = CircuitBreakerConfig::builder()
            .failure_threshold(settings.failure_threshold)
            .reset_timeout(Duration::from_millis(settings.reset_timeout_ms))
            .half_open_requests(settings.half_open_requests)
            .monitoring_period(Duration::from_millis(settings.monitoring_period_ms))
            .build()
            .map_err(config_error)?;

        let breaker = CircuitBreaker::new(breaker_config).map_err(config_error)?;
        breaker.add_observer(Arc::new(LoggingObserver));

        let client = GraphClient::builder()
            .http_client(http)
            .graph_config(config.graph.clone())
            .token_manager(tokens)
            .rate_limiter(Arc::new(RateLimiter::new(limiter_config).map_err(config_error)?))
            .circuit_breaker(Arc::new(breaker))
            .build()?;

        info!(
            api_version = %config.graph.api_version,
            capacity = config.rate_limit.capacity,
            window_ms = config.rate_limit.window_ms,
            "Graph client ready"
        );
        Ok(client)
    }

    /// Background refresher for `client`'s default session
    pub fn token_refresher(client: &GraphClient, config: &Config) -> TokenRefresher {
        TokenRefresher::new(Arc::clone(client.token_manager()), config.token_refresh)
    }
}

fn config_error(err: ConfigError) -> GraphError {
    GraphError::Config(err.to_string())
}
