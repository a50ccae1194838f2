//! Configuration management

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_API_VERSION, DEFAULT_DIALOG_HOST, DEFAULT_GRAPH_HOST, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_RATE_LIMIT_CAPACITY, DEFAULT_RATE_LIMIT_WINDOW_MS, DEFAULT_SCOPES,
};
use crate::errors::{GraphError, Result};

/// Gateway configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub token_refresh: TokenRefreshSettings,
}

impl Config {
    /// Reject configurations the gateway cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.oauth.app_id.trim().is_empty() {
            return Err(GraphError::Config("oauth.app_id must not be empty".into()));
        }
        if self.oauth.app_secret.trim().is_empty() {
            return Err(GraphError::Config("oauth.app_secret must not be empty".into()));
        }
        if self.graph.api_version.trim().is_empty() {
            return Err(GraphError::Config("graph.api_version must not be empty".into()));
        }
        if self.rate_limit.capacity == 0 || self.rate_limit.window_ms == 0 {
            return Err(GraphError::Config(
                "rate_limit.capacity and rate_limit.window_ms must be positive".into(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0
            || self.circuit_breaker.half_open_requests == 0
        {
            return Err(GraphError::Config(
                "circuit_breaker thresholds must be positive".into(),
            ));
        }
        if self.http.timeout_secs == 0 {
            return Err(GraphError::Config("http.timeout_secs must be positive".into()));
        }
        let refresh = &self.token_refresh;
        if refresh.retry_interval_secs == 0 || refresh.idle_interval_secs == 0 {
            return Err(GraphError::Config(
                "token_refresh.retry_interval_secs and token_refresh.idle_interval_secs must be \
                 positive"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// App credentials registered with the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub app_id: String,
    #[serde(skip_serializing)]
    pub app_secret: String,
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: String::new(),
            redirect_uri: String::new(),
            scopes: default_scopes(),
        }
    }
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect()
}

/// Provider endpoints and API version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Version without the leading `v`, e.g. `21.0`
    pub api_version: String,
    pub graph_host: String,
    pub dialog_host: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            graph_host: DEFAULT_GRAPH_HOST.to_string(),
            dialog_host: DEFAULT_DIALOG_HOST.to_string(),
        }
    }
}

impl GraphConfig {
    /// Versioned API root, e.g. `https://graph.facebook.com/v21.0`
    pub fn versioned_base(&self) -> String {
        format!("{}/v{}", self.graph_host.trim_end_matches('/'), self.api_version)
    }
}

/// Token bucket sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub capacity: u32,
    pub window_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self { capacity: DEFAULT_RATE_LIMIT_CAPACITY, window_ms: DEFAULT_RATE_LIMIT_WINDOW_MS }
    }
}

/// Circuit breaker tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub half_open_requests: u32,
    pub monitoring_period_ms: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            half_open_requests: 3,
            monitoring_period_ms: 300_000,
        }
    }
}

/// Outbound HTTP settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            user_agent: concat!("warroom-gateway/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Background token refresh schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenRefreshSettings {
    pub enabled: bool,
    /// Refresh this long before the cached token expires
    pub refresh_threshold_secs: u64,
    /// Wait after a failed refresh before trying again
    pub retry_interval_secs: u64,
    /// Poll interval while no token is cached
    pub idle_interval_secs: u64,
}

impl Default for TokenRefreshSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_threshold_secs: 24 * 3600,
            retry_interval_secs: 300,
            idle_interval_secs: 60,
        }
    }
}
