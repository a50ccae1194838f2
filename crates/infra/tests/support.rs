//! Shared fixtures for the infra integration tests

use std::sync::Arc;
use std::time::Duration;

use warroom_common::resilience::{
    CircuitBreaker, CircuitBreakerConfig, RateLimiter, RateLimiterConfig,
};
use warroom_domain::{GraphConfig, OAuthConfig};
use warroom_infra::{GraphClient, HttpClient, TokenManager};
use wiremock::MockServer;

pub const APP_ID: &str = "1234";
pub const APP_SECRET: &str = "s3cret";
pub const REDIRECT_URI: &str = "https://warroom.example/auth/callback";
pub const TOKEN: &str = "EAAB-test-token";

pub fn oauth_config() -> OAuthConfig {
    OAuthConfig {
        app_id: APP_ID.into(),
        app_secret: APP_SECRET.into(),
        redirect_uri: REDIRECT_URI.into(),
        ..OAuthConfig::default()
    }
}

/// Graph endpoints pointed at the mock server
pub fn graph_config(server: &MockServer) -> GraphConfig {
    GraphConfig {
        api_version: "21.0".into(),
        graph_host: server.uri(),
        dialog_host: server.uri(),
    }
}

pub fn http_client() -> HttpClient {
    HttpClient::builder().timeout(Duration::from_secs(5)).build().expect("http client builds")
}

pub fn token_manager(server: &MockServer) -> Arc<TokenManager> {
    Arc::new(TokenManager::new(oauth_config(), graph_config(server), http_client()))
}

/// Client with default limiter and breaker
pub fn graph_client(server: &MockServer) -> GraphClient {
    GraphClient::builder()
        .http_client(http_client())
        .graph_config(graph_config(server))
        .token_manager(token_manager(server))
        .build()
        .expect("graph client builds")
}

/// Client with a custom limiter capacity and breaker threshold
pub fn tuned_client(server: &MockServer, capacity: u32, failure_threshold: u32) -> GraphClient {
    let limiter_config = RateLimiterConfig::builder()
        .capacity(capacity)
        .window(Duration::from_secs(3600))
        .build()
        .expect("limiter config");
    let breaker_config = CircuitBreakerConfig::builder()
        .failure_threshold(failure_threshold)
        .reset_timeout(Duration::from_secs(60))
        .build()
        .expect("breaker config");

    GraphClient::builder()
        .http_client(http_client())
        .graph_config(graph_config(server))
        .token_manager(token_manager(server))
        .rate_limiter(Arc::new(RateLimiter::new(limiter_config).expect("limiter")))
        .circuit_breaker(Arc::new(CircuitBreaker::new(breaker_config).expect("breaker")))
        .build()
        .expect("graph client builds")
}
