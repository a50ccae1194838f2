//! Graph API client with rate limiting and circuit breaking
//!
//! Every call follows the same pipeline:
//! 1. Local validation (nothing is charged for a malformed request)
//! 2. Token resolution: explicit token, else the cached default session
//! 3. Rate limiter check, keyed by a hash of the token
//! 4. HTTP exchange inside the circuit breaker, bounded by a timeout
//! 5. Usage headers fed back to the limiter; provider errors mapped
//!
//! Pagination and batch requests reuse the same pipeline.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream, TryStreamExt};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use url::Url;
use warroom_common::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, Clock, RateLimiter,
    RateLimiterConfig, ResilienceError, SystemClock, UsageStats,
};
use warroom_domain::{
    param_to_query_value, BatchRequest, BatchResponse, GraphConfig, GraphError, HttpMethod, Page,
    RequestOptions, Result, DEFAULT_SESSION, MAX_BATCH_SIZE,
};

use super::errors::{error_envelope, map_error_response, map_provider_error};
use crate::auth::TokenManager;
use crate::http::client::duration_millis;
use crate::http::HttpClient;

/// Snapshot of the client's resilience state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    /// Whether the default session has a cached token
    pub authenticated: bool,
    /// Limiter usage for the default session's token
    pub rate_limit: Option<UsageStats>,
    pub circuit_breaker: CircuitBreakerMetrics,
}

/// Body attached to an outgoing call
#[derive(Debug)]
enum Payload {
    Empty,
    Json(Value),
    Form(Vec<(&'static str, String)>),
}

/// Fully resolved HTTP call, ready to run inside the breaker
#[derive(Debug)]
struct PreparedCall {
    method: HttpMethod,
    url: Url,
    payload: Payload,
    timeout: Duration,
}

/// Where the next page comes from
enum PageCursor {
    Start { endpoint: String, options: RequestOptions },
    Next { url: String, token: Option<String>, timeout: Option<Duration> },
    Done,
}

/// Graph API client
///
/// The limiter, breaker and token manager are shared handles: clones of the
/// client, and any other holder of the same `Arc`s, see the same state.
pub struct GraphClient<C: Clock = SystemClock> {
    http: HttpClient,
    graph: GraphConfig,
    tokens: Arc<TokenManager>,
    limiter: Arc<RateLimiter<C>>,
    breaker: Arc<CircuitBreaker<C>>,
    timeout: Duration,
}

impl<C: Clock> Clone for GraphClient<C> {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            graph: self.graph.clone(),
            tokens: Arc::clone(&self.tokens),
            limiter: Arc::clone(&self.limiter),
            breaker: Arc::clone(&self.breaker),
            timeout: self.timeout,
        }
    }
}

impl<C: Clock> std::fmt::Debug for GraphClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("base_url", &self.graph.versioned_base())
            .field("timeout", &self.timeout)
            .field("circuit_state", &self.breaker.state())
            .finish_non_exhaustive()
    }
}

impl GraphClient<SystemClock> {
    /// Create a builder for fluent configuration
    pub fn builder() -> GraphClientBuilder<SystemClock> {
        GraphClientBuilder::new()
    }
}

impl<C: Clock> GraphClient<C> {
    pub fn token_manager(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter<C>> {
        &self.limiter
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker<C>> {
        &self.breaker
    }

    pub fn graph_config(&self) -> &GraphConfig {
        &self.graph
    }

    /// Execute a single Graph request
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Path relative to the versioned API root, e.g.
    ///   `act_123/campaigns`
    /// * `options` - Method, query params, body, token and timeout
    ///
    /// # Errors
    ///
    /// Returns `Validation` before anything is charged when the request is
    /// malformed, `Authentication` when no token is available, `RateLimit`
    /// when the local quota is spent, `CircuitOpen` while the breaker sheds
    /// load, or the mapped provider/transport error.
    #[instrument(skip(self, options), fields(method = %options.method, endpoint = %endpoint))]
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T> {
        let url = self.endpoint_url(endpoint, &options.params)?;
        if options.method == HttpMethod::Get && options.body.is_some() {
            return Err(GraphError::Validation("GET requests cannot carry a body".into()));
        }

        let token = self.resolve_token(options.token.as_deref())?;
        let key = limiter_key(&token);
        self.acquire(&key, 1)?;

        let call = PreparedCall {
            method: options.method,
            url: with_access_token(url, &token),
            payload: options.body.map_or(Payload::Empty, Payload::Json),
            timeout: options.timeout.unwrap_or(self.timeout),
        };

        let body = self.dispatch(call, &key).await?;
        decode(&body)
    }

    /// Lazily walk a paginated list endpoint
    ///
    /// The first page goes through [`GraphClient::request`]; later pages follow
    /// the opaque `paging.next` URL through the same limiter and breaker. The
    /// stream ends after the last page or after yielding the first error.
    pub fn paginate<'a, T: DeserializeOwned + 'a>(
        &'a self,
        endpoint: &str,
        options: RequestOptions,
    ) -> impl Stream<Item = Result<Page<T>>> + 'a {
        let start = PageCursor::Start { endpoint: endpoint.to_string(), options };

        stream::unfold(start, move |cursor| async move {
            let (result, token, timeout) = match cursor {
                PageCursor::Done => return None,
                PageCursor::Start { endpoint, options } => {
                    let token = options.token.clone();
                    let timeout = options.timeout;
                    (self.request::<Page<T>>(&endpoint, options).await, token, timeout)
                }
                PageCursor::Next { url, token, timeout } => {
                    (self.follow::<Page<T>>(&url, token.as_deref(), timeout).await, token, timeout)
                }
            };

            let next = match &result {
                Ok(page) => page.next_page().map_or(PageCursor::Done, |url| PageCursor::Next {
                    url: url.to_string(),
                    token,
                    timeout,
                }),
                Err(err) => {
                    warn!(error = %err, "pagination stopped");
                    PageCursor::Done
                }
            };

            Some((result, next))
        })
    }

    /// Collect every item of a paginated endpoint
    ///
    /// Fails with the first page error; items from earlier pages are dropped.
    pub async fn paginate_all<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Vec<T>> {
        self.paginate::<T>(endpoint, options)
            .try_fold(Vec::new(), |mut items, page| async move {
                items.extend(page.data);
                Ok::<_, GraphError>(items)
            })
            .await
    }

    /// Send up to 50 requests in one round trip
    ///
    /// Charged once against the limiter with a weight equal to the number of
    /// sub-requests. Slots the provider could not answer come back as `None`.
    /// `timeout` overrides the client default for this call.
    #[instrument(skip(self, requests, token), fields(size = requests.len()))]
    pub async fn batch_request(
        &self,
        requests: &[BatchRequest],
        token: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Vec<Option<BatchResponse>>> {
        if requests.is_empty() {
            return Err(GraphError::Validation("Batch must contain at least one request".into()));
        }
        if requests.len() > MAX_BATCH_SIZE {
            return Err(GraphError::Validation(format!(
                "Batch of {} requests exceeds the limit of {MAX_BATCH_SIZE}",
                requests.len()
            )));
        }
        if let Some(request) = requests.iter().find(|r| r.relative_url.trim().is_empty()) {
            return Err(GraphError::Validation(format!(
                "Batch {} request has an empty relative_url",
                request.method
            )));
        }

        let batch = serde_json::to_string(requests)
            .map_err(|err| GraphError::Validation(format!("Failed to encode batch: {err}")))?;
        let weight = u32::try_from(requests.len())
            .map_err(|_| GraphError::Validation("Batch too large".into()))?;
        let url = Url::parse(&format!("{}/", self.graph.versioned_base()))
            .map_err(|err| GraphError::Config(format!("Invalid Graph base URL: {err}")))?;

        let token = self.resolve_token(token)?;
        let key = limiter_key(&token);
        self.acquire(&key, weight)?;

        let call = PreparedCall {
            method: HttpMethod::Post,
            url,
            payload: Payload::Form(vec![("access_token", token), ("batch", batch)]),
            timeout: timeout.unwrap_or(self.timeout),
        };

        let body = self.dispatch(call, &key).await?;
        decode(&body)
    }

    /// Report authentication, quota and breaker state
    pub fn health_status(&self) -> HealthStatus {
        let token = self.tokens.cached_token(DEFAULT_SESSION);
        HealthStatus {
            authenticated: token.is_some(),
            rate_limit: token.map(|t| self.limiter.usage_stats(&limiter_key(&t.access_token))),
            circuit_breaker: self.breaker.metrics(),
        }
    }

    /// Fetch an absolute URL handed out by the provider, e.g. `paging.next`
    ///
    /// Only URLs on the configured Graph host are followed; the access token
    /// is never sent anywhere else.
    async fn follow<T: DeserializeOwned>(
        &self,
        next: &str,
        token: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<T> {
        let url = Url::parse(next)
            .map_err(|err| GraphError::Parse(format!("Invalid paging URL: {err}")))?;
        if !self.is_graph_origin(&url) {
            return Err(GraphError::Validation(format!(
                "Paging URL host {} is not the configured Graph host",
                url.host_str().unwrap_or("<none>")
            )));
        }

        let token = self.resolve_token(token)?;
        let key = limiter_key(&token);
        self.acquire(&key, 1)?;

        let call = PreparedCall {
            method: HttpMethod::Get,
            url: with_access_token(url, &token),
            payload: Payload::Empty,
            timeout: timeout.unwrap_or(self.timeout),
        };

        let body = self.dispatch(call, &key).await?;
        decode(&body)
    }

    /// Run the HTTP exchange inside the breaker and return the raw body
    ///
    /// Every error raised in here counts as a breaker failure.
    async fn dispatch(&self, call: PreparedCall, key: &str) -> Result<String> {
        let path = call.url.path().to_string();

        let outcome = self
            .breaker
            .execute(|| async {
                let timeout = call.timeout;
                let exchange = async {
                    let response = self.http.send(self.build_request(call)).await?;
                    self.limiter.update_from_headers(response.headers(), key);

                    let status = response.status();
                    let body = response.text().await.map_err(|err| {
                        GraphError::Network(format!("Failed to read response body: {err}"))
                    })?;
                    Ok::<_, GraphError>((status, body))
                };

                let (status, body) = tokio::time::timeout(timeout, exchange)
                    .await
                    .map_err(|_| GraphError::Timeout { timeout_ms: duration_millis(timeout) })??;

                check_status(status, body)
            })
            .await;

        match outcome {
            Ok(body) => {
                self.limiter.track_usage(key);
                debug!(%path, "Graph request succeeded");
                Ok(body)
            }
            Err(ResilienceError::CircuitOpen { next_retry_at_ms }) => {
                warn!(%path, next_retry_at_ms, "circuit open, request rejected");
                Err(GraphError::CircuitOpen { next_retry_at_ms })
            }
            Err(ResilienceError::OperationFailed { source }) => {
                let category = source.category();
                warn!(%path, error = %source, ?category, "Graph request failed");
                Err(source)
            }
        }
    }

    fn build_request(&self, call: PreparedCall) -> reqwest::RequestBuilder {
        let method = match call.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Delete => Method::DELETE,
        };

        let builder = self.http.request(method, call.url).timeout(call.timeout);
        match call.payload {
            Payload::Empty => builder,
            Payload::Json(body) => builder.json(&body),
            Payload::Form(fields) => builder.form(&fields),
        }
    }

    fn endpoint_url(&self, endpoint: &str, params: &[(String, Value)]) -> Result<Url> {
        let endpoint = endpoint.trim().trim_start_matches('/');
        if endpoint.is_empty() {
            return Err(GraphError::Validation("Endpoint must not be empty".into()));
        }
        if let Some((key, _)) = params.iter().find(|(key, _)| key.trim().is_empty()) {
            return Err(GraphError::Validation(format!("Invalid query parameter name '{key}'")));
        }
        if params.iter().any(|(key, _)| key == "access_token") {
            return Err(GraphError::Validation(
                "Pass the access token through RequestOptions::token".into(),
            ));
        }

        let mut url =
            Url::parse(&format!("{}/{endpoint}", self.graph.versioned_base())).map_err(|err| {
                GraphError::Validation(format!("Invalid endpoint '{endpoint}': {err}"))
            })?;

        let pairs: Vec<(&str, String)> = params
            .iter()
            .filter_map(|(key, value)| param_to_query_value(value).map(|v| (key.as_str(), v)))
            .collect();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }

        Ok(url)
    }

    fn is_graph_origin(&self, url: &Url) -> bool {
        Url::parse(&self.graph.graph_host).is_ok_and(|host| host.origin() == url.origin())
    }

    fn resolve_token(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(token) = explicit.filter(|t| !t.trim().is_empty()) {
            return Ok(token.to_string());
        }

        self.tokens
            .cached_token(DEFAULT_SESSION)
            .map(|token| token.access_token)
            .ok_or_else(|| GraphError::Authentication("No access token available".into()))
    }

    fn acquire(&self, key: &str, weight: u32) -> Result<()> {
        self.limiter.check_limit(key, weight).map_err(|denied| {
            debug!(key, weight, retry_after_ms = ?denied.retry_after, "rate limit denied");
            GraphError::RateLimit {
                message: format!("Local rate limit reached, retry in {:?}", denied.retry_after),
                retry_after_ms: Some(duration_millis(denied.retry_after)),
            }
        })
    }
}

/// Limiter key for a token: raw tokens never become map keys or log fields
pub fn limiter_key(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let hash = hex::encode(digest);
    format!("token:{}", &hash[..16])
}

fn with_access_token(mut url: Url, token: &str) -> Url {
    if !url.query_pairs().any(|(key, _)| key == "access_token") {
        url.query_pairs_mut().append_pair("access_token", token);
    }
    url
}

fn check_status(status: StatusCode, body: String) -> Result<String> {
    if !status.is_success() {
        return Err(map_error_response(status, &body));
    }
    // The provider occasionally reports failures inside a 200.
    if let Some(envelope) = error_envelope(&body) {
        return Err(map_provider_error(&envelope.error, status));
    }
    Ok(body)
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    let parsed = if body.trim().is_empty() {
        serde_json::from_value(Value::Null)
    } else {
        serde_json::from_str(body)
    };
    parsed.map_err(|err| GraphError::Parse(err.to_string()))
}

/// Builder for [`GraphClient`]
pub struct GraphClientBuilder<C: Clock = SystemClock> {
    clock: C,
    http: Option<HttpClient>,
    graph: GraphConfig,
    tokens: Option<Arc<TokenManager>>,
    limiter: Option<Arc<RateLimiter<C>>>,
    breaker: Option<Arc<CircuitBreaker<C>>>,
    timeout: Option<Duration>,
}

impl Default for GraphClientBuilder<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphClientBuilder<SystemClock> {
    pub fn new() -> Self {
        Self {
            clock: SystemClock,
            http: None,
            graph: GraphConfig::default(),
            tokens: None,
            limiter: None,
            breaker: None,
            timeout: None,
        }
    }
}

impl<C: Clock + Clone> GraphClientBuilder<C> {
    /// Drive default-built limiter and breaker from `clock`
    ///
    /// Discards any limiter or breaker set earlier.
    pub fn clock<C2: Clock + Clone>(self, clock: C2) -> GraphClientBuilder<C2> {
        GraphClientBuilder {
            clock,
            http: self.http,
            graph: self.graph,
            tokens: self.tokens,
            limiter: None,
            breaker: None,
            timeout: self.timeout,
        }
    }

    pub fn http_client(mut self, http: HttpClient) -> Self {
        self.http = Some(http);
        self
    }

    pub fn graph_config(mut self, graph: GraphConfig) -> Self {
        self.graph = graph;
        self
    }

    /// Set the token manager (required)
    pub fn token_manager(mut self, tokens: Arc<TokenManager>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter<C>>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker<C>>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Default per-call timeout; falls back to the HTTP client's timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// Returns `Config` if the token manager is missing or a default
    /// component cannot be created.
    pub fn build(self) -> Result<GraphClient<C>> {
        let tokens = self
            .tokens
            .ok_or_else(|| GraphError::Config("Token manager not set".to_string()))?;

        let http = match self.http {
            Some(http) => http,
            None => HttpClient::new()?,
        };

        let limiter = match self.limiter {
            Some(limiter) => limiter,
            None => Arc::new(
                RateLimiter::with_clock(RateLimiterConfig::default(), self.clock.clone())
                    .map_err(|e| GraphError::Config(e.to_string()))?,
            ),
        };

        let breaker = match self.breaker {
            Some(breaker) => breaker,
            None => Arc::new(
                CircuitBreaker::with_clock(CircuitBreakerConfig::default(), self.clock.clone())
                    .map_err(|e| GraphError::Config(e.to_string()))?,
            ),
        };

        let timeout = self.timeout.unwrap_or_else(|| http.timeout());
        if timeout.is_zero() {
            return Err(GraphError::Config("Request timeout must be positive".into()));
        }

        Ok(GraphClient { http, graph: self.graph, tokens, limiter, breaker, timeout })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use warroom_domain::{AccessToken, OAuthConfig};

    use super::*;

    fn client() -> GraphClient {
        let tokens = Arc::new(TokenManager::new(
            OAuthConfig::default(),
            GraphConfig::default(),
            HttpClient::new().expect("http client"),
        ));
        GraphClient::builder().token_manager(tokens).build().expect("graph client")
    }

    #[test]
    fn test_limiter_key_hides_token() {
        let key = limiter_key("EAAB-secret-token");
        assert!(key.starts_with("token:"));
        assert_eq!(key.len(), "token:".len() + 16);
        assert!(!key.contains("secret"));
        assert_eq!(key, limiter_key("EAAB-secret-token"));
        assert_ne!(key, limiter_key("EAAB-other-token"));
    }

    /// Validates URL construction.
    ///
    /// Assertions:
    /// - Confirms the endpoint is joined to the versioned base.
    /// - Confirms null params are dropped and structured params are JSON.
    /// - Confirms the access token is appended exactly once.
    #[test]
    fn test_endpoint_url() {
        let client = client();
        let params = vec![
            ("fields".to_string(), json!("id,name")),
            ("limit".to_string(), json!(25)),
            ("after".to_string(), Value::Null),
            ("filtering".to_string(), json!([{"field": "effective_status"}])),
        ];

        let url = client.endpoint_url("/act_123/campaigns", &params).expect("url");
        assert_eq!(url.path(), "/v21.0/act_123/campaigns");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(query.len(), 3);
        assert_eq!(query[0], ("fields".to_string(), "id,name".to_string()));
        assert_eq!(query[1], ("limit".to_string(), "25".to_string()));
        assert_eq!(query[2].1, r#"[{"field":"effective_status"}]"#);

        let url = with_access_token(with_access_token(url, "EAAB"), "EAAB");
        assert_eq!(url.query_pairs().filter(|(k, _)| k == "access_token").count(), 1);
    }

    #[test]
    fn test_endpoint_validation() {
        let client = client();
        assert!(matches!(client.endpoint_url("  ", &[]), Err(GraphError::Validation(_))));
        assert!(matches!(
            client.endpoint_url("me", &[(String::new(), json!(1))]),
            Err(GraphError::Validation(_))
        ));
        assert!(matches!(
            client.endpoint_url("me", &[("access_token".to_string(), json!("x"))]),
            Err(GraphError::Validation(_))
        ));
    }

    /// Validates token resolution order.
    ///
    /// Assertions:
    /// - Confirms a missing token is an `Authentication` error.
    /// - Confirms the cached default session is used when nothing is passed.
    /// - Confirms an explicit token wins over the cached one.
    #[test]
    fn test_resolve_token() {
        let client = client();
        assert!(matches!(client.resolve_token(None), Err(GraphError::Authentication(_))));

        client.token_manager().cache_token(DEFAULT_SESSION, AccessToken::bearer("cached"));
        assert_eq!(client.resolve_token(None).expect("cached"), "cached");
        assert_eq!(client.resolve_token(Some("explicit")).expect("explicit"), "explicit");
        assert_eq!(client.resolve_token(Some(" ")).expect("blank falls back"), "cached");
    }

    /// Validates which paging URLs may receive the access token.
    ///
    /// Assertions:
    /// - Confirms the configured Graph host is accepted.
    /// - Ensures another host, scheme or port is refused.
    #[test]
    fn test_is_graph_origin() {
        let client = client();
        let accepted = Url::parse("https://graph.facebook.com/v21.0/act_1/campaigns?after=c1")
            .expect("url");
        assert!(client.is_graph_origin(&accepted));

        for foreign in [
            "https://attacker.example/v21.0/act_1/campaigns?after=c1",
            "http://graph.facebook.com/v21.0/act_1/campaigns",
            "https://graph.facebook.com:8443/v21.0/act_1/campaigns",
        ] {
            let url = Url::parse(foreign).expect("url");
            assert!(!client.is_graph_origin(&url), "{foreign}");
        }
    }

    #[test]
    fn test_check_status_detects_error_in_success_body() {
        let body = r#"{"error":{"message":"Invalid OAuth access token.","code":190}}"#;
        assert!(matches!(
            check_status(StatusCode::OK, body.to_string()),
            Err(GraphError::Authentication(_))
        ));
        assert!(check_status(StatusCode::OK, r#"{"data":[]}"#.to_string()).is_ok());
    }

    #[test]
    fn test_decode_empty_body() {
        let unit: Option<Value> = decode("").expect("empty body decodes to null");
        assert!(unit.is_none());
        assert!(matches!(decode::<Vec<u32>>("{}"), Err(GraphError::Parse(_))));
    }

    #[test]
    fn test_health_status_without_session() {
        let health = client().health_status();
        assert!(!health.authenticated);
        assert!(health.rate_limit.is_none());
        assert_eq!(health.circuit_breaker.success_rate, 100);
    }
}
