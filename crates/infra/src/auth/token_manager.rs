//! OAuth token lifecycle against the Graph token endpoint
//!
//! Handles:
//! - Authorization dialog URL building with a CSRF `state`
//! - Authorization code exchange
//! - Token refresh and long-lived token exchange
//! - Token introspection (`/debug_token`) and granted permissions
//! - Per-session caching in a [`TokenStore`]
//!
//! None of the exchange calls refresh on their own; scheduling refresh is
//! the job of [`TokenRefresher`](super::refresh::TokenRefresher).

use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};
use warroom_domain::{
    AccessToken, DebugTokenData, ErrorEnvelope, GraphConfig, GraphError, GraphResponse,
    OAuthConfig, PermissionGrant, Result, TokenResponse, GRANT_TYPE_EXCHANGE,
};

use super::state::{generate_state, verify_state};
use super::token_store::TokenStore;
use crate::http::HttpClient;

/// Authorization dialog URL plus the `state` it carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    /// Persist this and compare it with the redirect's `state`
    pub state: String,
}

/// Token manager for one registered app
///
/// Cloning is cheap; clones share the same [`TokenStore`].
#[derive(Debug, Clone)]
pub struct TokenManager {
    http: HttpClient,
    oauth: OAuthConfig,
    graph: GraphConfig,
    store: Arc<TokenStore>,
}

impl TokenManager {
    /// Create a token manager with an empty token store
    pub fn new(oauth: OAuthConfig, graph: GraphConfig, http: HttpClient) -> Self {
        Self::with_store(oauth, graph, http, Arc::new(TokenStore::new()))
    }

    /// Create a token manager backed by an existing store
    pub fn with_store(
        oauth: OAuthConfig,
        graph: GraphConfig,
        http: HttpClient,
        store: Arc<TokenStore>,
    ) -> Self {
        Self { http, oauth, graph, store }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn oauth_config(&self) -> &OAuthConfig {
        &self.oauth
    }

    /// Build the authorization dialog URL
    ///
    /// Empty `scopes` falls back to the configured scopes.
    pub fn authorization_url(&self, scopes: &[String]) -> AuthorizationRequest {
        let state = generate_state();
        let scope = if scopes.is_empty() { self.oauth.scopes.join(",") } else { scopes.join(",") };

        let params = [
            ("client_id", self.oauth.app_id.as_str()),
            ("redirect_uri", self.oauth.redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("response_type", "code"),
            ("state", state.as_str()),
        ];

        let query_string = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let url = format!(
            "{}/v{}/dialog/oauth?{query_string}",
            self.graph.dialog_host.trim_end_matches('/'),
            self.graph.api_version
        );

        AuthorizationRequest { url, state }
    }

    /// Compare the `state` returned on the redirect with the one issued
    pub fn verify_state(expected: &str, received: &str) -> bool {
        verify_state(expected, received)
    }

    /// Exchange an authorization code for an access token
    ///
    /// # Errors
    /// Returns `GraphError::Authentication` if the token endpoint is
    /// unreachable, rejects the code, or answers with something other than a
    /// usable token.
    #[instrument(skip(self, code), fields(session = %session))]
    pub async fn exchange_code(&self, session: &str, code: &str) -> Result<AccessToken> {
        if code.trim().is_empty() {
            return Err(GraphError::Validation("Authorization code must not be empty".into()));
        }

        let params = [
            ("client_id", self.oauth.app_id.as_str()),
            ("client_secret", self.oauth.app_secret.as_str()),
            ("redirect_uri", self.oauth.redirect_uri.as_str()),
            ("code", code),
        ];
        let token = self.token_request(&params).await?;

        self.store.insert(session, token.clone());
        info!(expires_at = ?token.expires_at, "authorization code exchanged");
        Ok(token)
    }

    /// Exchange `refresh_token` for a fresh access token
    ///
    /// The previous refresh token is kept when the response omits one.
    #[instrument(skip(self, refresh_token), fields(session = %session))]
    pub async fn refresh_token(&self, session: &str, refresh_token: &str) -> Result<AccessToken> {
        if refresh_token.trim().is_empty() {
            return Err(GraphError::Authentication("No refresh token available".into()));
        }

        let mut token = self.fb_exchange(refresh_token).await?;
        if token.refresh_token.is_none() {
            token.refresh_token =
                self.store.get(session).and_then(|previous| previous.refresh_token);
        }

        self.store.insert(session, token.clone());
        info!(expires_at = ?token.expires_at, "access token refreshed");
        Ok(token)
    }

    /// Trade a short-lived token for a long-lived one
    #[instrument(skip(self, short_lived_token), fields(session = %session))]
    pub async fn exchange_long_lived(
        &self,
        session: &str,
        short_lived_token: &str,
    ) -> Result<AccessToken> {
        if short_lived_token.trim().is_empty() {
            return Err(GraphError::Validation("Token to exchange must not be empty".into()));
        }

        let token = self.fb_exchange(short_lived_token).await?;

        self.store.insert(session, token.clone());
        info!(expires_at = ?token.expires_at, "long-lived token issued");
        Ok(token)
    }

    /// Check a token against `/debug_token`
    ///
    /// Valid means the provider reports it valid, it was issued to this app,
    /// and it has not expired. Any failure along the way reads as invalid.
    pub async fn validate_token(&self, token: &str) -> bool {
        let url = format!("{}/debug_token", self.graph.graph_host.trim_end_matches('/'));
        let app_token = self.app_access_token();
        let params = [("input_token", token), ("access_token", app_token.as_str())];

        match self.get_json::<GraphResponse<DebugTokenData>>(&url, &params).await {
            Ok(response) => {
                let usable = response.data.is_usable_for(&self.oauth.app_id, Utc::now());
                debug!(is_valid = response.data.is_valid, usable, "token introspected");
                usable
            }
            Err(err) => {
                warn!(error = %err, "token validation failed");
                false
            }
        }
    }

    /// Permissions the user granted to `token`
    ///
    /// Degrades to an empty list when the lookup fails.
    pub async fn token_permissions(&self, token: &str) -> Vec<String> {
        let url = format!("{}/me/permissions", self.graph.versioned_base());

        match self
            .get_json::<GraphResponse<Vec<PermissionGrant>>>(&url, &[("access_token", token)])
            .await
        {
            Ok(response) => response
                .data
                .into_iter()
                .filter(PermissionGrant::is_granted)
                .map(|grant| grant.permission)
                .collect(),
            Err(err) => {
                warn!(error = %err, "failed to list token permissions");
                Vec::new()
            }
        }
    }

    /// App token for server-to-server calls
    pub fn app_access_token(&self) -> String {
        format!("{}|{}", self.oauth.app_id, self.oauth.app_secret)
    }

    pub fn cached_token(&self, session: &str) -> Option<AccessToken> {
        self.store.get(session)
    }

    pub fn cache_token(&self, session: &str, token: AccessToken) {
        self.store.insert(session, token);
    }

    pub fn clear_session(&self, session: &str) {
        if self.store.remove(session).is_some() {
            info!(session, "session token cleared");
        }
    }

    pub fn clear_all(&self) {
        self.store.clear();
        info!("all session tokens cleared");
    }

    async fn fb_exchange(&self, token: &str) -> Result<AccessToken> {
        let params = [
            ("grant_type", GRANT_TYPE_EXCHANGE),
            ("client_id", self.oauth.app_id.as_str()),
            ("client_secret", self.oauth.app_secret.as_str()),
            ("fb_exchange_token", token),
        ];
        self.token_request(&params).await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<AccessToken> {
        let url = format!("{}/oauth/access_token", self.graph.versioned_base());

        // Every failure on the token endpoint, transport included, is an
        // authentication failure to the caller.
        let response: TokenResponse = self.get_json(&url, params).await.map_err(|err| match err {
            GraphError::Authentication(_) => err,
            other => GraphError::Authentication(format!("Token exchange failed: {other}")),
        })?;

        if response.access_token.is_empty() {
            return Err(GraphError::Authentication(
                "Token endpoint returned an empty access token".into(),
            ));
        }

        AccessToken::issued(response, Utc::now())
    }

    /// GET `url` and decode the JSON body
    ///
    /// Non-2xx responses become `Authentication` errors carrying the
    /// provider's message when one is present.
    async fn get_json<T: DeserializeOwned>(&self, url: &str, params: &[(&str, &str)]) -> Result<T> {
        let response = self.http.send(self.http.request(Method::GET, url).query(params)).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| GraphError::Network(format!("Failed to read response body: {err}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|envelope| envelope.error.message)
                .unwrap_or_else(|| format!("Token endpoint returned status {status}"));
            return Err(GraphError::Authentication(message));
        }

        serde_json::from_str(&body)
            .map_err(|err| GraphError::Parse(format!("Unexpected response shape: {err}")))
    }
}
