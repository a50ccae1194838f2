//! Background token refresh
//!
//! Sleeps until the session's token enters the refresh threshold, then trades
//! it for a new long-lived token. Failures are retried after
//! `retry_interval_secs`; while no token is cached the task polls every
//! `idle_interval_secs`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use warroom_domain::{AccessToken, GraphError, Result, TokenRefreshSettings, DEFAULT_SESSION};

use super::token_manager::TokenManager;

// Thresholds beyond a year are treated as a year.
const MAX_THRESHOLD_SECS: i64 = 365 * 24 * 3600;

// Idle polls and retries wait at least this long.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Keeps one session's token fresh until cancelled
#[derive(Debug, Clone)]
pub struct TokenRefresher {
    manager: Arc<TokenManager>,
    session: String,
    settings: TokenRefreshSettings,
}

impl TokenRefresher {
    /// Refresher for the default session
    pub fn new(manager: Arc<TokenManager>, settings: TokenRefreshSettings) -> Self {
        Self { manager, session: DEFAULT_SESSION.to_string(), settings }
    }

    /// Refresh a different session
    #[must_use]
    pub fn session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }

    /// Spawn [`TokenRefresher::run`] on the current runtime
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Run until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        if !self.settings.enabled {
            info!(session = %self.session, "token auto-refresh disabled");
            return;
        }

        info!(session = %self.session, "starting token auto-refresh");

        loop {
            let wake = self.next_wake();
            debug!(session = %self.session, wake_secs = wake.as_secs(), "auto-refresh sleeping");
            if !sleep_or_cancel(wake, &cancel).await {
                break;
            }

            // The session may have been cleared while sleeping.
            let Some(token) = self.manager.cached_token(&self.session) else {
                continue;
            };
            if !token.expires_within(Utc::now(), self.threshold()) {
                continue;
            }

            let backoff = match self.refresh_now().await {
                Ok(fresh) if fresh.expires_within(Utc::now(), self.threshold()) => {
                    warn!(
                        session = %self.session,
                        "refreshed token is still inside the refresh threshold"
                    );
                    true
                }
                Ok(_) => false,
                Err(err) => {
                    error!(session = %self.session, error = %err, "auto-refresh failed");
                    true
                }
            };

            if backoff && !sleep_or_cancel(self.retry_interval(), &cancel).await {
                break;
            }
        }

        info!(session = %self.session, "token auto-refresh stopped");
    }

    /// Refresh the session's token immediately
    ///
    /// Uses the token's refresh token when it has one, otherwise exchanges the
    /// access token itself.
    pub async fn refresh_now(&self) -> Result<AccessToken> {
        let token = self.manager.cached_token(&self.session).ok_or_else(|| {
            GraphError::Authentication(format!("No token cached for session '{}'", self.session))
        })?;

        let source = token.refresh_token.as_deref().unwrap_or(&token.access_token);
        let fresh = self.manager.exchange_long_lived(&self.session, source).await?;
        info!(session = %self.session, expires_at = ?fresh.expires_at, "token auto-refreshed");
        Ok(fresh)
    }

    /// Time until the cached token enters the refresh threshold
    fn next_wake(&self) -> Duration {
        let idle = Duration::from_secs(self.settings.idle_interval_secs).max(MIN_INTERVAL);

        let Some(expires_at) =
            self.manager.cached_token(&self.session).and_then(|token| token.expires_at)
        else {
            return idle;
        };

        expires_at
            .checked_sub_signed(self.threshold())
            .and_then(|refresh_at| (refresh_at - Utc::now()).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    fn threshold(&self) -> chrono::Duration {
        let secs = i64::try_from(self.settings.refresh_threshold_secs)
            .unwrap_or(MAX_THRESHOLD_SECS)
            .min(MAX_THRESHOLD_SECS);
        chrono::Duration::seconds(secs)
    }

    fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.settings.retry_interval_secs).max(MIN_INTERVAL)
    }
}

/// Returns `false` when cancelled
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        tokio::task::yield_now().await;
        return !cancel.is_cancelled();
    }
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}
