//! OAuth token types
//!
//! [`TokenResponse`] is what the token endpoint returns; [`AccessToken`] is
//! what the gateway caches, with an absolute expiry derived at issue time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{GraphError, Result};

/// Access token with metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,

    pub token_type: String,

    /// Lifetime in seconds as reported at issue time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// Absolute expiration timestamp, derived from `expires_in`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl AccessToken {
    /// Build a token issued at `issued_at`
    ///
    /// A missing or non-positive `expires_in` yields a token with no expiry.
    ///
    /// # Errors
    /// Returns `GraphError::Authentication` when `expires_in` puts the expiry
    /// outside the representable date range.
    pub fn issued(response: TokenResponse, issued_at: DateTime<Utc>) -> Result<Self> {
        let expires_at = match response.expires_in.filter(|secs| *secs > 0) {
            Some(secs) => Some(
                Duration::try_seconds(secs)
                    .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
                    .ok_or_else(|| {
                        GraphError::Authentication(format!(
                            "Token endpoint returned an out-of-range expires_in: {secs}"
                        ))
                    })?,
            ),
            None => None,
        };

        Ok(Self {
            access_token: response.access_token,
            token_type: response.token_type.unwrap_or_else(|| "bearer".to_string()),
            expires_in: response.expires_in,
            expires_at,
            refresh_token: response.refresh_token,
            scope: response.scope,
        })
    }

    /// Token without expiry metadata, e.g. one supplied by the caller
    #[must_use]
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "bearer".to_string(),
            expires_in: None,
            expires_at: None,
            refresh_token: None,
            scope: None,
        }
    }

    /// Whether the token is expired at `now` or will be within `threshold`
    #[must_use]
    pub fn expires_within(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.expires_at.is_some_and(|expires_at| now + threshold >= expires_at)
    }

    /// Whether the token has expired
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_within(Utc::now(), Duration::zero())
    }

    /// Seconds until expiry, `None` when the token carries no expiry
    #[must_use]
    pub fn seconds_until_expiry(&self) -> Option<i64> {
        self.expires_at.map(|expires_at| (expires_at - Utc::now()).num_seconds())
    }
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// `debug_token` introspection payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebugTokenData {
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Unix seconds; zero or absent means the token never expires
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl DebugTokenData {
    /// Valid, issued to `app_id`, and not expired at `now`
    #[must_use]
    pub fn is_usable_for(&self, app_id: &str, now: DateTime<Utc>) -> bool {
        let not_expired = match self.expires_at {
            None | Some(0) => true,
            Some(secs) => secs.saturating_mul(1000) > now.timestamp_millis(),
        };
        self.is_valid && self.app_id.as_deref() == Some(app_id) && not_expired
    }
}

/// One row of `/me/permissions`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PermissionGrant {
    pub permission: String,
    pub status: String,
}

impl PermissionGrant {
    #[must_use]
    pub fn is_granted(&self) -> bool {
        self.status == "granted"
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn issued_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("valid timestamp")
    }

    /// Validates `AccessToken::issued` derives the absolute expiry.
    ///
    /// Assertions:
    /// - Confirms `expires_at` equals issue time plus `expires_in`.
    /// - Confirms a token type defaults to `bearer`.
    #[test]
    fn test_issued_derives_expiry() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"EAAB","expires_in":5183944}"#)
                .expect("response parses");
        let token = AccessToken::issued(response, issued_at()).expect("expiry in range");

        assert_eq!(token.token_type, "bearer");
        assert_eq!(token.expires_at, Some(issued_at() + Duration::seconds(5_183_944)));
        assert!(!token.expires_within(issued_at(), Duration::days(59)));
        assert!(token.expires_within(issued_at(), Duration::days(60)));
    }

    /// Validates out-of-range lifetimes are rejected instead of overflowing.
    ///
    /// Assertions:
    /// - Ensures `i64::MAX` and a lifetime past the date range fail as
    ///   `Authentication`.
    /// - Confirms a non-positive lifetime still means no expiry.
    #[test]
    fn test_issued_rejects_out_of_range_expiry() {
        let huge: TokenResponse = serde_json::from_str(&format!(
            r#"{{"access_token":"EAAB","expires_in":{}}}"#,
            i64::MAX
        ))
        .expect("response parses");
        assert!(matches!(
            AccessToken::issued(huge, issued_at()),
            Err(GraphError::Authentication(_))
        ));

        let past_range: TokenResponse =
            serde_json::from_str(r#"{"access_token":"EAAB","expires_in":9000000000000}"#)
                .expect("response parses");
        assert!(matches!(
            AccessToken::issued(past_range, issued_at()),
            Err(GraphError::Authentication(_))
        ));

        let negative: TokenResponse =
            serde_json::from_str(r#"{"access_token":"EAAB","expires_in":-5}"#)
                .expect("response parses");
        let token = AccessToken::issued(negative, issued_at()).expect("no expiry");
        assert_eq!(token.expires_at, None);
    }

    #[test]
    fn test_no_expiry_never_expires() {
        let token = AccessToken::bearer("EAAB");
        assert!(!token.is_expired());
        assert_eq!(token.seconds_until_expiry(), None);
    }

    /// Validates `DebugTokenData::is_usable_for` checks.
    ///
    /// Assertions:
    /// - Ensures a mismatched app id or past expiry is rejected.
    #[test]
    fn test_debug_token_usable() {
        let now = issued_at();
        let data = DebugTokenData {
            is_valid: true,
            app_id: Some("1234".into()),
            expires_at: Some(now.timestamp() + 60),
            ..DebugTokenData::default()
        };
        assert!(data.is_usable_for("1234", now));
        assert!(!data.is_usable_for("9999", now));
        assert!(!data.is_usable_for("1234", now + Duration::seconds(61)));

        let never = DebugTokenData { expires_at: Some(0), ..data.clone() };
        assert!(never.is_usable_for("1234", now + Duration::days(365)));
    }
}
