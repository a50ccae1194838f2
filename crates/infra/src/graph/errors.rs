//! Provider error mapping
//!
//! Folds the provider's numeric error codes into [`GraphError`]. Bodies
//! without an `error` object fall back to the HTTP status.

use reqwest::StatusCode;
use warroom_domain::{
    ErrorEnvelope, GraphError, ProviderError, AUTHENTICATION_CODES, PERMISSION_CODES,
    RATE_LIMIT_CODES, VALIDATION_CODE,
};

const MINUTE_MS: u64 = 60_000;

/// Map a provider error object to the taxonomy
pub fn map_provider_error(error: &ProviderError, status: StatusCode) -> GraphError {
    let message =
        error.message.clone().unwrap_or_else(|| "Unknown Graph API error".to_string());
    let code = error.code.unwrap_or_else(|| i64::from(status.as_u16()));

    if RATE_LIMIT_CODES.contains(&code) {
        let retry_after_ms = error
            .error_data
            .as_ref()
            .and_then(|data| data.estimated_time_to_regain_access)
            .map(|minutes| minutes.saturating_mul(MINUTE_MS));
        return GraphError::RateLimit { message, retry_after_ms };
    }
    if AUTHENTICATION_CODES.contains(&code) {
        return GraphError::Authentication(message);
    }
    if PERMISSION_CODES.contains(&code) {
        return GraphError::Permission(message);
    }
    if code == VALIDATION_CODE {
        return GraphError::Validation(message);
    }

    GraphError::Api {
        message,
        code,
        subcode: error.error_subcode,
        trace_id: error.fbtrace_id.clone(),
    }
}

/// Map a non-2xx response body
pub fn map_error_response(status: StatusCode, body: &str) -> GraphError {
    if let Some(envelope) = error_envelope(body) {
        return map_provider_error(&envelope.error, status);
    }

    let message = if body.trim().is_empty() {
        format!("Graph API returned status {status}")
    } else {
        format!("Graph API returned status {status}: {}", truncate(body.trim(), 256))
    };

    match status {
        StatusCode::UNAUTHORIZED => GraphError::Authentication(message),
        StatusCode::FORBIDDEN => GraphError::Permission(message),
        StatusCode::TOO_MANY_REQUESTS => GraphError::RateLimit { message, retry_after_ms: None },
        _ => GraphError::Api {
            message,
            code: i64::from(status.as_u16()),
            subcode: None,
            trace_id: None,
        },
    }
}

/// Parse `body` as an error envelope, if it is one
pub fn error_envelope(body: &str) -> Option<ErrorEnvelope> {
    serde_json::from_str::<ErrorEnvelope>(body).ok()
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use warroom_domain::ErrorData;

    use super::*;

    fn provider_error(code: i64) -> ProviderError {
        ProviderError {
            message: Some(format!("error {code}")),
            code: Some(code),
            ..ProviderError::default()
        }
    }

    /// Validates the code table.
    ///
    /// Assertions:
    /// - Confirms 4/17/32 map to `RateLimit`, 190/102 to `Authentication`,
    ///   200/10 to `Permission` and 100 to `Validation`.
    /// - Confirms anything else becomes `Api` with subcode and trace id.
    #[test]
    fn test_code_table() {
        for code in [4, 17, 32] {
            assert!(matches!(
                map_provider_error(&provider_error(code), StatusCode::BAD_REQUEST),
                GraphError::RateLimit { .. }
            ));
        }
        for code in [190, 102] {
            assert!(matches!(
                map_provider_error(&provider_error(code), StatusCode::BAD_REQUEST),
                GraphError::Authentication(_)
            ));
        }
        for code in [200, 10] {
            assert!(matches!(
                map_provider_error(&provider_error(code), StatusCode::FORBIDDEN),
                GraphError::Permission(_)
            ));
        }
        assert_eq!(
            map_provider_error(&provider_error(100), StatusCode::BAD_REQUEST),
            GraphError::Validation("error 100".into())
        );

        let error = ProviderError {
            error_subcode: Some(1_487_390),
            fbtrace_id: Some("AbCdEf".into()),
            ..provider_error(2635)
        };
        assert_eq!(
            map_provider_error(&error, StatusCode::BAD_REQUEST),
            GraphError::Api {
                message: "error 2635".into(),
                code: 2635,
                subcode: Some(1_487_390),
                trace_id: Some("AbCdEf".into()),
            }
        );
    }

    #[test]
    fn test_rate_limit_retry_after_is_minutes() {
        let error = ProviderError {
            error_data: Some(ErrorData { estimated_time_to_regain_access: Some(5) }),
            ..provider_error(17)
        };
        let mapped = map_provider_error(&error, StatusCode::BAD_REQUEST);
        assert_eq!(
            mapped,
            GraphError::RateLimit { message: "error 17".into(), retry_after_ms: Some(300_000) }
        );
    }

    /// Validates responses without an error envelope.
    ///
    /// Assertions:
    /// - Confirms 401, 403 and 429 map by status.
    /// - Confirms other statuses become `Api` carrying the status code.
    /// - Confirms a missing provider code falls back to the status.
    #[test]
    fn test_status_fallback() {
        assert!(matches!(
            map_error_response(StatusCode::UNAUTHORIZED, ""),
            GraphError::Authentication(_)
        ));
        assert!(matches!(
            map_error_response(StatusCode::FORBIDDEN, "nope"),
            GraphError::Permission(_)
        ));
        assert!(matches!(
            map_error_response(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            GraphError::RateLimit { retry_after_ms: None, .. }
        ));
        assert!(matches!(
            map_error_response(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>"),
            GraphError::Api { code: 502, .. }
        ));
        assert!(matches!(
            map_error_response(StatusCode::SERVICE_UNAVAILABLE, r#"{"error":{"message":"down"}}"#),
            GraphError::Api { code: 503, .. }
        ));
    }
}
