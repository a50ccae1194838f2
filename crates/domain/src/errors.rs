//! Error taxonomy for Graph API operations
//!
//! Every failure the gateway surfaces is a [`GraphError`]. Provider error
//! codes are folded into the first five variants; the rest describe local
//! conditions (breaker, transport, decoding, configuration).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad classes of [`GraphError`] used for retry decisions and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Quota exhausted locally or at the provider
    RateLimit,
    /// Token missing, expired or rejected
    Authentication,
    /// Token lacks a required permission
    Permission,
    /// Request rejected as malformed
    Validation,
    /// Local breaker is shedding load
    Unavailable,
    /// Provider returned an unclassified error
    Provider,
    /// Connection, timeout or body read failure
    Transport,
    /// Response did not match the expected shape
    Decode,
    /// Invalid local configuration
    Config,
}

/// Main error type for Graph API operations
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum GraphError {
    #[error("Rate limit exceeded: {message}")]
    RateLimit { message: String, retry_after_ms: Option<u64> },

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Circuit breaker is open, service unavailable until {next_retry_at_ms}ms")]
    CircuitOpen { next_retry_at_ms: u64 },

    #[error("Graph API error ({code}): {message}")]
    Api { message: String, code: i64, subcode: Option<i64>, trace_id: Option<String> },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GraphError {
    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::RateLimit { .. } => ErrorCategory::RateLimit,
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::Permission(_) => ErrorCategory::Permission,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::CircuitOpen { .. } => ErrorCategory::Unavailable,
            Self::Api { .. } => ErrorCategory::Provider,
            Self::Network(_) | Self::Timeout { .. } => ErrorCategory::Transport,
            Self::Parse(_) => ErrorCategory::Decode,
            Self::Config(_) => ErrorCategory::Config,
        }
    }

    /// Whether the same request may succeed if tried again later
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimit { .. }
            | Self::CircuitOpen { .. }
            | Self::Network(_)
            | Self::Timeout { .. } => true,
            Self::Api { code, .. } => (500..600).contains(code) || *code == 1 || *code == 2,
            _ => false,
        }
    }

    /// Provider- or limiter-suggested wait before retrying, when known
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after_ms, .. } => retry_after_ms.map(Duration::from_millis),
            _ => None,
        }
    }

    /// Provider error code associated with this error
    ///
    /// Mirrors the representative code for each class so that callers
    /// switching on numeric codes keep working.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::RateLimit { .. } => Some(4),
            Self::Authentication(_) => Some(190),
            Self::Permission(_) => Some(200),
            Self::Validation(_) => Some(100),
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type alias for Graph API operations
pub type Result<T> = std::result::Result<T, GraphError>;
