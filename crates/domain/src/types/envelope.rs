//! Graph response envelope
//!
//! List endpoints wrap their payload as `{data, paging}`; failures carry an
//! `error` object instead.

use serde::{Deserialize, Serialize};

/// `{data, paging?}` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphResponse<T> {
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paging: Option<Paging>,
}

/// One page of a list endpoint
pub type Page<T> = GraphResponse<Vec<T>>;

impl<T> GraphResponse<T> {
    /// Absolute URL of the next page, if any
    pub fn next_page(&self) -> Option<&str> {
        self.paging.as_ref().and_then(|p| p.next.as_deref()).filter(|url| !url.is_empty())
    }
}

/// Cursor pagination metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursors: Option<Cursors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursors {
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
}

/// Provider error object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub error_subcode: Option<i64>,
    #[serde(default)]
    pub error_user_title: Option<String>,
    #[serde(default)]
    pub error_user_msg: Option<String>,
    #[serde(default)]
    pub fbtrace_id: Option<String>,
    #[serde(default)]
    pub error_data: Option<ErrorData>,
}

/// Extra detail attached to throttling errors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    /// Minutes until the throttled app or account regains access
    #[serde(default)]
    pub estimated_time_to_regain_access: Option<u64>,
}

/// `{error}` wrapper used for failure bodies
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ProviderError,
}
