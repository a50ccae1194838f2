//! Batch request types

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use super::request::HttpMethod;

/// One sub-request of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub method: HttpMethod,
    /// Path relative to the versioned API root, including its query string
    pub relative_url: String,
    /// Form-encoded body for write sub-requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl BatchRequest {
    pub fn get(relative_url: impl Into<String>) -> Self {
        Self { method: HttpMethod::Get, relative_url: relative_url.into(), body: None }
    }

    /// Write sub-request; `fields` are form-encoded into `body`
    pub fn post<'a>(
        relative_url: impl Into<String>,
        fields: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let body = form_urlencoded::Serializer::new(String::new()).extend_pairs(fields).finish();
        Self { method: HttpMethod::Post, relative_url: relative_url.into(), body: Some(body) }
    }

    pub fn delete(relative_url: impl Into<String>) -> Self {
        Self { method: HttpMethod::Delete, relative_url: relative_url.into(), body: None }
    }
}

/// Header of a batch sub-response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchHeader {
    pub name: String,
    pub value: String,
}

/// Result of one sub-request; `body` is the raw JSON text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub code: u16,
    #[serde(default)]
    pub headers: Vec<BatchHeader>,
    #[serde(default)]
    pub body: String,
}

impl BatchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Decode `body` into `T`
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}
