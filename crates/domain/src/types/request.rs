//! Request descriptors

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP methods accepted by the Graph API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for a single Graph request
///
/// Query parameters keep insertion order. `None`/null values are dropped
/// when the URL is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub method: HttpMethod,
    pub params: Vec<(String, Value)>,
    pub body: Option<Value>,
    /// Explicit token; wins over the cached session token
    pub token: Option<String>,
    /// Overrides the client's default timeout for this call
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self { method: HttpMethod::Post, body: Some(body), ..Self::default() }
    }

    pub fn delete() -> Self {
        Self { method: HttpMethod::Delete, ..Self::default() }
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.params.extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Render a parameter value the way the Graph API expects it in a query
/// string: strings verbatim, scalars via `to_string`, arrays and objects as
/// JSON. Returns `None` for null.
pub fn param_to_query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_options_builder() {
        let options = RequestOptions::get()
            .param("fields", "id,name")
            .param("limit", 25)
            .token("EAAB")
            .timeout(Duration::from_secs(5));

        assert_eq!(options.method, HttpMethod::Get);
        assert_eq!(options.params.len(), 2);
        assert_eq!(options.token.as_deref(), Some("EAAB"));
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_param_rendering() {
        assert_eq!(param_to_query_value(&json!("x")), Some("x".to_string()));
        assert_eq!(param_to_query_value(&json!(25)), Some("25".to_string()));
        assert_eq!(param_to_query_value(&json!(true)), Some("true".to_string()));
        assert_eq!(param_to_query_value(&json!(null)), None);
        assert_eq!(
            param_to_query_value(&json!({"since":"2026-01-01"})),
            Some(r#"{"since":"2026-01-01"}"#.to_string())
        );
    }
}
