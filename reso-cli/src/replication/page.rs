//! Iteration state and the per-page results yielded by the iterator

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Mutable state of one iterator. Never shared outside of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationState {
    /// URI of the first page
    pub request_uri: String,
    /// URI of the last successful request
    pub last_request_uri: Option<String>,
    /// Continuation link from the last successful page
    pub next_link: Option<String>,
    /// Record count of the last successful page
    pub page_size: Option<usize>,
    pub pages_fetched: usize,
    pub total_records_fetched: usize,
    /// Consecutive failed requests
    pub num_errors: usize,
}

impl IterationState {
    pub fn new(request_uri: impl Into<String>) -> Self {
        Self {
            request_uri: request_uri.into(),
            ..Default::default()
        }
    }
}

/// Kind of a failed page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PageErrorKind {
    /// Transport failure: connection, DNS, client timeout, unreadable body
    General,
    /// Non-2xx response
    Http,
}

/// Error details attached to a failed page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageError {
    pub kind: PageErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub message: String,
}

impl PageError {
    pub fn general(message: impl Into<String>) -> Self {
        Self {
            kind: PageErrorKind::General,
            status_code: None,
            message: message.into(),
        }
    }

    pub fn http(status_code: u16, status_text: impl Into<String>) -> Self {
        Self {
            kind: PageErrorKind::Http,
            status_code: Some(status_code),
            message: status_text.into(),
        }
    }

    /// HTTP 429 Too Many Requests
    pub fn is_rate_limited(&self) -> bool {
        self.status_code == Some(429)
    }
}

impl std::fmt::Display for PageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.kind, self.status_code) {
            (PageErrorKind::Http, Some(code)) => write!(f, "HTTP {} {}", code, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// Outcome of one iteration, yielded to the consumer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub request_uri: String,
    pub has_results: bool,
    pub has_error: bool,
    pub response_time_ms: u64,
    /// Parsed response body (`Value::Null` on failure)
    pub response: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PageError>,
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
    pub total_records_fetched: usize,
    pub pages_fetched: usize,
    pub response_bytes: usize,
}

impl PageResult {
    /// Records of a successful page (`value` array)
    pub fn records(&self) -> &[Value] {
        self.response
            .get("value")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_rate_limited(&self) -> bool {
        self.error.as_ref().is_some_and(PageError::is_rate_limited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(response: Value, error: Option<PageError>) -> PageResult {
        let now = Utc::now();
        PageResult {
            request_uri: "https://api.example.com/Property".to_string(),
            has_results: !response.is_null(),
            has_error: error.is_some(),
            response_time_ms: 12,
            response,
            error,
            start_time: now,
            stop_time: now,
            total_records_fetched: 0,
            pages_fetched: 0,
            response_bytes: 0,
        }
    }

    #[test]
    fn test_records_of_successful_page() {
        let result = page(
            json!({"value": [{"a": 1}], "@odata.nextLink": "https://next"}),
            None,
        );
        assert_eq!(result.records().len(), 1);
        assert!(!result.is_rate_limited());
    }

    #[test]
    fn test_error_page_has_no_records() {
        let result = page(Value::Null, Some(PageError::http(429, "Too Many Requests")));
        assert!(result.records().is_empty());
        assert!(result.is_rate_limited());
        assert_eq!(
            result.error.as_ref().unwrap().to_string(),
            "HTTP 429 Too Many Requests"
        );
    }

    #[test]
    fn test_error_kind_serializes_uppercase() {
        let value = serde_json::to_value(PageError::general("connection refused")).unwrap();
        assert_eq!(value["kind"], "GENERAL");
        assert!(value.get("statusCode").is_none());
    }
}
