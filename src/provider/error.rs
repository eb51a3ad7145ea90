//! Provider error types.

use serde_json::Value;
use thiserror::Error;

/// Condense an API error for display.
///
/// `HTTP 401 Unauthorized: {"error":{"message":"Invalid API Key","code":"invalid_api_key"}}`
/// becomes `HTTP 401 Unauthorized: Invalid API Key (code: invalid_api_key)`.
/// Text without a recognizable JSON body is returned unchanged.
#[must_use]
pub fn format_api_error(error: &str) -> String {
    let Some(json_start) = error.find('{') else {
        return error.to_string();
    };
    let Some(message) = serde_json::from_str::<Value>(&error[json_start..])
        .ok()
        .as_ref()
        .and_then(error_message)
    else {
        return error.to_string();
    };

    match error[..json_start].trim() {
        "" => message,
        prefix => format!("{prefix} {message}"),
    }
}

/// `error.message` (plus `code` or `type`), a bare `error` string, or a
/// top-level `message`.
fn error_message(json: &Value) -> Option<String> {
    let error = json.get("error");
    if let Some(obj) = error.filter(|e| e.is_object()) {
        let message = obj.get("message")?.as_str()?;
        let detail = ["code", "type"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str));
        return Some(match detail {
            Some(detail) => format!("{message} (code: {detail})"),
            None => message.to_string(),
        });
    }
    error
        .and_then(Value::as_str)
        .or_else(|| json.get("message").and_then(Value::as_str))
        .map(str::to_string)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("API error: {0}")]
    Api(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited, retry after {retry_after:?}s")]
    RateLimited { retry_after: Option<u64> },
}

impl Error {
    /// Whether the failure happened below the HTTP status layer (DNS, connect, timeout, 5xx).
    #[must_use]
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Stream(_) => true,
            Self::Api(msg) => msg.starts_with("HTTP 5"),
            Self::InvalidResponse(_) | Self::RateLimited { .. } => false,
        }
    }
}
