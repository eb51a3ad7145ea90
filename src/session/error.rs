use crate::provider::{self, format_api_error};
use thiserror::Error;

/// Why a submission produced no answer.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No API key provided")]
    MissingCredential,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<u64> },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn retry_hint(retry_after: &Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!(", retry after {secs}s"),
        None => String::new(),
    }
}

impl SessionError {
    /// Short category for status lines and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::Network(_) => "network",
            Self::RateLimited { .. } => "rate_limited",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Api(_) => "api",
            Self::Config(_) => "config",
        }
    }
}

impl From<provider::Error> for SessionError {
    fn from(err: provider::Error) -> Self {
        if err.is_transport() {
            return Self::Network(format_api_error(&err.to_string()));
        }
        match err {
            provider::Error::RateLimited { retry_after } => Self::RateLimited { retry_after },
            provider::Error::InvalidResponse(msg) => Self::MalformedResponse(msg),
            provider::Error::Api(msg) => Self::Api(format_api_error(&msg)),
            provider::Error::Http(e) if e.is_decode() => Self::MalformedResponse(e.to_string()),
            other => Self::Network(other.to_string()),
        }
    }
}
