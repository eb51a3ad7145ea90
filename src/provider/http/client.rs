//! HTTP transport for chat-completion endpoints.

use crate::provider::error::Error;
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{ACCEPT, HeaderValue, RETRY_AFTER};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How requests authenticate.
#[derive(Clone)]
pub enum AuthConfig {
    /// `Authorization: Bearer {token}`
    Bearer(String),
    /// No header (local servers such as Ollama).
    None,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer([REDACTED])"),
            Self::None => f.write_str("None"),
        }
    }
}

#[derive(Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    auth: AuthConfig,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>, auth: AuthConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into(),
            auth,
        }
    }

    fn post<T: Serialize>(&self, path: &str, body: &T) -> RequestBuilder {
        let request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body);
        match &self.auth {
            AuthConfig::Bearer(token) => request.bearer_auth(token),
            AuthConfig::None => request,
        }
    }

    /// POST a JSON body and decode the JSON reply.
    pub async fn post_json<T: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<R, Error> {
        let response = send(self.post(path, body)).await?;
        let text = response.text().await?;

        serde_json::from_str(&text).map_err(|e| {
            tracing::debug!(body = %text, "Undecodable response body");
            Error::InvalidResponse(format!("Failed to parse response: {e}"))
        })
    }

    /// POST a JSON body and return the raw SSE byte stream. The stream
    /// does not borrow the client or the body.
    pub async fn post_stream<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<impl Stream<Item = Result<Bytes, reqwest::Error>> + use<T>, Error> {
        let request = self
            .post(path, body)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"));
        Ok(send(request).await?.bytes_stream())
    }
}

/// Send and turn non-success statuses into errors.
async fn send(request: RequestBuilder) -> Result<Response, Error> {
    let response = request.send().await.map_err(|e| {
        if e.is_builder() {
            // Never echo the header value; it may hold the key.
            Error::Api("Invalid request: the API key contains characters not allowed in a header".to_string())
        } else {
            Error::Http(e)
        }
    })?;
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(retry_after_secs);
        return Err(Error::RateLimited { retry_after });
    }
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(Error::Api(format!("HTTP {status}: {text}")));
    }
    Ok(response)
}

/// Seconds from a `Retry-After` value. Fractions round up, minimum 1.
/// HTTP-date values are not supported.
fn retry_after_secs(value: &str) -> Option<u64> {
    let secs: f64 = value.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| (secs.ceil() as u64).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", AuthConfig::Bearer("gsk_secret".into()));
        assert!(!rendered.contains("gsk_secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_retry_after_secs() {
        assert_eq!(retry_after_secs(" 30 "), Some(30));
        assert_eq!(retry_after_secs("2.5"), Some(3));
        assert_eq!(retry_after_secs("0"), Some(1));
        assert_eq!(retry_after_secs("-1"), None);
        assert_eq!(retry_after_secs("NaN"), None);
        assert_eq!(retry_after_secs("Thu, 01 Jan 2026 00:00:00 GMT"), None);
    }

    #[tokio::test]
    async fn test_bearer_header_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(header("authorization", "Bearer gsk_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let client = HttpClient::new(server.uri(), AuthConfig::Bearer("gsk_test".into()));
        let reply: serde_json::Value = client.post_json("/echo", &json!({})).await.unwrap();
        assert_eq!(reply["ok"], true);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let client = HttpClient::new(server.uri(), AuthConfig::None);
        let err = client
            .post_json::<_, serde_json::Value>("/x", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unsendable_key_is_api_error() {
        let client = HttpClient::new("http://127.0.0.1:9", AuthConfig::Bearer("gsk_a\x01b".into()));
        let err = client
            .post_json::<_, serde_json::Value>("/x", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api(ref msg) if msg.contains("API key") && !msg.contains("gsk_a")));
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = HttpClient::new(server.uri(), AuthConfig::None);
        let err = client.post_stream("/x", &json!({})).await.err().unwrap();
        assert!(matches!(err, Error::Api(ref msg) if msg.starts_with("HTTP 503")));
        assert!(err.is_transport());
    }
}
