//! The seams the agent talks through: [`LlmApi`] for model calls and
//! [`Connect`] for turning a credential into a client.

use super::api_provider::Provider;
use super::error::Error;
use super::openai_compat::OpenAICompatClient;
use super::types::{ChatRequest, Message, StreamEvent};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

#[async_trait]
pub trait LlmApi: Send + Sync {
    /// Provider id, for logs.
    fn id(&self) -> &str;
    /// Stream a completion into `tx`, ending with [`StreamEvent::Done`].
    async fn stream(&self, request: ChatRequest, tx: mpsc::Sender<StreamEvent>)
    -> Result<(), Error>;
    async fn complete(&self, request: ChatRequest) -> Result<Message, Error>;
}

/// Chat client for one provider and one API key.
pub struct Client(OpenAICompatClient);

impl Client {
    /// `base_url` replaces the provider's default endpoint (proxies, local servers).
    pub fn new(provider: Provider, api_key: impl Into<String>, base_url: Option<&str>) -> Self {
        Self(OpenAICompatClient::new(provider, Some(api_key.into()), base_url))
    }
}

#[async_trait]
impl LlmApi for Client {
    fn id(&self) -> &str {
        self.0.provider().id()
    }

    async fn stream(
        &self,
        request: ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), Error> {
        self.0.stream(request, tx).await
    }

    async fn complete(&self, request: ChatRequest) -> Result<Message, Error> {
        self.0.complete(request).await
    }
}

/// Builds a client for an API key handed over at call time, so nothing
/// long-lived keeps the key.
pub trait Connect: Send + Sync {
    fn connect(&self, api_key: &str) -> Arc<dyn LlmApi>;
}

/// Provider plus optional endpoint override, as read from config.
#[derive(Debug, Clone, Default)]
pub struct Endpoint {
    pub provider: Provider,
    pub base_url: Option<String>,
}

impl Connect for Endpoint {
    fn connect(&self, api_key: &str) -> Arc<dyn LlmApi> {
        Arc::new(Client::new(self.provider, api_key, self.base_url.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_reports_provider() {
        let client = Client::new(Provider::Groq, "test-key", None);
        assert_eq!(client.id(), "groq");
    }

    #[test]
    fn test_endpoint_connects_to_provider() {
        let endpoint = Endpoint {
            provider: Provider::Ollama,
            base_url: Some("http://127.0.0.1:11434/v1".into()),
        };
        assert_eq!(endpoint.connect("unused").id(), "ollama");
        assert_eq!(Endpoint::default().connect("k").id(), "groq");
    }
}
