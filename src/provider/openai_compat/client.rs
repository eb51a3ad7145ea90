//! Chat completions over HTTP, streaming or not.

use super::quirks::ProviderQuirks;
use super::request::CompletionRequest;
use super::response::{Completion, ReplyBody, ToolCallAssembler, ToolCallPart};
use crate::provider::api_provider::Provider;
use crate::provider::error::Error;
use crate::provider::http::{AuthConfig, HttpClient, SseFrame, SseParser};
use crate::provider::types::{ChatRequest, ContentBlock, Message, Role, StreamEvent, Usage};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;

const COMPLETIONS_PATH: &str = "/chat/completions";

pub struct OpenAICompatClient {
    http: HttpClient,
    quirks: ProviderQuirks,
    provider: Provider,
}

impl OpenAICompatClient {
    /// `base_url` overrides the provider default.
    pub fn new(provider: Provider, api_key: Option<String>, base_url: Option<&str>) -> Self {
        let quirks = ProviderQuirks::for_provider(provider);
        let auth = match api_key {
            Some(key) if provider.requires_api_key() => AuthConfig::Bearer(key),
            _ => AuthConfig::None,
        };
        let base_url = base_url.unwrap_or(quirks.base_url).trim_end_matches('/');

        Self {
            http: HttpClient::new(base_url, auth),
            quirks,
            provider,
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    fn body<'a>(&self, request: &'a ChatRequest, stream: bool) -> CompletionRequest<'a> {
        let body = CompletionRequest::new(request, &self.quirks, stream);
        tracing::debug!(
            provider = %self.provider.id(),
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            stream,
            "Chat completion request"
        );
        body
    }

    pub async fn complete(&self, request: ChatRequest) -> Result<Message, Error> {
        let reply: Completion = self
            .http
            .post_json(COMPLETIONS_PATH, &self.body(&request, false))
            .await?;

        let choice = reply
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse("response contained no choices".into()))?;
        let mut body = choice.message;
        let mut blocks = Vec::new();

        if let Some(thinking) = self.reasoning(&mut body) {
            blocks.push(ContentBlock::Thinking { thinking });
        }
        if let Some(text) = body.take_text() {
            blocks.push(ContentBlock::Text { text });
        }

        let mut calls = ToolCallAssembler::default();
        for (index, part) in body.tool_calls.into_iter().enumerate() {
            calls.push(ToolCallPart { index, ..part });
        }
        blocks.extend(calls.finish().into_iter().map(|call| ContentBlock::ToolCall {
            id: call.id,
            name: call.name,
            arguments: call.arguments,
        }));

        Ok(Message {
            role: Role::Assistant,
            content: Arc::new(blocks),
        })
    }

    /// Stream a completion into `tx`. Tool calls are sent whole once their
    /// fragments are complete, and `Done` closes a clean stream. Returns
    /// early, dropping the connection, once the receiver is gone.
    pub async fn stream(
        &self,
        request: ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), Error> {
        let body = self.body(&request, true);
        let stream = self.http.post_stream(COMPLETIONS_PATH, &body).await?;
        futures::pin_mut!(stream);

        let mut parser = SseParser::new();
        let mut calls = ToolCallAssembler::default();

        'frames: while let Some(bytes) = stream.next().await {
            let bytes = bytes.map_err(|e| Error::Stream(e.to_string()))?;

            for frame in parser.feed(&bytes) {
                let SseFrame::Data(data) = frame else {
                    break 'frames;
                };
                match serde_json::from_str::<Completion>(&data) {
                    Ok(chunk) => self.forward(chunk, &tx, &mut calls).await?,
                    Err(e) => tracing::warn!("Skipping unparseable stream chunk: {e}"),
                }
            }

            if tx.is_closed() {
                tracing::debug!(provider = %self.provider.id(), "Receiver dropped, abandoning stream");
                return Ok(());
            }
        }

        // Some servers end without finish_reason=tool_calls
        send_tool_calls(&mut calls, &tx).await;
        let _ = tx.send(StreamEvent::Done).await;
        Ok(())
    }

    async fn forward(
        &self,
        mut chunk: Completion,
        tx: &mpsc::Sender<StreamEvent>,
        calls: &mut ToolCallAssembler,
    ) -> Result<(), Error> {
        if let Some(error) = chunk.error.take() {
            return Err(Error::Api(error.message));
        }
        if let Some(usage) = chunk.take_usage() {
            let usage = Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            };
            let _ = tx.send(StreamEvent::Usage(usage)).await;
        }

        for choice in chunk.choices {
            let mut delta = choice.message;
            if let Some(thinking) = self.reasoning(&mut delta) {
                let _ = tx.send(StreamEvent::ThinkingDelta(thinking)).await;
            }
            if let Some(text) = delta.take_text() {
                let _ = tx.send(StreamEvent::TextDelta(text)).await;
            }
            for part in delta.tool_calls {
                calls.push(part);
            }
            if choice.finish_reason.as_deref() == Some("tool_calls") {
                send_tool_calls(calls, tx).await;
            }
        }
        Ok(())
    }

    fn reasoning(&self, body: &mut ReplyBody) -> Option<String> {
        if self.quirks.reasoning {
            body.take_reasoning()
        } else {
            None
        }
    }
}

async fn send_tool_calls(calls: &mut ToolCallAssembler, tx: &mpsc::Sender<StreamEvent>) {
    for call in calls.finish() {
        tracing::debug!(id = %call.id, name = %call.name, "Tool call complete");
        let _ = tx.send(StreamEvent::ToolCall(call)).await;
    }
}
