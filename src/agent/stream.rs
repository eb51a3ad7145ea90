use crate::agent::AgentEvent;
use crate::provider::{self, ChatRequest, ContentBlock, LlmApi, StreamEvent, ToolCallEvent, Usage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, warn};

/// Give up on a stream that has been silent this long.
const STREAM_STALE_TIMEOUT: Duration = Duration::from_secs(120);

/// Assistant output of one model call, built up as it arrives and echoed to
/// the observer on the way.
#[derive(Debug, Default)]
pub(crate) struct Reply {
    pub blocks: Vec<ContentBlock>,
    pub tool_calls: Vec<ToolCallEvent>,
}

impl Reply {
    async fn text(&mut self, delta: String, tx: &mpsc::Sender<AgentEvent>) {
        let _ = tx.send(AgentEvent::TextDelta(delta.clone())).await;
        match self.blocks.last_mut() {
            Some(ContentBlock::Text { text }) => text.push_str(&delta),
            _ => self.blocks.push(ContentBlock::Text { text: delta }),
        }
    }

    async fn thinking(&mut self, delta: String, tx: &mpsc::Sender<AgentEvent>) {
        let _ = tx.send(AgentEvent::ThinkingDelta(delta.clone())).await;
        match self.blocks.last_mut() {
            Some(ContentBlock::Thinking { thinking }) => thinking.push_str(&delta),
            _ => self.blocks.push(ContentBlock::Thinking { thinking: delta }),
        }
    }

    async fn tool_call(&mut self, call: ToolCallEvent, tx: &mpsc::Sender<AgentEvent>) {
        let _ = tx
            .send(AgentEvent::ToolCallStart {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            })
            .await;
        self.blocks.push(ContentBlock::ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        });
        self.tool_calls.push(call);
    }
}

/// One model call. Streams when asked to, unless the provider refuses to
/// stream a request that carries tools.
pub(crate) async fn respond(
    provider: &Arc<dyn LlmApi>,
    request: &ChatRequest,
    tx: &mpsc::Sender<AgentEvent>,
    streaming: bool,
) -> Result<Reply, provider::Error> {
    if streaming {
        match stream_reply(provider, request, tx).await {
            Err(e) if !request.tools.is_empty() && tools_not_supported(&e) => {
                warn!(provider = %provider.id(), "Streaming with tools unsupported, retrying without streaming");
            }
            result => return result,
        }
    }
    complete_reply(provider, request, tx).await
}

async fn stream_reply(
    provider: &Arc<dyn LlmApi>,
    request: &ChatRequest,
    tx: &mpsc::Sender<AgentEvent>,
) -> Result<Reply, provider::Error> {
    let (stream_tx, mut stream_rx) = mpsc::channel(100);
    // Dropping this future (Ctrl-C, timeout) must also stop the HTTP stream
    let handle = AbortOnDropHandle::new({
        let provider = provider.clone();
        let request = request.clone();
        tokio::spawn(async move { provider.stream(request, stream_tx).await })
    });

    let mut reply = Reply::default();
    loop {
        let event = tokio::select! {
            event = stream_rx.recv() => event,
            () = tokio::time::sleep(STREAM_STALE_TIMEOUT) => {
                warn!(secs = STREAM_STALE_TIMEOUT.as_secs(), "Stream went silent");
                handle.abort();
                return Err(provider::Error::Stream("no data received before timeout".to_string()));
            }
        };

        match event {
            Some(StreamEvent::TextDelta(delta)) => reply.text(delta, tx).await,
            Some(StreamEvent::ThinkingDelta(delta)) => reply.thinking(delta, tx).await,
            Some(StreamEvent::ToolCall(call)) => reply.tool_call(call, tx).await,
            Some(StreamEvent::Usage(usage)) => report_usage(&usage, tx).await,
            Some(StreamEvent::Error(e)) => {
                handle.abort();
                return Err(provider::Error::Stream(e));
            }
            Some(StreamEvent::Done) => {}
            None => break,
        }
    }

    match handle.await {
        Ok(result) => result.map(|()| reply),
        Err(e) if e.is_panic() => Err(provider::Error::Stream("provider task panicked".to_string())),
        Err(_) => Err(provider::Error::Stream("provider task cancelled".to_string())),
    }
}

fn tools_not_supported(err: &provider::Error) -> bool {
    matches!(err, provider::Error::Api(msg) if msg.to_lowercase().contains("tools not supported"))
}

/// Non-streaming call. The observer still sees each block.
async fn complete_reply(
    provider: &Arc<dyn LlmApi>,
    request: &ChatRequest,
    tx: &mpsc::Sender<AgentEvent>,
) -> Result<Reply, provider::Error> {
    debug!(provider = %provider.id(), "Non-streaming completion");
    let message = provider.complete(request.clone()).await?;

    let mut reply = Reply::default();
    for block in message.content.iter().cloned() {
        match block {
            ContentBlock::Text { text } => reply.text(text, tx).await,
            ContentBlock::Thinking { thinking } => reply.thinking(thinking, tx).await,
            ContentBlock::ToolCall {
                id,
                name,
                arguments,
            } => {
                let call = ToolCallEvent {
                    id,
                    name,
                    arguments,
                };
                reply.tool_call(call, tx).await;
            }
            ContentBlock::ToolResult { .. } => {}
        }
    }
    Ok(reply)
}

async fn report_usage(usage: &Usage, tx: &mpsc::Sender<AgentEvent>) {
    if *usage == Usage::default() {
        return;
    }
    let _ = tx
        .send(AgentEvent::Usage {
            input_tokens: usage.input_tokens as usize,
            output_tokens: usage.output_tokens as usize,
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Streams ten deltas, 50ms apart, counting what it managed to send.
    #[derive(Default)]
    struct SlowApi {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl LlmApi for SlowApi {
        fn id(&self) -> &str {
            "slow"
        }

        async fn stream(
            &self,
            _: ChatRequest,
            tx: mpsc::Sender<StreamEvent>,
        ) -> Result<(), provider::Error> {
            for i in 0..10 {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let _ = tx.send(StreamEvent::TextDelta(i.to_string())).await;
                self.sent.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }

        async fn complete(&self, _: ChatRequest) -> Result<Message, provider::Error> {
            Err(provider::Error::InvalidResponse("not used".into()))
        }
    }

    fn empty_request() -> ChatRequest {
        ChatRequest {
            model: "m".into(),
            messages: Arc::new(vec![]),
            system: None,
            tools: Arc::new(vec![]),
            max_tokens: None,
            temperature: None,
        }
    }

    #[tokio::test]
    async fn test_dropping_the_call_stops_the_stream() {
        let api = Arc::new(SlowApi::default());
        let provider: Arc<dyn LlmApi> = api.clone();
        let (tx, _rx) = mpsc::channel(64);

        let request = empty_request();
        let call = respond(&provider, &request, &tx, true);
        assert!(tokio::time::timeout(Duration::from_millis(120), call).await.is_err());

        let at_cancel = api.sent.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(api.sent.load(Ordering::SeqCst), at_cancel);
        assert!(at_cancel < 10);
    }

    #[tokio::test]
    async fn test_reply_merges_adjacent_deltas() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut reply = Reply::default();
        reply.thinking("2+2 ".into(), &tx).await;
        reply.text("Final ".into(), &tx).await;
        reply.text("Answer: 4".into(), &tx).await;
        reply
            .tool_call(
                ToolCallEvent {
                    id: "call_1".into(),
                    name: "wikipedia_search".into(),
                    arguments: json!({"query": "4"}),
                },
                &tx,
            )
            .await;
        drop(tx);

        assert_eq!(reply.blocks.len(), 3);
        assert!(matches!(&reply.blocks[1], ContentBlock::Text { text } if text == "Final Answer: 4"));
        assert_eq!(reply.tool_calls.len(), 1);

        let mut events = 0;
        while rx.recv().await.is_some() {
            events += 1;
        }
        assert_eq!(events, 4);
    }

    #[tokio::test]
    async fn test_zero_usage_is_not_reported() {
        let (tx, mut rx) = mpsc::channel(4);
        report_usage(&Usage::default(), &tx).await;
        report_usage(
            &Usage {
                input_tokens: 12,
                output_tokens: 3,
            },
            &tx,
        )
        .await;
        drop(tx);

        assert!(matches!(
            rx.recv().await,
            Some(AgentEvent::Usage { input_tokens: 12, output_tokens: 3 })
        ));
        assert!(rx.recv().await.is_none());
    }
}
