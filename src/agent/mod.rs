mod events;
mod stream;
mod tools;

pub use events::AgentEvent;

use crate::provider::{ChatRequest, Connect, Message, Role};
use crate::session::{Answerer, Credential, SessionError};
use crate::tool::ToolRegistry;
use async_trait::async_trait;
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are MathGPT, a careful math assistant. Work through arithmetic, algebra, \
calculus, and word problems step by step, showing the intermediate results.

- Do the calculations yourself. Double-check every arithmetic step.
- Use the `wikipedia_search` tool only for facts you cannot derive: named constants, \
formulas, definitions, or the history of a result.
- If a question is ambiguous, state the interpretation you chose.
- End every reply with a line of the form `Final Answer: <answer>`.";

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 6;

/// Tool-calling agent over an OpenAI-compatible chat API.
///
/// Each submission connects with the caller's credential, then alternates
/// model calls and tool execution until the model answers without
/// requesting tools.
#[derive(Clone)]
pub struct Agent {
    connector: Arc<dyn Connect>,
    tools: Arc<ToolRegistry>,
    model: String,
    system_prompt: String,
    max_tool_rounds: usize,
    streaming: bool,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl Agent {
    pub fn new(
        connector: Arc<dyn Connect>,
        tools: Arc<ToolRegistry>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            tools,
            model: model.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            streaming: true,
            max_tokens: None,
            temperature: None,
        }
    }

    /// Set a custom system prompt (overrides default).
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    #[must_use]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    #[must_use]
    pub fn with_sampling(mut self, max_tokens: Option<u32>, temperature: Option<f32>) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    fn request(&self, messages: &[Message]) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: Arc::new(messages.to_vec()),
            system: (!self.system_prompt.is_empty())
                .then(|| Cow::Owned(self.system_prompt.clone())),
            tools: Arc::new(self.tools.definitions()),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl Answerer for Agent {
    async fn answer(
        &self,
        session_id: &str,
        history: Vec<Message>,
        credential: &Credential,
        observer: Option<mpsc::Sender<AgentEvent>>,
    ) -> Result<Vec<Message>, SessionError> {
        if self.max_tool_rounds == 0 {
            return Err(SessionError::Config(
                "max_tool_rounds must be at least 1".to_string(),
            ));
        }

        let provider = self.connector.connect(credential.expose());
        // Sends to a closed channel are ignored, so no observer means no receiver
        let tx = observer.unwrap_or_else(|| mpsc::channel(1).0);

        let mut messages = history;
        let first_reply = messages.len();

        for round in 1..=self.max_tool_rounds {
            debug!(session = %session_id, round, model = %self.model, "Model call");
            let request = self.request(&messages);
            let reply = stream::respond(&provider, &request, &tx, self.streaming).await?;

            messages.push(Message {
                role: Role::Assistant,
                content: Arc::new(reply.blocks),
            });

            if reply.tool_calls.is_empty() {
                return Ok(messages.split_off(first_reply));
            }

            let tool_results =
                tools::execute_tools_parallel(&self.tools, session_id, reply.tool_calls, &tx).await?;

            messages.push(Message {
                role: Role::ToolResult,
                content: Arc::new(tool_results),
            });
        }

        Err(SessionError::MalformedResponse(format!(
            "no final answer after {} tool rounds",
            self.max_tool_rounds
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{self, ContentBlock, LlmApi, StreamEvent, ToolCallEvent};
    use crate::tool::{Tool, ToolContext, ToolError, ToolResult};
    use serde_json::json;
    use std::sync::Mutex;

    /// Plays back one scripted response per call and records requests.
    struct ScriptedApi {
        responses: Mutex<Vec<Result<Message, provider::Error>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedApi {
        fn new(mut responses: Vec<Result<Message, provider::Error>>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn next(&self, request: ChatRequest) -> Result<Message, provider::Error> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(provider::Error::InvalidResponse("script exhausted".into())))
        }
    }

    #[async_trait]
    impl LlmApi for ScriptedApi {
        fn id(&self) -> &str {
            "scripted"
        }

        async fn stream(
            &self,
            request: ChatRequest,
            tx: mpsc::Sender<StreamEvent>,
        ) -> Result<(), provider::Error> {
            let message = self.next(request)?;
            for block in message.content.iter() {
                let event = match block {
                    ContentBlock::Text { text } => StreamEvent::TextDelta(text.clone()),
                    ContentBlock::ToolCall {
                        id,
                        name,
                        arguments,
                    } => StreamEvent::ToolCall(ToolCallEvent {
                        id: id.clone(),
                        name: name.clone(),
                        arguments: arguments.clone(),
                    }),
                    _ => continue,
                };
                let _ = tx.send(event).await;
            }
            let _ = tx.send(StreamEvent::Done).await;
            Ok(())
        }

        async fn complete(&self, request: ChatRequest) -> Result<Message, provider::Error> {
            self.next(request)
        }
    }

    struct ScriptedConnect {
        api: Arc<ScriptedApi>,
        keys: Mutex<Vec<String>>,
    }

    impl Connect for ScriptedConnect {
        fn connect(&self, api_key: &str) -> Arc<dyn LlmApi> {
            self.keys.lock().unwrap().push(api_key.to_string());
            self.api.clone()
        }
    }

    struct ConstantsTool;

    #[async_trait]
    impl Tool for ConstantsTool {
        fn name(&self) -> &str {
            "wikipedia_search"
        }
        fn description(&self) -> &str {
            "Look up a constant"
        }
        fn parameters(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]})
        }
        async fn execute(
            &self,
            args: serde_json::Value,
            _: &ToolContext,
        ) -> Result<ToolResult, ToolError> {
            let query = args["query"].as_str().unwrap_or_default();
            Ok(ToolResult::text(format!("Page: {query}\nSummary: 3.14159")))
        }
    }

    fn tool_call_message(query: &str) -> Message {
        Message {
            role: Role::Assistant,
            content: Arc::new(vec![ContentBlock::ToolCall {
                id: "call_1".into(),
                name: "wikipedia_search".into(),
                arguments: json!({"query": query}),
            }]),
        }
    }

    fn build_agent(api: &Arc<ScriptedApi>) -> (Agent, Arc<ScriptedConnect>) {
        let connect = Arc::new(ScriptedConnect {
            api: api.clone(),
            keys: Mutex::new(Vec::new()),
        });
        let mut registry = ToolRegistry::new();
        registry.register_tool(Box::new(ConstantsTool));
        let agent = Agent::new(connect.clone(), Arc::new(registry), "llama-3.1-8b-instant");
        (agent, connect)
    }

    fn history(text: &str) -> Vec<Message> {
        vec![Message::text(Role::User, text)]
    }

    fn key() -> Credential {
        Credential::new("gsk_test").unwrap()
    }

    #[tokio::test]
    async fn test_plain_answer() {
        let api = ScriptedApi::new(vec![Ok(Message::text(Role::Assistant, "Final Answer: 4"))]);
        let (agent, connect) = build_agent(&api);

        let replies = agent.answer("s", history("2+2"), &key(), None).await.unwrap();

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].text_content(), "Final Answer: 4");
        assert_eq!(*connect.keys.lock().unwrap(), vec!["gsk_test".to_string()]);

        let requests = api.requests.lock().unwrap();
        assert_eq!(requests[0].model, "llama-3.1-8b-instant");
        assert_eq!(requests[0].system.as_deref(), Some(DEFAULT_SYSTEM_PROMPT));
        assert_eq!(requests[0].tools.len(), 1);
        assert_eq!(requests[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn test_tool_round_trip() {
        let api = ScriptedApi::new(vec![
            Ok(tool_call_message("Pi")),
            Ok(Message::text(Role::Assistant, "Final Answer: 3.14159")),
        ]);
        let (agent, _) = build_agent(&api);
        let (tx, mut rx) = mpsc::channel(32);

        let replies = agent
            .answer("s", history("What is pi?"), &key(), Some(tx))
            .await
            .unwrap();

        let roles: Vec<_> = replies.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::ToolResult, Role::Assistant]);
        assert_eq!(replies[2].text_content(), "Final Answer: 3.14159");

        // Second request carries the tool call and its result
        let requests = api.requests.lock().unwrap();
        assert_eq!(requests[1].messages.len(), 3);

        let mut saw_start = false;
        let mut saw_result = false;
        while let Some(event) = rx.recv().await {
            match event {
                AgentEvent::ToolCallStart { name, .. } => saw_start = name == "wikipedia_search",
                AgentEvent::ToolCallResult {
                    content, is_error, ..
                } => {
                    saw_result = content.starts_with("Page: Pi") && !is_error;
                }
                _ => {}
            }
        }
        assert!(saw_start && saw_result);
    }

    #[tokio::test]
    async fn test_non_streaming_path() {
        let api = ScriptedApi::new(vec![
            Ok(tool_call_message("e")),
            Ok(Message::text(Role::Assistant, "Final Answer: 2.71828")),
        ]);
        let (agent, _) = build_agent(&api);
        let agent = agent.with_streaming(false);

        let replies = agent.answer("s", history("e?"), &key(), None).await.unwrap();
        assert_eq!(replies.len(), 3);
    }

    #[tokio::test]
    async fn test_tool_rounds_are_capped() {
        let api = ScriptedApi::new(vec![
            Ok(tool_call_message("Pi")),
            Ok(tool_call_message("Pi")),
        ]);
        let (agent, _) = build_agent(&api);
        let agent = agent.with_max_tool_rounds(2);

        let err = agent.answer("s", history("loop"), &key(), None).await.unwrap_err();
        assert!(matches!(err, SessionError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_zero_rounds_is_config_error() {
        let api = ScriptedApi::new(vec![]);
        let (agent, _) = build_agent(&api);
        let err = agent
            .with_max_tool_rounds(0)
            .answer("s", history("2+2"), &key(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
        assert!(api.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_errors_are_classified() {
        let api = ScriptedApi::new(vec![Err(provider::Error::RateLimited {
            retry_after: Some(5),
        })]);
        let (agent, _) = build_agent(&api);
        let err = agent.answer("s", history("2+2"), &key(), None).await.unwrap_err();
        assert!(matches!(err, SessionError::RateLimited { retry_after: Some(5) }));

        let api = ScriptedApi::new(vec![Err(provider::Error::Api(
            "HTTP 401 Unauthorized: bad key".into(),
        ))]);
        let (agent, _) = build_agent(&api);
        let err = agent
            .with_streaming(false)
            .answer("s", history("2+2"), &key(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Api(_)));
    }
}
