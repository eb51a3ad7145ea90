//! `/chat/completions` request bodies, borrowed from a [`ChatRequest`].

use super::quirks::{ProviderQuirks, TokenField};
use crate::provider::types::{ChatRequest, ContentBlock, Message, Role, ToolDefinition};
use serde::Serialize;
use std::borrow::Cow;

#[derive(Debug, Serialize)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
pub struct StreamOptions {
    pub include_usage: bool,
}

#[derive(Debug, Serialize)]
pub struct WireMessage<'a> {
    pub role: &'static str,
    /// `null` only for assistant turns that carry tool calls.
    pub content: Option<Cow<'a, str>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct WireToolCall<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: WireFunctionCall<'a>,
}

#[derive(Debug, Serialize)]
pub struct WireFunctionCall<'a> {
    pub name: &'a str,
    /// The API takes the arguments object JSON-encoded as a string.
    pub arguments: String,
}

#[derive(Debug, Serialize)]
pub struct WireTool<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: &'a ToolDefinition,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(request: &'a ChatRequest, quirks: &ProviderQuirks, stream: bool) -> Self {
        let (max_tokens, max_completion_tokens) = match quirks.token_field {
            TokenField::MaxTokens => (request.max_tokens, None),
            TokenField::MaxCompletionTokens => (None, request.max_tokens),
        };

        Self {
            model: &request.model,
            messages: wire_messages(request, quirks.system_role),
            tools: request
                .tools
                .iter()
                .map(|function| WireTool {
                    kind: "function",
                    function,
                })
                .collect(),
            max_tokens,
            max_completion_tokens,
            temperature: request.temperature,
            stream,
            stream_options: (stream && quirks.stream_usage).then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }
}

impl<'a> WireMessage<'a> {
    fn text(role: &'static str, content: impl Into<Cow<'a, str>>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

fn wire_messages<'a>(request: &'a ChatRequest, system_role: &'static str) -> Vec<WireMessage<'a>> {
    let mut out = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = request.system.as_deref() {
        out.push(WireMessage::text(system_role, system));
    }

    for msg in request.messages.iter() {
        match msg.role {
            Role::System => {
                let text = msg.text_content();
                if !text.is_empty() {
                    out.push(WireMessage::text(system_role, text));
                }
            }
            Role::User => out.push(WireMessage::text("user", msg.text_content())),
            Role::Assistant => out.push(assistant_message(msg)),
            Role::ToolResult => out.extend(tool_messages(msg)),
        }
    }

    out
}

/// Text and tool calls of an assistant turn. Reasoning is not replayed.
fn assistant_message(msg: &Message) -> WireMessage<'_> {
    let tool_calls: Vec<_> = msg
        .tool_calls()
        .map(|(id, name, arguments)| WireToolCall {
            id,
            kind: "function",
            function: WireFunctionCall {
                name,
                arguments: arguments.to_string(),
            },
        })
        .collect();
    let text = msg.text_content();

    WireMessage {
        role: "assistant",
        content: (!text.is_empty() || tool_calls.is_empty()).then_some(Cow::Owned(text)),
        tool_calls,
        tool_call_id: None,
    }
}

/// One `tool` message per result block.
fn tool_messages(msg: &Message) -> impl Iterator<Item = WireMessage<'_>> {
    msg.content.iter().filter_map(|block| match block {
        ContentBlock::ToolResult {
            tool_call_id,
            content,
            is_error,
        } => Some(WireMessage {
            role: "tool",
            content: Some(if *is_error {
                Cow::Owned(format!("[ERROR] {content}"))
            } else {
                Cow::Borrowed(content.as_str())
            }),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.as_str()),
        }),
        _ => None,
    })
}
