//! Reply bodies. A non-streaming completion and a stream chunk share one
//! shape: `choices[].message` there is `choices[].delta` here.

use crate::provider::types::ToolCallEvent;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Completion {
    pub choices: Vec<Choice>,
    pub usage: Option<WireUsage>,
    /// Groq reports streaming usage under `x_groq.usage` on the last chunk.
    pub x_groq: Option<GroqExtra>,
    /// Mid-stream failure reported in-band.
    pub error: Option<WireError>,
}

impl Completion {
    pub fn take_usage(&mut self) -> Option<WireUsage> {
        self.usage
            .take()
            .or_else(|| self.x_groq.as_mut().and_then(|x| x.usage.take()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GroqExtra {
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WireError {
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WireUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Choice {
    #[serde(alias = "delta")]
    pub message: ReplyBody,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReplyBody {
    pub content: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub tool_calls: Vec<ToolCallPart>,
    pub reasoning_content: Option<String>,
    /// Groq's field for reasoning models.
    pub reasoning: Option<String>,
}

impl ReplyBody {
    pub fn take_reasoning(&mut self) -> Option<String> {
        self.reasoning_content
            .take()
            .or_else(|| self.reasoning.take())
            .filter(|r| !r.is_empty())
    }

    pub fn take_text(&mut self) -> Option<String> {
        self.content.take().filter(|t| !t.is_empty())
    }
}

/// A whole tool call, or a fragment of one when streaming.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ToolCallPart {
    /// Ties stream fragments of one call together. Absent outside streams.
    pub index: usize,
    pub id: Option<String>,
    pub function: Option<FunctionPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FunctionPart {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Joins tool call parts by index into complete calls.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    pending: BTreeMap<usize, PendingCall>,
}

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl ToolCallAssembler {
    pub fn push(&mut self, part: ToolCallPart) {
        let call = self.pending.entry(part.index).or_default();
        if part.id.is_some() {
            call.id = part.id;
        }
        if let Some(function) = part.function {
            if function.name.is_some() {
                call.name = function.name;
            }
            if let Some(arguments) = function.arguments {
                call.arguments.push_str(&arguments);
            }
        }
    }

    /// Drain finished calls in index order. Calls that never got an id or a
    /// name are dropped.
    pub fn finish(&mut self) -> Vec<ToolCallEvent> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .filter_map(|(index, call)| {
                let (Some(id), Some(name)) = (call.id, call.name) else {
                    tracing::warn!(index, "Dropping tool call without id or name");
                    return None;
                };
                let arguments = parse_arguments(&name, &call.arguments);
                Some(ToolCallEvent {
                    id,
                    name,
                    arguments,
                })
            })
            .collect()
    }
}

/// Decode JSON tool arguments. Blank means `{}`; garbage becomes `null`
/// so the tool reports the bad arguments back to the model.
pub fn parse_arguments(tool: &str, raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(raw)
        .inspect_err(|e| tracing::warn!(%tool, "Malformed tool arguments: {e}"))
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_groq_completion() {
        let json = r#"{
            "id": "chatcmpl-f51b2cd2",
            "object": "chat.completion",
            "model": "llama-3.1-8b-instant",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Final Answer: 84"},
                "logprobs": null,
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 18, "completion_tokens": 6, "total_tokens": 24},
            "x_groq": {"id": "req_01"}
        }"#;

        let mut reply: Completion = serde_json::from_str(json).unwrap();
        assert_eq!(reply.take_usage().unwrap().completion_tokens, 6);
        let body = &mut reply.choices[0].message;
        assert_eq!(body.take_text().as_deref(), Some("Final Answer: 84"));
        assert!(body.tool_calls.is_empty());
    }

    #[test]
    fn test_null_content_and_tool_calls() {
        let json = r#"{"choices": [{"message": {
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_d5wg",
                "type": "function",
                "function": {"name": "wikipedia_search", "arguments": "{\"query\": \"golden ratio\"}"}
            }]
        }, "finish_reason": "tool_calls"}]}"#;

        let mut reply: Completion = serde_json::from_str(json).unwrap();
        let body = &mut reply.choices[0].message;
        assert!(body.take_text().is_none());

        let mut calls = ToolCallAssembler::default();
        for part in std::mem::take(&mut body.tool_calls) {
            calls.push(part);
        }
        let calls = calls.finish();
        assert_eq!(calls[0].name, "wikipedia_search");
        assert_eq!(calls[0].arguments, json!({"query": "golden ratio"}));

        let reply: Completion =
            serde_json::from_str(r#"{"choices": [{"message": {"tool_calls": null}}]}"#).unwrap();
        assert!(reply.choices[0].message.tool_calls.is_empty());
    }

    #[test]
    fn test_stream_fragments_assemble() {
        let chunks = [
            r#"{"choices": [{"delta": {"tool_calls": [{"index": 0, "id": "call_1", "type": "function", "function": {"name": "wikipedia_search", "arguments": ""}}]}}]}"#,
            r#"{"choices": [{"delta": {"tool_calls": [{"index": 1, "id": "call_2", "function": {"name": "wikipedia_search"}}]}}]}"#,
            r#"{"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "{\"query\":\"e\"}"}}]}}]}"#,
        ];

        let mut calls = ToolCallAssembler::default();
        for chunk in chunks {
            let reply: Completion = serde_json::from_str(chunk).unwrap();
            for choice in reply.choices {
                choice.message.tool_calls.into_iter().for_each(|p| calls.push(p));
            }
        }

        let calls = calls.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].arguments, json!({"query": "e"}));
        assert_eq!(calls[1].arguments, json!({}));
    }

    #[test]
    fn test_nameless_call_is_dropped() {
        let mut calls = ToolCallAssembler::default();
        calls.push(ToolCallPart {
            index: 0,
            id: Some("call_1".into()),
            function: None,
        });
        assert!(calls.finish().is_empty());
    }

    #[test]
    fn test_groq_stream_usage() {
        let json = r#"{
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
            "x_groq": {"id": "req_1", "usage": {"prompt_tokens": 40, "completion_tokens": 12}}
        }"#;

        let mut chunk: Completion = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.take_usage().unwrap().prompt_tokens, 40);
        assert!(chunk.take_usage().is_none());
        assert_eq!(chunk.choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_error_frame() {
        let json = r#"{"error": {"message": "model overloaded", "type": "server_error"}}"#;
        let chunk: Completion = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.error.unwrap().message, "model overloaded");
        assert!(chunk.choices.is_empty());
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments("t", r#"{"query":"pi"}"#), json!({"query": "pi"}));
        assert_eq!(parse_arguments("t", "  "), json!({}));
        assert!(parse_arguments("t", "{broken").is_null());
    }
}
