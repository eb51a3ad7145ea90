use serde_json::Value;

/// Progress of a submission while it is being answered. Sends are
/// best-effort: a dropped receiver never fails the submission.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    TextDelta(String),
    ThinkingDelta(String),
    ToolCallStart {
        id: String,
        name: String,
        arguments: Value,
    },
    ToolCallResult {
        id: String,
        content: String,
        is_error: bool,
        /// Structured details from the tool, not shown to the model.
        metadata: Option<Value>,
    },
    /// Token counts reported by the provider for one model call.
    Usage {
        input_tokens: usize,
        output_tokens: usize,
    },
}
