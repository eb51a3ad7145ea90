use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Per-call context handed to tools.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Session the call belongs to, for log correlation.
    pub session_id: String,
}

impl ToolContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }
}

/// What a tool hands back to the model.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    /// The model sees the content either way; this only marks it as a failure.
    pub is_error: bool,
    /// Structured details for logs and `stream-json` output. Never sent to
    /// the model.
    pub metadata: Option<Value>,
}

impl ToolResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema for the arguments object.
    fn parameters(&self) -> Value;

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError>;

    /// Function declaration sent with each request.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Tool failed: {0}")]
    ExecutionFailed(String),

    #[error("No such tool: {0}")]
    NotFound(String),
}
