pub mod builtin;
pub mod types;

pub use types::*;

use crate::provider::ToolDefinition;
use std::collections::BTreeMap;

/// Named set of tools the model may call.
#[derive(Default)]
pub struct ToolRegistry {
    // Ordered so tool definitions are sent in a stable order
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tool(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub async fn call_tool(
        &self,
        name: &str,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(args, ctx).await
    }

    /// Definitions in the shape providers expect.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Registry with the reference-lookup tool.
    pub fn with_builtins(wikipedia: builtin::WikipediaOptions) -> Self {
        let mut registry = Self::new();
        registry.register_tool(Box::new(builtin::WikipediaTool::new(wikipedia)));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the query back"
        }
        fn parameters(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {"query": {"type": "string"}}})
        }
        async fn execute(
            &self,
            args: serde_json::Value,
            _: &ToolContext,
        ) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::text(args["query"].as_str().unwrap_or_default()))
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new("test")
    }

    #[tokio::test]
    async fn test_call_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(Box::new(EchoTool));

        let result = registry
            .call_tool("echo", json!({"query": "pi"}), &ctx())
            .await
            .unwrap();
        assert_eq!(result.content, "pi");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.call_tool("math_solver", json!({}), &ctx()).await;
        assert!(matches!(err, Err(ToolError::NotFound(name)) if name == "math_solver"));
    }

    #[test]
    fn test_builtin_definitions() {
        let registry = ToolRegistry::with_builtins(builtin::WikipediaOptions::default());
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "wikipedia_search");
        assert_eq!(defs[0].parameters["required"], json!(["query"]));
    }
}
