use crate::agent::AgentEvent;
use crate::provider::{self, ContentBlock, ToolCallEvent};
use crate::tool::{ToolContext, ToolRegistry, ToolResult};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Run one call, reporting its outcome to the observer. Tool failures are
/// returned to the model as error results rather than failing the turn.
async fn run_one(
    tools: &ToolRegistry,
    ctx: &ToolContext,
    call: ToolCallEvent,
    tx: &mpsc::Sender<AgentEvent>,
) -> ContentBlock {
    let result = match tools.call_tool(&call.name, call.arguments, ctx).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(session = %ctx.session_id, tool = %call.name, "Tool call failed: {e}");
            ToolResult {
                is_error: true,
                ..ToolResult::text(e.to_string())
            }
        }
    };
    if let Some(metadata) = &result.metadata {
        tracing::debug!(session = %ctx.session_id, tool = %call.name, %metadata, "Tool result");
    }
    let ToolResult {
        content,
        is_error,
        metadata,
    } = result;

    let _ = tx
        .send(AgentEvent::ToolCallResult {
            id: call.id.clone(),
            content: content.clone(),
            is_error,
            metadata,
        })
        .await;

    ContentBlock::ToolResult {
        tool_call_id: call.id,
        content,
        is_error,
    }
}

/// Run a round of tool calls concurrently. Results come back in the order
/// the model asked for them.
pub(crate) async fn execute_tools_parallel(
    tools: &Arc<ToolRegistry>,
    session_id: &str,
    tool_calls: Vec<ToolCallEvent>,
    tx: &mpsc::Sender<AgentEvent>,
) -> Result<Vec<ContentBlock>, provider::Error> {
    let ctx = ToolContext::new(session_id);
    let mut slots: Vec<Option<ContentBlock>> = vec![None; tool_calls.len()];
    let mut set = JoinSet::new();

    for (slot, call) in tool_calls.into_iter().enumerate() {
        let (tools, ctx, tx) = (Arc::clone(tools), ctx.clone(), tx.clone());
        set.spawn(async move { (slot, run_one(&tools, &ctx, call, &tx).await) });
    }

    while let Some(joined) = set.join_next().await {
        let (slot, block) = joined.map_err(|e| {
            let what = if e.is_panic() { "panicked" } else { "was cancelled" };
            provider::Error::Stream(format!("tool task {what}"))
        })?;
        slots[slot] = Some(block);
    }

    slots
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| provider::Error::InvalidResponse("missing tool results".into()))
}
