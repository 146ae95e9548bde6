//! Model calls bound to a [`CallContext`].

use toolplan_adapters::{AdapterError, InferenceOutput, InferenceRequest, ModelAdapter, collect_output};
use toolplan_primitives::CallContext;
use toolplan_tools::{ToolError, ToolResult};
use tracing::debug;

/// Sends `request` and drains the reply, giving up as soon as `ctx` fires.
///
/// `label` names the call in cancellation errors.
pub(crate) async fn infer(
    ctx: &CallContext,
    adapter: &dyn ModelAdapter,
    label: &str,
    request: InferenceRequest,
) -> ToolResult<InferenceOutput> {
    if let Some(cause) = ctx.interruption() {
        return Err(ToolError::cancelled(label, cause));
    }

    let call = async {
        let stream = adapter.infer(request).await?;
        Ok::<_, AdapterError>(collect_output(stream).await?)
    };
    let output = tokio::select! {
        cause = ctx.done() => return Err(ToolError::cancelled(label, cause)),
        output = call => output.map_err(|err| ToolError::execution(format!("model call failed: {err}")))?,
    };
    debug!(
        task_id = %ctx.task_id(),
        call = label,
        bytes = output.text.len(),
        tool_calls = output.tool_calls.len(),
        "model replied"
    );
    Ok(output)
}
