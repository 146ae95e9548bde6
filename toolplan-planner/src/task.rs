//! One-shot entry point: build an executor, ask `plan`, clean up.

use std::sync::Arc;

use futures::FutureExt;
use serde_json::json;
use thiserror::Error;
use toolplan_primitives::{CallContext, Config};
use toolplan_tools::{CapabilityRegistry, Executor, Phase, ToolError, ToolResult, run_scoped};
use tracing::{info, warn};

use crate::capability::NAME as PLAN;

/// Successful task run.
#[derive(Debug)]
pub struct TaskReport {
    /// Synthesized answer.
    pub answer: String,
    /// Outcome of releasing the task's resources.
    pub cleanup: ToolResult<()>,
}

/// Failed task run.
#[derive(Debug, Error)]
#[error("task failed during {phase}: {source}")]
pub struct TaskError {
    /// Phase the failure happened in.
    pub phase: Phase,
    /// Underlying failure.
    #[source]
    pub source: ToolError,
    /// Outcome of releasing the task's resources.
    pub cleanup: ToolResult<()>,
}

/// Answers `query` with the `plan` capability of a fresh executor.
///
/// `whitelist` restricts the executor; when given it must name `plan`. The
/// executor is always cleaned up, and the cleanup result is reported next to
/// the task result.
///
/// # Errors
///
/// Returns [`TaskError`] naming the phase that failed.
pub async fn run_task(
    registry: Arc<CapabilityRegistry>,
    config: &Config,
    whitelist: Option<Vec<String>>,
    query: &str,
    ctx: &CallContext,
) -> Result<TaskReport, TaskError> {
    let executor = Executor::builder(registry)
        .maybe_whitelist(whitelist)
        .build(ctx, config)
        .await
        .map_err(|source| TaskError {
            phase: Phase::Build,
            source,
            cleanup: Ok(()),
        })?;

    let arguments = json!({ "query": query }).to_string();
    let call_ctx = ctx.clone();
    let (result, cleanup) = run_scoped(executor, move |executor| {
        async move { executor.call_tool(&call_ctx, PLAN, &arguments).await }.boxed()
    })
    .await
    .into_parts();

    if let Err(err) = &cleanup {
        warn!(task_id = %ctx.task_id(), error = %err, "task cleanup failed");
    }
    match result {
        Ok(answer) => {
            info!(task_id = %ctx.task_id(), "task finished");
            Ok(TaskReport { answer, cleanup })
        }
        Err(source) => Err(TaskError {
            phase: source.phase().unwrap_or(Phase::Call),
            source,
            cleanup,
        }),
    }
}
