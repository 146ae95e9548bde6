//! `plan`: exposes the [`Planner`] as a capability.
//!
//! Each invocation builds its own worker executor from the registry, runs the
//! planner against it through [`run_scoped`], and releases the workers before
//! returning. The worker set never contains `plan` itself and never reaches
//! past the whitelist of the executor that built `plan`.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::{Value, json};
use toolplan_adapters::ModelAdapter;
use toolplan_primitives::{CallContext, Config};
use toolplan_tools::schema::decode_args;
use toolplan_tools::{
    BuildContext, CapabilityRegistry, Executor, Phase, RegistryBuilder, Tool, ToolDescriptor,
    ToolError, ToolMetadata, ToolResult, run_scoped,
};
use tracing::{debug, warn};

use crate::parse::DEFAULT_MAX_STEPS;
use crate::planner::Planner;

/// Registered name.
pub const NAME: &str = "plan";
/// Option key: comma-separated worker tool names.
pub const WORKERS_OPTION: &str = "workers";
/// Option key: maximum steps per plan.
pub const MAX_STEPS_OPTION: &str = "max_steps";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanArgs {
    query: String,
}

/// Registers the capability under [`NAME`], planning with `adapter`.
pub fn register(builder: &mut RegistryBuilder, adapter: Arc<dyn ModelAdapter>) {
    builder.register(NAME, move |ctx: &BuildContext, config: &Config| {
        build(ctx, config, Arc::clone(&adapter))
    });
}

fn build(
    ctx: &BuildContext,
    config: &Config,
    adapter: Arc<dyn ModelAdapter>,
) -> ToolResult<Option<ToolDescriptor>> {
    if !config.is_enabled(NAME) {
        return Ok(None);
    }
    if ctx
        .whitelist()
        .is_some_and(|names| !names.iter().any(|name| name == NAME))
    {
        return Ok(None);
    }
    let settings = config.capability(NAME);
    let max_steps = settings
        .parsed_option::<usize>(MAX_STEPS_OPTION)
        .map_err(|err| ToolError::config(NAME, err.to_string()))?
        .unwrap_or(DEFAULT_MAX_STEPS);
    let workers = worker_names(settings.option(WORKERS_OPTION), ctx.whitelist())?;

    let metadata = ToolMetadata::new(
        NAME,
        "Plans and runs a sequence of tool calls to solve a task, then answers it. \
         Use for tasks that need several tools whose outputs feed each other.",
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "minLength": 1,
                    "description": "The task to solve, in natural language."
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    )?;

    let tool = PlanTool {
        registry: Arc::clone(ctx.registry()),
        config: config.clone(),
        workers,
        planner: Arc::new(Planner::with_max_steps(adapter, max_steps)?),
    };
    Ok(Some(ToolDescriptor::new(metadata, tool)))
}

/// Resolves the worker whitelist.
///
/// Without an outer whitelist the workers are the `workers` option, or every
/// other capability when it is unset. With one, the workers are the outer
/// whitelist minus `plan`, narrowed to the `workers` option when given.
fn worker_names(option: Option<&str>, outer: Option<&[String]>) -> ToolResult<Option<Vec<String>>> {
    let requested = option.map(parse_workers).transpose()?;

    let Some(outer) = outer else {
        return Ok(requested);
    };
    let allowed: Vec<String> = outer
        .iter()
        .filter(|name| name.as_str() != NAME)
        .filter(|name| {
            requested
                .as_ref()
                .is_none_or(|requested| requested.contains(*name))
        })
        .cloned()
        .collect();
    if allowed.is_empty() {
        return Err(ToolError::config(
            NAME,
            "the whitelist grants `plan` no worker tools",
        ));
    }
    if let Some(requested) = &requested {
        for name in requested.iter().filter(|name| !allowed.contains(*name)) {
            debug!(worker = %name, "worker is not whitelisted, skipping");
        }
    }
    Ok(Some(allowed))
}

fn parse_workers(option: &str) -> ToolResult<Vec<String>> {
    let names: Vec<String> = option
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect();
    if names.iter().any(|name| name == NAME) {
        return Err(ToolError::config(NAME, "`plan` cannot be one of its own workers"));
    }
    if names.is_empty() {
        return Err(ToolError::config(NAME, "`workers` lists no tools"));
    }
    Ok(names)
}

struct PlanTool {
    registry: Arc<CapabilityRegistry>,
    config: Config,
    workers: Option<Vec<String>>,
    planner: Arc<Planner>,
}

#[async_trait]
impl Tool for PlanTool {
    async fn invoke(&self, ctx: CallContext, input: Value) -> ToolResult<String> {
        let args: PlanArgs = decode_args(NAME, input)?;

        let workers = Executor::builder(Arc::clone(&self.registry))
            .maybe_whitelist(self.workers.clone())
            .exclude([NAME])
            .build(&ctx, &self.config)
            .await
            .map_err(|err| ToolError::in_phase(Phase::Build, err))?;

        let planner = Arc::clone(&self.planner);
        let query = args.query;
        let (result, cleanup) = run_scoped(workers, move |executor| {
            async move { planner.run(&ctx, executor, &query).await }.boxed()
        })
        .await
        .into_parts();

        match (result, cleanup) {
            (Ok(outcome), Ok(())) => Ok(outcome.answer),
            (Ok(outcome), Err(err)) => {
                warn!(error = %err, "worker cleanup failed after a successful plan");
                Ok(format!("{}\n\n[cleanup] {err}", outcome.answer))
            }
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(cleanup)) => {
                warn!(error = %cleanup, "worker cleanup failed after a failed plan");
                Err(err)
            }
        }
    }
}
