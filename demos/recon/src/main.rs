//! Reconnaissance demo: inspect the built-in tools, call one directly, or let
//! the planner chain them to answer a question.
//!
//! ```text
//! recon tools
//! recon call dig '{"domain":"example.com"}'
//! recon chat --whitelist dig,internetdb "what does internetdb know about example.com?"
//! recon ask --whitelist plan,dig,nmap "which ports are open on example.com?"
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures::FutureExt;
use toolplan::adapters::{ModelAdapter, from_settings};
use toolplan::planner::{ask_with_tools, run_task};
use toolplan::primitives::{CallContext, Config};
use toolplan::tools::{
    CapabilityRegistry, Executor, RegistryBuilder, ToolResult, builtin, run_scoped,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "recon", about = "Tool orchestration demo")]
struct Cli {
    /// `.env` file to load instead of `./.env`.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Restrict the executor to these tools (comma-separated).
    #[arg(long, global = true, value_delimiter = ',')]
    whitelist: Vec<String>,

    /// Give up after this many seconds.
    #[arg(long, global = true, default_value_t = 300)]
    timeout: u64,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = toolplan::telemetry::DEFAULT_LEVEL)]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the tools an executor would expose.
    Tools,
    /// Call one tool with JSON arguments.
    Call {
        /// Tool name.
        tool: String,
        /// JSON arguments.
        #[arg(default_value = "{}")]
        arguments: String,
    },
    /// Let the model call tools directly in a single turn.
    Chat {
        /// The request, in natural language.
        query: String,
    },
    /// Answer a question with the `plan` capability.
    Ask {
        /// The task, in natural language.
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    toolplan::telemetry::init(&cli.log)?;

    let config = toolplan::config::load(cli.env_file.as_deref())?;
    let model = match from_settings(config.model()) {
        Ok(adapter) => Some(adapter),
        Err(err) => {
            warn!(error = %err, "model not configured, `plan` and `chat` are unavailable");
            None
        }
    };
    let registry = registry(model.clone());
    let whitelist = (!cli.whitelist.is_empty()).then(|| cli.whitelist.clone());
    let ctx = CallContext::new().with_timeout(Duration::from_secs(cli.timeout));

    match cli.command {
        Command::Tools => list_tools(registry, &config, whitelist, &ctx).await,
        Command::Call { tool, arguments } => {
            call(registry, &config, whitelist, &ctx, tool, arguments).await
        }
        Command::Chat { query } => {
            let model = model.context("`chat` needs a configured model")?;
            chat(registry, &config, whitelist, &ctx, model, query).await
        }
        Command::Ask { query } => ask(registry, &config, whitelist, &ctx, &query).await,
    }
}

fn registry(model: Option<Arc<dyn ModelAdapter>>) -> Arc<CapabilityRegistry> {
    let mut builder = RegistryBuilder::new();
    builtin::register_all(&mut builder);
    if let Some(adapter) = model {
        toolplan::planner::register(&mut builder, adapter);
    }
    builder.freeze()
}

async fn executor(
    registry: Arc<CapabilityRegistry>,
    config: &Config,
    whitelist: Option<Vec<String>>,
    ctx: &CallContext,
) -> Result<Executor> {
    Executor::builder(registry)
        .maybe_whitelist(whitelist)
        .build(ctx, config)
        .await
        .context("failed to build the executor")
}

async fn list_tools(
    registry: Arc<CapabilityRegistry>,
    config: &Config,
    whitelist: Option<Vec<String>>,
    ctx: &CallContext,
) -> Result<()> {
    let executor = executor(registry, config, whitelist, ctx).await?;
    let (specs, cleanup) = run_scoped(executor, |executor| {
        let specs = executor.tool_specs();
        async move { Ok(specs) }.boxed()
    })
    .await
    .into_parts();

    for spec in specs? {
        println!("{}\n    {}\n    {}", spec.name, spec.description, spec.parameters);
    }
    cleanup.context("cleanup failed")
}

async fn call(
    registry: Arc<CapabilityRegistry>,
    config: &Config,
    whitelist: Option<Vec<String>>,
    ctx: &CallContext,
    tool: String,
    arguments: String,
) -> Result<()> {
    let executor = executor(registry, config, whitelist, ctx).await?;
    let call_ctx = ctx.clone();
    let name = tool.clone();
    let (result, cleanup) = run_scoped(executor, move |executor| {
        async move { executor.call_tool(&call_ctx, &name, &arguments).await }.boxed()
    })
    .await
    .into_parts();

    report(result.with_context(|| format!("`{tool}` failed")), cleanup)
}

async fn chat(
    registry: Arc<CapabilityRegistry>,
    config: &Config,
    whitelist: Option<Vec<String>>,
    ctx: &CallContext,
    model: Arc<dyn ModelAdapter>,
    query: String,
) -> Result<()> {
    // `plan` is reached through `ask`; here the model calls tools itself.
    let executor = Executor::builder(registry)
        .maybe_whitelist(whitelist)
        .exclude(["plan"])
        .build(ctx, config)
        .await
        .context("failed to build the executor")?;
    let call_ctx = ctx.clone();
    let (result, cleanup) = run_scoped(executor, move |executor| {
        async move { ask_with_tools(&call_ctx, model.as_ref(), executor, &query).await }.boxed()
    })
    .await
    .into_parts();

    report(result.context("chat failed"), cleanup)
}

fn report(result: Result<String>, cleanup: ToolResult<()>) -> Result<()> {
    if let Err(err) = &cleanup {
        warn!(error = %err, "cleanup failed");
    }
    let output = result?;
    println!("{output}");
    cleanup.context("cleanup failed")
}
async fn ask(
    registry: Arc<CapabilityRegistry>,
    config: &Config,
    whitelist: Option<Vec<String>>,
    ctx: &CallContext,
    query: &str,
) -> Result<()> {
    if let Some(names) = &whitelist {
        if !names.iter().any(|name| name == "plan") {
            bail!("`ask` needs `plan` in the whitelist");
        }
    }

    match run_task(registry, config, whitelist, query, ctx).await {
        Ok(report) => {
            println!("{}", report.answer);
            if let Err(err) = report.cleanup {
                warn!(error = %err, "cleanup failed");
            }
            info!("done");
            Ok(())
        }
        Err(err) => {
            if let Err(cleanup) = &err.cleanup {
                warn!(error = %cleanup, "cleanup failed");
            }
            Err(err).context("task failed")
        }
    }
}
