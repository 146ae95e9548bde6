//! Per-task executor: whitelisted tool set, validated dispatch, and cleanup.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use toolplan_primitives::{CallContext, Config, ToolCall, ToolSpec};
use tracing::{debug, warn};

use crate::descriptor::{CleanupHook, ToolDescriptor};
use crate::error::{ToolError, ToolResult};
use crate::registry::{BuildContext, CapabilityRegistry};
use crate::schema::{CompiledSchema, parse_arguments};

struct ActiveTool {
    descriptor: ToolDescriptor,
    schema: CompiledSchema,
}

/// Configures and builds an [`Executor`].
#[derive(Debug)]
pub struct ExecutorBuilder {
    registry: Arc<CapabilityRegistry>,
    whitelist: Option<Vec<String>>,
    excluded: Vec<String>,
}

impl ExecutorBuilder {
    /// Restricts the executor to the named tools.
    #[must_use]
    pub fn whitelist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !list.contains(&name) {
                list.push(name);
            }
        }
        self.whitelist = Some(list);
        self
    }

    /// Restricts the executor when `names` is `Some`.
    #[must_use]
    pub fn maybe_whitelist(self, names: Option<Vec<String>>) -> Self {
        match names {
            Some(names) => self.whitelist(names),
            None => self,
        }
    }

    /// Drops the named tools even when no whitelist is set. Used to keep a
    /// capability out of executors it builds for itself.
    #[must_use]
    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded.extend(names.into_iter().map(Into::into));
        self
    }

    /// Builds every capability, then keeps only whitelisted tools.
    ///
    /// Resources held by built tools that the whitelist drops are released
    /// before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Config`] when a factory fails, a whitelisted name
    /// was not built, or a schema does not compile.
    pub async fn build(self, ctx: &CallContext, config: &Config) -> ToolResult<Executor> {
        let build_ctx = BuildContext::new(
            Arc::clone(&self.registry),
            self.whitelist.clone(),
            ctx.clone(),
        );
        let built = self.registry.build(&build_ctx, config)?;

        let (kept, dropped): (Vec<_>, Vec<_>) = built.into_iter().partition(|descriptor| {
            let name = descriptor.name();
            let allowed = self
                .whitelist
                .as_ref()
                .is_none_or(|names| names.iter().any(|listed| listed == name));
            allowed && !self.excluded.iter().any(|excluded| excluded == name)
        });

        release_all(&dropped).await;

        if let Some(names) = &self.whitelist {
            if let Some(missing) = names
                .iter()
                .find(|name| !kept.iter().any(|descriptor| descriptor.name() == name.as_str()))
            {
                release_all(&kept).await;
                return Err(ToolError::config(
                    missing.as_str(),
                    "whitelisted tool is not registered or was disabled",
                ));
            }
        }

        let mut tools = Vec::with_capacity(kept.len());
        let mut hooks = Vec::new();
        for descriptor in &kept {
            if let Some(hook) = descriptor.cleanup_hook() {
                hooks.push((descriptor.name().to_owned(), Arc::clone(hook)));
            }
        }
        for descriptor in kept {
            let schema = match CompiledSchema::compile(descriptor.name(), descriptor.metadata().schema()) {
                Ok(schema) => schema,
                Err(err) => {
                    release_hooks(&hooks).await;
                    return Err(err);
                }
            };
            tools.push(ActiveTool { descriptor, schema });
        }

        let index = tools
            .iter()
            .enumerate()
            .map(|(position, tool)| (tool.descriptor.name().to_owned(), position))
            .collect();

        let executor = Executor {
            tools,
            index,
            hooks,
            released: false,
        };
        debug!(
            task_id = %ctx.task_id(),
            tools = ?executor.tool_names(),
            "executor built"
        );
        Ok(executor)
    }
}

/// Active tool set of one task.
///
/// Owned by whoever built it. Release its resources with
/// [`Executor::cleanup`] or run work through [`run_scoped`].
pub struct Executor {
    tools: Vec<ActiveTool>,
    index: HashMap<String, usize>,
    hooks: Vec<(String, Arc<dyn CleanupHook>)>,
    released: bool,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("tools", &self.tool_names())
            .field("stateful", &self.hooks.len())
            .field("released", &self.released)
            .finish()
    }
}

impl Executor {
    /// Starts building an executor from `registry`.
    #[must_use]
    pub fn builder(registry: Arc<CapabilityRegistry>) -> ExecutorBuilder {
        ExecutorBuilder {
            registry,
            whitelist: None,
            excluded: Vec::new(),
        }
    }

    /// Lists active tool names in registration order.
    #[must_use]
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.descriptor.name()).collect()
    }

    /// Renders active tools as model-facing function definitions.
    #[must_use]
    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|tool| tool.descriptor.metadata().to_spec())
            .collect()
    }

    /// Returns `true` if `name` is in the active set.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Returns `true` once [`Executor::cleanup`] ran.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Calls the named tool with raw JSON argument text.
    ///
    /// Nothing is invoked unless the name resolves, the arguments parse and
    /// validate, and `ctx` is still live. An in-flight call is dropped as soon
    /// as `ctx` is cancelled or its deadline passes.
    ///
    /// # Errors
    ///
    /// [`ToolError::NotFound`], [`ToolError::Argument`],
    /// [`ToolError::Cancelled`], or whatever the tool returns.
    pub async fn call_tool(&self, ctx: &CallContext, name: &str, args: &str) -> ToolResult<String> {
        let tool = self.lookup(name)?;
        let input = parse_arguments(name, args)?;
        tool.schema.validate(name, &input)?;

        if self.released {
            return Err(ToolError::execution(format!(
                "executor was cleaned up before `{name}` was called"
            )));
        }
        if let Some(cause) = ctx.interruption() {
            return Err(ToolError::cancelled(name, cause));
        }

        debug!(task_id = %ctx.task_id(), tool = name, "tool call dispatched");
        let result = tokio::select! {
            cause = ctx.done() => Err(ToolError::cancelled(name, cause)),
            result = tool.descriptor.invoke(ctx.clone(), input) => result,
        };

        match &result {
            Ok(output) => debug!(tool = name, bytes = output.len(), "tool call finished"),
            Err(err) => debug!(tool = name, error = %err, "tool call failed"),
        }
        result
    }

    /// Runs model-emitted tool calls in order and joins their outputs with
    /// newlines.
    ///
    /// An empty list yields an empty string, telling the caller to use the
    /// model's own text instead.
    ///
    /// # Errors
    ///
    /// Returns the first failing call's error; later calls do not run.
    pub async fn process_tool_calls(&self, ctx: &CallContext, calls: &[ToolCall]) -> ToolResult<String> {
        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            outputs.push(self.call_tool(ctx, &call.name, &call.arguments).await?);
        }
        Ok(outputs.join("\n"))
    }

    /// Releases every resource held by active tools, newest first.
    ///
    /// Idempotent: once released, later calls return `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Cleanup`] listing every hook that failed. All hooks
    /// run regardless of earlier failures.
    pub async fn cleanup(&mut self) -> ToolResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let failures = release_hooks(&self.hooks).await;
        if failures.is_empty() {
            debug!(hooks = self.hooks.len(), "executor cleaned up");
            Ok(())
        } else {
            Err(ToolError::Cleanup { failures })
        }
    }

    fn lookup(&self, name: &str) -> ToolResult<&ActiveTool> {
        self.index
            .get(name)
            .map(|&position| &self.tools[position])
            .ok_or_else(|| ToolError::not_found(name))
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                tools = ?self.tool_names(),
                "executor dropped without cleanup"
            );
        }
    }
}

async fn release_hooks(hooks: &[(String, Arc<dyn CleanupHook>)]) -> Vec<String> {
    let mut failures = Vec::new();
    for (name, hook) in hooks.iter().rev() {
        if let Err(err) = hook.release().await {
            warn!(tool = %name, error = %err, "cleanup hook failed");
            failures.push(format!("{name}: {err}"));
        }
    }
    failures
}

async fn release_all(descriptors: &[ToolDescriptor]) {
    let hooks: Vec<_> = descriptors
        .iter()
        .filter_map(|descriptor| {
            descriptor
                .cleanup_hook()
                .map(|hook| (descriptor.name().to_owned(), Arc::clone(hook)))
        })
        .collect();
    release_hooks(&hooks).await;
}

/// Outcome of [`run_scoped`]: the task result next to the cleanup result.
#[derive(Debug)]
pub struct Scoped<T> {
    /// What the task produced.
    pub result: ToolResult<T>,
    /// Whether every resource was released.
    pub cleanup: ToolResult<()>,
}

impl<T> Scoped<T> {
    /// Splits the outcome into its two results.
    pub fn into_parts(self) -> (ToolResult<T>, ToolResult<()>) {
        (self.result, self.cleanup)
    }
}

/// Runs `task` against `executor` and always cleans the executor up
/// afterwards, including when the task fails or panics.
///
/// A panic inside `task` resumes only after cleanup finished.
pub async fn run_scoped<T, F>(mut executor: Executor, task: F) -> Scoped<T>
where
    F: for<'a> FnOnce(&'a Executor) -> BoxFuture<'a, ToolResult<T>>,
{
    let outcome = AssertUnwindSafe(async { task(&executor).await })
        .catch_unwind()
        .await;
    let cleanup = executor.cleanup().await;

    match outcome {
        Ok(result) => Scoped { result, cleanup },
        Err(panic) => {
            if let Err(err) = &cleanup {
                warn!(error = %err, "cleanup failed while unwinding");
            }
            std::panic::resume_unwind(panic)
        }
    }
}
