//! Plan, work, solve.

use std::collections::HashMap;
use std::sync::Arc;

use toolplan_adapters::{InferenceRequest, ModelAdapter, strip_think_tags};
use toolplan_primitives::CallContext;
use toolplan_tools::{Executor, Phase, ToolError, ToolResult};
use tracing::{debug, info};

use crate::lifecycle::{Lifecycle, PlannerEvent};
use crate::model;
use crate::parse::{DEFAULT_MAX_STEPS, PlanParser};
use crate::plan::{Plan, StepOutcome};
use crate::prompt::{self, PromptTemplate};

/// Answer and the executed plan behind it.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    /// Synthesized answer text.
    pub answer: String,
    /// Every step with its resolved arguments and output.
    pub plan: Plan,
}

/// Drives a model through plan, work and solve against an [`Executor`].
pub struct Planner {
    adapter: Arc<dyn ModelAdapter>,
    parser: PlanParser,
}

impl std::fmt::Debug for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("model", &self.adapter.metadata().model())
            .field("max_steps", &self.parser.max_steps())
            .finish()
    }
}

impl Planner {
    /// Creates a planner with the default step limit.
    ///
    /// # Errors
    ///
    /// See [`Planner::with_max_steps`].
    pub fn new(adapter: Arc<dyn ModelAdapter>) -> ToolResult<Self> {
        Self::with_max_steps(adapter, DEFAULT_MAX_STEPS)
    }

    /// Creates a planner accepting plans of at most `max_steps` steps.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Config`] if `max_steps` is zero.
    pub fn with_max_steps(adapter: Arc<dyn ModelAdapter>, max_steps: usize) -> ToolResult<Self> {
        Ok(Self {
            adapter,
            parser: PlanParser::new(max_steps)?,
        })
    }

    /// Answers `query` using the tools of `executor`.
    ///
    /// # Errors
    ///
    /// Every failure is wrapped in [`ToolError::Planner`] naming the phase it
    /// happened in. Step failures additionally carry [`ToolError::Step`].
    pub async fn run(&self, ctx: &CallContext, executor: &Executor, query: &str) -> ToolResult<PlanOutcome> {
        let mut lifecycle = Lifecycle::new(ctx.task_id());

        let mut plan = match self.plan(ctx, executor, query).await {
            Ok(plan) => plan,
            Err(err) => return Err(fail(&mut lifecycle, Phase::Plan, err)),
        };
        advance(&mut lifecycle, PlannerEvent::Planned)?;

        if let Err(err) = self.work(ctx, executor, &mut plan).await {
            return Err(fail(&mut lifecycle, Phase::Work, err));
        }
        advance(&mut lifecycle, PlannerEvent::Worked)?;

        let answer = match self.solve(ctx, query, &plan).await {
            Ok(answer) => answer,
            Err(err) => return Err(fail(&mut lifecycle, Phase::Solve, err)),
        };
        advance(&mut lifecycle, PlannerEvent::Solved)?;

        info!(task_id = %ctx.task_id(), steps = plan.len(), "plan completed");
        Ok(PlanOutcome { answer, plan })
    }

    async fn plan(&self, ctx: &CallContext, executor: &Executor, query: &str) -> ToolResult<Plan> {
        let tools = prompt::describe_tools(&executor.tool_specs());
        let text = self
            .complete(
                ctx,
                Phase::Plan,
                prompt::PLAN_SYSTEM,
                prompt::PLAN,
                &[("query", query), ("tools", &tools)],
            )
            .await?;
        let plan = self.parser.parse(&text)?;

        if let Some(step) = plan.steps().iter().find(|step| !executor.contains(step.tool())) {
            return Err(ToolError::not_found(step.tool()));
        }
        debug!(task_id = %ctx.task_id(), steps = plan.len(), "plan accepted");
        Ok(plan)
    }

    async fn work(&self, ctx: &CallContext, executor: &Executor, plan: &mut Plan) -> ToolResult<()> {
        let placeholders = self.parser.placeholders();
        let steps = plan.steps_mut();
        for index in 0..steps.len() {
            let (done, rest) = steps.split_at_mut(index);
            let step = &mut rest[0];
            let outputs: HashMap<&str, &str> = done
                .iter()
                .filter_map(|earlier| earlier.output().map(|output| (earlier.id(), output)))
                .collect();

            let resolved = placeholders
                .substitute(step.template(), &outputs)
                .and_then(|value| {
                    serde_json::to_string(&value)
                        .map_err(|err| ToolError::execution(format!("cannot encode arguments: {err}")))
                })
                .map_err(|err| ToolError::step(step.id(), step.tool(), err))?;
            step.set_resolved(resolved);

            debug!(task_id = %ctx.task_id(), step = step.id(), tool = step.tool(), "running step");
            let arguments = step.resolved().unwrap_or_default();
            let result = executor.call_tool(ctx, step.tool(), arguments).await;
            match result {
                Ok(output) => step.set_outcome(StepOutcome::Output(output)),
                Err(err) => {
                    step.set_outcome(StepOutcome::Failed(err.to_string()));
                    return Err(ToolError::step(step.id(), step.tool(), err));
                }
            }
        }
        Ok(())
    }

    async fn solve(&self, ctx: &CallContext, query: &str, plan: &Plan) -> ToolResult<String> {
        let evidence = plan.transcript();
        let text = self
            .complete(
                ctx,
                Phase::Solve,
                prompt::SOLVE_SYSTEM,
                prompt::SOLVE,
                &[("query", query), ("evidence", &evidence)],
            )
            .await?;
        let answer = strip_think_tags(&text);
        if answer.is_empty() {
            return Err(ToolError::execution("model returned an empty answer"));
        }
        Ok(answer)
    }

    async fn complete(
        &self,
        ctx: &CallContext,
        phase: Phase,
        system: &str,
        template: PromptTemplate,
        vars: &[(&str, &str)],
    ) -> ToolResult<String> {
        let content = template
            .render(vars)
            .map_err(|err| ToolError::config("plan", err.to_string()))?;
        let request = InferenceRequest::user(content).with_system_prompt(system);
        let output = model::infer(ctx, self.adapter.as_ref(), &format!("model:{phase}"), request).await?;
        Ok(output.text)
    }
}

fn advance(lifecycle: &mut Lifecycle, event: PlannerEvent) -> ToolResult<()> {
    lifecycle
        .transition(event)
        .map(|_| ())
        .map_err(|err| ToolError::execution(err.to_string()))
}

fn fail(lifecycle: &mut Lifecycle, phase: Phase, err: ToolError) -> ToolError {
    if let Err(transition) = lifecycle.transition(PlannerEvent::Fail) {
        debug!(error = %transition, "failure transition rejected");
    }
    debug!(%phase, error = %err, "planner phase failed");
    ToolError::in_phase(phase, err)
}
