//! Turns raw model text into a validated [`Plan`].
//!
//! The model's reply is untrusted input. It must pass a strict JSON Schema
//! before it is deserialized, and the resulting steps must satisfy the
//! ordering rules below before anything runs:
//!
//! - step ids are unique;
//! - placeholders only reference strictly earlier steps;
//! - the plan has no more than `max_steps` steps.

use std::collections::HashSet;

use serde_json::{Value, json};
use toolplan_adapters::{strip_code_fence, strip_think_tags};
use toolplan_tools::schema::CompiledSchema;
use toolplan_tools::{ToolError, ToolResult};

use crate::placeholder::Placeholders;
use crate::plan::{Plan, PlanDocument, Step};

/// Default upper bound on steps per plan.
pub const DEFAULT_MAX_STEPS: usize = 16;

/// JSON Schema every plan must satisfy.
#[must_use]
pub fn plan_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "thought": {"type": "string"},
            "steps": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string", "pattern": "^[A-Za-z0-9_-]+$"},
                        "tool": {"type": "string", "minLength": 1},
                        "description": {"type": "string"},
                        "args": {"type": "object"}
                    },
                    "required": ["id", "tool", "args"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["steps"],
        "additionalProperties": false
    })
}

/// Validates model output against the plan rules.
#[derive(Debug)]
pub struct PlanParser {
    schema: CompiledSchema,
    placeholders: Placeholders,
    max_steps: usize,
}

impl PlanParser {
    /// Creates a parser accepting at most `max_steps` steps.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Config`] if `max_steps` is zero or the plan
    /// schema fails to compile.
    pub fn new(max_steps: usize) -> ToolResult<Self> {
        if max_steps == 0 {
            return Err(ToolError::config("plan", "max_steps must be at least 1"));
        }
        Ok(Self {
            schema: CompiledSchema::compile("plan", &plan_schema())?,
            placeholders: Placeholders::new()?,
            max_steps,
        })
    }

    /// Maximum accepted step count.
    #[must_use]
    pub const fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Placeholder matcher shared with step execution.
    #[must_use]
    pub fn placeholders(&self) -> &Placeholders {
        &self.placeholders
    }

    /// Parses and validates `raw` model output.
    ///
    /// Reasoning blocks and a surrounding code fence are stripped first.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::PlanParse`] for any violation.
    pub fn parse(&self, raw: &str) -> ToolResult<Plan> {
        let cleaned = strip_think_tags(raw);
        let body = strip_code_fence(&cleaned);
        if body.is_empty() {
            return Err(ToolError::plan_parse("model returned an empty plan"));
        }

        let value: Value = serde_json::from_str(body)
            .map_err(|err| ToolError::plan_parse(format!("plan is not valid JSON: {err}")))?;
        self.schema.validate("plan", &value).map_err(|err| match err {
            ToolError::Argument { reason, .. } => ToolError::plan_parse(reason),
            other => other,
        })?;
        let document: PlanDocument = serde_json::from_value(value)
            .map_err(|err| ToolError::plan_parse(err.to_string()))?;

        if document.steps.len() > self.max_steps {
            return Err(ToolError::plan_parse(format!(
                "plan has {} steps, the limit is {}",
                document.steps.len(),
                self.max_steps
            )));
        }

        let steps: Vec<Step> = document.steps.into_iter().map(Step::from).collect();
        self.check_order(&steps)?;
        Ok(Plan::new(document.thought, steps))
    }

    fn check_order(&self, steps: &[Step]) -> ToolResult<()> {
        let mut earlier: HashSet<&str> = HashSet::with_capacity(steps.len());
        for step in steps {
            if earlier.contains(step.id()) {
                return Err(ToolError::plan_parse(format!(
                    "duplicate step id `{}`",
                    step.id()
                )));
            }
            for reference in self.placeholders.references(step.template()) {
                if reference == step.id() {
                    return Err(ToolError::plan_parse(format!(
                        "step `{}` references its own output",
                        step.id()
                    )));
                }
                if !earlier.contains(reference.as_str()) {
                    return Err(ToolError::plan_parse(format!(
                        "step `{}` references `{reference}`, which is not an earlier step",
                        step.id()
                    )));
                }
            }
            earlier.insert(step.id());
        }
        Ok(())
    }
}
