//! Plan and step records.

use std::fmt::Write as _;

use serde::Deserialize;
use serde_json::Value;

/// What happened when a step ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Text the tool returned.
    Output(String),
    /// Rendered error of the failed call.
    Failed(String),
}

/// One tool invocation of a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    id: String,
    tool: String,
    description: Option<String>,
    template: Value,
    resolved: Option<String>,
    outcome: Option<StepOutcome>,
}

impl Step {
    /// Creates a step that has not run yet.
    #[must_use]
    pub fn new(id: impl Into<String>, tool: impl Into<String>, template: Value) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            description: None,
            template,
            resolved: None,
            outcome: None,
        }
    }

    /// Attaches a human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Step identifier, unique within its plan.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Tool the step calls.
    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Optional description supplied by the model.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Argument template, possibly containing placeholders.
    #[must_use]
    pub fn template(&self) -> &Value {
        &self.template
    }

    /// Argument text sent to the tool, once resolved.
    #[must_use]
    pub fn resolved(&self) -> Option<&str> {
        self.resolved.as_deref()
    }

    /// Outcome, once the step ran.
    #[must_use]
    pub fn outcome(&self) -> Option<&StepOutcome> {
        self.outcome.as_ref()
    }

    /// Output text of a successful run.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match &self.outcome {
            Some(StepOutcome::Output(text)) => Some(text),
            _ => None,
        }
    }

    pub(crate) fn set_resolved(&mut self, resolved: String) {
        self.resolved = Some(resolved);
    }

    pub(crate) fn set_outcome(&mut self, outcome: StepOutcome) {
        self.outcome = Some(outcome);
    }
}

/// Ordered steps produced by the model for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    thought: Option<String>,
    steps: Vec<Step>,
}

impl Plan {
    /// Creates a plan from already validated steps.
    #[must_use]
    pub fn new(thought: Option<String>, steps: Vec<Step>) -> Self {
        Self { thought, steps }
    }

    /// The model's reasoning about the plan, if it gave any.
    #[must_use]
    pub fn thought(&self) -> Option<&str> {
        self.thought.as_deref()
    }

    /// Steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub(crate) fn steps_mut(&mut self) -> &mut [Step] {
        &mut self.steps
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if the plan has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Looks a step up by id.
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == id)
    }

    /// Renders every executed step as evidence for answer synthesis.
    #[must_use]
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            let _ = write!(out, "Step {} ({})", step.id, step.tool);
            if let Some(description) = &step.description {
                let _ = write!(out, ": {description}");
            }
            out.push('\n');
            if let Some(resolved) = &step.resolved {
                let _ = writeln!(out, "Arguments: {resolved}");
            }
            match &step.outcome {
                Some(StepOutcome::Output(text)) => {
                    let _ = writeln!(out, "Output:\n{text}");
                }
                Some(StepOutcome::Failed(reason)) => {
                    let _ = writeln!(out, "Failed: {reason}");
                }
                None => out.push_str("Not run\n"),
            }
            out.push('\n');
        }
        out.trim_end().to_owned()
    }
}

/// Wire shape of a plan as emitted by the model.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PlanDocument {
    #[serde(default)]
    pub(crate) thought: Option<String>,
    pub(crate) steps: Vec<StepDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct StepDocument {
    pub(crate) id: String,
    pub(crate) tool: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    pub(crate) args: Value,
}

impl From<StepDocument> for Step {
    fn from(doc: StepDocument) -> Self {
        Self {
            id: doc.id,
            tool: doc.tool,
            description: doc.description,
            template: doc.args,
            resolved: None,
            outcome: None,
        }
    }
}
