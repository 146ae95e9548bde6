//! Prompt templates for the plan and solve phases.

use std::fmt::Write as _;

use thiserror::Error;
use toolplan_primitives::ToolSpec;

/// Errors raised while rendering a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template names a variable that was not supplied.
    #[error("missing template variable: {name}")]
    MissingVariable {
        /// Name of the missing variable.
        name: String,
    },
}

/// A prompt with `{{variable}}` slots.
///
/// Rendering is a single left-to-right pass: substituted values are never
/// scanned again, so tool output containing braces is inserted verbatim.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    template: &'static str,
}

impl PromptTemplate {
    /// Wraps template text.
    #[must_use]
    pub const fn new(template: &'static str) -> Self {
        Self { template }
    }

    /// Returns the raw template text.
    #[must_use]
    pub const fn template(&self) -> &'static str {
        self.template
    }

    /// Renders the template with `vars`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingVariable`] for any slot without a value.
    pub fn render(&self, vars: &[(&str, &str)]) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template;
        while let Some(open) = rest.find("{{") {
            let Some(close) = rest[open + 2..].find("}}") else {
                break;
            };
            out.push_str(&rest[..open]);
            let name = rest[open + 2..open + 2 + close].trim();
            let value = vars
                .iter()
                .find_map(|(key, value)| (*key == name).then_some(*value))
                .ok_or_else(|| TemplateError::MissingVariable {
                    name: name.to_owned(),
                })?;
            out.push_str(value);
            rest = &rest[open + 2 + close + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// System prompt for the plan phase.
pub const PLAN_SYSTEM: &str = "You are a planner. You break a task into tool calls and reply with JSON only.";

/// User prompt for the plan phase. Slots: `query`, `tools`.
pub const PLAN: PromptTemplate = PromptTemplate::new(
    "Make a step-by-step plan that solves the task below using only the listed tools.

Tools:
{{tools}}

Reply with a single JSON object and nothing else:
{\"thought\": \"<short reasoning>\", \"steps\": [{\"id\": \"step1\", \"tool\": \"<tool name>\", \"description\": \"<what this step does>\", \"args\": {<arguments matching the tool schema>}}]}

Rules:
- Steps run in order, one at a time.
- Step ids contain only letters, digits, '_' and '-', and must be unique.
- To use the output of an earlier step, write ${<step id>.output} inside a string argument, e.g. {\"ip\": \"${step1.output}\"}.
- Never reference the current step or a later one.
- Use as few steps as the task needs.

Task: {{query}}",
);

/// System prompt for the solve phase.
pub const SOLVE_SYSTEM: &str = "You answer tasks using evidence gathered by tools. Be concise and factual.";

/// User prompt for the solve phase. Slots: `query`, `evidence`.
pub const SOLVE: PromptTemplate = PromptTemplate::new(
    "Solve the task using the evidence below. Each step lists the tool that ran, its arguments and its output.

Evidence:
{{evidence}}

Task: {{query}}

Answer directly.",
);

/// System prompt for single-turn function calling.
pub const TOOL_CALL_SYSTEM: &str =
    "Call the tools that answer the request. When no tool fits, answer briefly in plain text.";

/// Renders tool definitions for the plan prompt.
#[must_use]
pub fn describe_tools(specs: &[ToolSpec]) -> String {
    let mut out = String::new();
    for spec in specs {
        let _ = writeln!(out, "- {}: {}", spec.name, spec.description);
        let _ = writeln!(out, "  arguments: {}", spec.parameters);
    }
    out.trim_end().to_owned()
}
