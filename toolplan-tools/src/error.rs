//! Error taxonomy shared by the registry, executor, and planner.

use std::fmt;

use thiserror::Error;
use toolplan_primitives::Interruption;

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors produced while building capabilities and dispatching tool calls.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool metadata failed validation.
    #[error("invalid tool metadata: {reason}")]
    InvalidMetadata {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A capability could not be built from the supplied configuration.
    #[error("capability `{capability}` is misconfigured: {reason}")]
    Config {
        /// Label or name of the offending capability.
        capability: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The requested tool is unknown or not whitelisted.
    #[error("tool `{name}` is not available")]
    NotFound {
        /// Name that failed to resolve.
        name: String,
    },

    /// The call payload was malformed or violated the tool schema.
    #[error("invalid arguments for `{tool}`: {reason}")]
    Argument {
        /// Target tool.
        tool: String,
        /// Validation failure.
        reason: String,
    },

    /// The underlying external action failed.
    #[error("tool execution failed: {reason}")]
    Execution {
        /// Human-readable error returned by the tool implementation.
        reason: String,
    },

    /// The model's plan did not parse into a valid plan.
    #[error("invalid plan: {reason}")]
    PlanParse {
        /// Parse or validation failure.
        reason: String,
    },

    /// The call context fired while the call was in flight.
    #[error("call to `{tool}` interrupted: {}", .cause.label())]
    Cancelled {
        /// Tool (or phase) that was interrupted.
        tool: String,
        /// Whether the token was cancelled or the deadline passed.
        cause: Interruption,
    },

    /// One or more resources could not be released.
    #[error("cleanup failed: {}", .failures.join("; "))]
    Cleanup {
        /// One message per failed release.
        failures: Vec<String>,
    },

    /// A plan step failed; carries the step context.
    #[error("step `{step}` ({tool}) failed: {source}")]
    Step {
        /// Step identifier.
        step: String,
        /// Tool the step targeted.
        tool: String,
        /// Underlying failure.
        #[source]
        source: Box<ToolError>,
    },

    /// A planner phase failed.
    #[error("{phase} phase failed: {source}")]
    Planner {
        /// Failing phase.
        phase: Phase,
        /// Underlying failure.
        #[source]
        source: Box<ToolError>,
    },
}

impl ToolError {
    /// Creates a configuration error for `capability`.
    #[must_use]
    pub fn config(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            capability: capability.into(),
            reason: reason.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Creates an argument error for `tool`.
    #[must_use]
    pub fn argument(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Argument {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Creates an execution error from the supplied reason.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }

    /// Creates a plan parse error.
    #[must_use]
    pub fn plan_parse(reason: impl Into<String>) -> Self {
        Self::PlanParse {
            reason: reason.into(),
        }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(tool: impl Into<String>, cause: Interruption) -> Self {
        Self::Cancelled {
            tool: tool.into(),
            cause,
        }
    }

    /// Wraps `source` with the step that produced it.
    #[must_use]
    pub fn step(step: impl Into<String>, tool: impl Into<String>, source: ToolError) -> Self {
        Self::Step {
            step: step.into(),
            tool: tool.into(),
            source: Box::new(source),
        }
    }

    /// Wraps `source` with the planner phase that produced it.
    #[must_use]
    pub fn in_phase(phase: Phase, source: ToolError) -> Self {
        Self::Planner {
            phase,
            source: Box::new(source),
        }
    }

    /// Returns the flat category, looking through step and phase wrappers.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMetadata { .. } | Self::Config { .. } => ErrorKind::Config,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Argument { .. } => ErrorKind::Argument,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::PlanParse { .. } => ErrorKind::PlanParse,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Cleanup { .. } => ErrorKind::Cleanup,
            Self::Step { source, .. } | Self::Planner { source, .. } => source.kind(),
        }
    }

    /// Returns the innermost planner phase recorded on this error, if any.
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Planner { phase, source } => source.phase().or(Some(*phase)),
            Self::Step { source, .. } => source.phase(),
            _ => None,
        }
    }
}

/// Flat error category used by callers that branch on failure type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad or missing configuration.
    Config,
    /// Unknown or non-whitelisted tool.
    NotFound,
    /// Malformed or schema-violating payload.
    Argument,
    /// External action failed.
    Execution,
    /// Model plan did not parse.
    PlanParse,
    /// Context cancelled or timed out.
    Cancelled,
    /// Resource release failed.
    Cleanup,
}

/// Phase of a task run, used to name where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Executor construction.
    Build,
    /// Direct tool dispatch.
    Call,
    /// Plan generation and parsing.
    Plan,
    /// Step execution.
    Work,
    /// Answer synthesis.
    Solve,
    /// Resource release.
    Cleanup,
}

impl Phase {
    /// Lowercase label used in messages and log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Call => "call",
            Self::Plan => "plan",
            Self::Work => "work",
            Self::Solve => "solve",
            Self::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
