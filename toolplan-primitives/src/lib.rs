//! Core shared types for toolplan crates.

#![warn(missing_docs, clippy::pedantic)]

mod config;
mod context;
mod error;
mod ids;
mod name;
mod spec;

/// Configuration surface handed to capability factories.
pub use config::{CapabilitySettings, Config, ModelProvider, ModelSettings};
/// Cancellable execution context.
pub use context::{CallContext, Interruption};
/// Error type and result alias shared across the primitives.
pub use error::{Error, Result};
/// Unique identifier of one task run.
pub use ids::TaskId;
/// Validated tool names.
pub use name::{ToolName, validate_tool_name};
/// Model-facing tool definitions and tool-call requests.
pub use spec::{ToolCall, ToolSpec};
