//! Model-facing tool descriptions and structured tool-call requests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Function definition advertised to a language model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name the model must use when calling.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON Schema of accepted arguments.
    pub parameters: Value,
}

/// Structured tool invocation emitted by a model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call identifier, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Target tool name.
    pub name: String,
    /// Raw JSON argument text.
    pub arguments: String,
}

impl ToolCall {
    /// Creates a tool call without a provider identifier.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Attaches the provider-assigned identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}
