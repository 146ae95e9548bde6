//! Tool descriptors: metadata, invocation function, and optional cleanup hook.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use toolplan_primitives::{CallContext, ToolSpec, validate_tool_name};

use crate::error::{ToolError, ToolResult};

/// Metadata describing a built tool.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolMetadata {
    name: String,
    description: String,
    schema: Value,
}

impl ToolMetadata {
    /// Creates metadata for the supplied name, description and JSON Schema.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidMetadata`] if the name is not a valid tool
    /// name or the schema is not a JSON object.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
    ) -> ToolResult<Self> {
        let name = name.into();
        validate_tool_name(&name).map_err(|err| ToolError::InvalidMetadata {
            reason: err.to_string(),
        })?;

        if !schema.is_object() {
            return Err(ToolError::InvalidMetadata {
                reason: format!("schema of `{name}` must be a JSON object"),
            });
        }

        Ok(Self {
            name,
            description: description.into(),
            schema,
        })
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the argument schema.
    #[must_use]
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Renders the metadata as a model-facing function definition.
    #[must_use]
    pub fn to_spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.schema.clone(),
        }
    }
}

/// Trait implemented by tool executors.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Invokes the tool with already validated JSON input, returning text.
    async fn invoke(&self, ctx: CallContext, input: Value) -> ToolResult<String>;
}

#[async_trait]
impl<F, Fut> Tool for F
where
    F: Send + Sync + Fn(CallContext, Value) -> Fut,
    Fut: Future<Output = ToolResult<String>> + Send,
{
    async fn invoke(&self, ctx: CallContext, input: Value) -> ToolResult<String> {
        (self)(ctx, input).await
    }
}

/// Releases a resource acquired when a tool was built.
#[async_trait]
pub trait CleanupHook: Send + Sync {
    /// Releases the resource. Must be safe to call more than once.
    async fn release(&self) -> ToolResult<()>;
}

/// A built tool: metadata, invocation function and optional cleanup hook.
#[derive(Clone)]
pub struct ToolDescriptor {
    metadata: ToolMetadata,
    tool: Arc<dyn Tool>,
    cleanup: Option<Arc<dyn CleanupHook>>,
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.metadata.name)
            .field("stateful", &self.cleanup.is_some())
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    /// Creates a stateless descriptor.
    #[must_use]
    pub fn new<T>(metadata: ToolMetadata, tool: T) -> Self
    where
        T: Tool + 'static,
    {
        Self::from_arc(metadata, Arc::new(tool))
    }

    /// Creates a descriptor from a shared tool implementation.
    #[must_use]
    pub fn from_arc(metadata: ToolMetadata, tool: Arc<dyn Tool>) -> Self {
        Self {
            metadata,
            tool,
            cleanup: None,
        }
    }

    /// Attaches a hook the executor runs during cleanup.
    #[must_use]
    pub fn with_cleanup(mut self, hook: Arc<dyn CleanupHook>) -> Self {
        self.cleanup = Some(hook);
        self
    }

    /// Returns the associated metadata.
    #[must_use]
    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name()
    }

    /// Returns the cleanup hook, if the tool holds resources.
    #[must_use]
    pub fn cleanup_hook(&self) -> Option<&Arc<dyn CleanupHook>> {
        self.cleanup.as_ref()
    }

    /// Executes the underlying tool implementation without validation.
    ///
    /// # Errors
    ///
    /// Propagates whatever the implementation returns.
    pub async fn invoke(&self, ctx: CallContext, input: Value) -> ToolResult<String> {
        self.tool.invoke(ctx, input).await
    }
}
