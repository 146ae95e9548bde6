//! Argument parsing and JSON Schema validation.

use jsonschema::JSONSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ToolError, ToolResult};

/// A tool schema compiled once at executor build time.
pub struct CompiledSchema {
    inner: JSONSchema,
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSchema").finish_non_exhaustive()
    }
}

impl CompiledSchema {
    /// Compiles `schema` for the tool `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Config`] when the document is not a valid schema.
    pub fn compile(name: &str, schema: &Value) -> ToolResult<Self> {
        let inner = JSONSchema::compile(schema)
            .map_err(|err| ToolError::config(name, format!("invalid argument schema: {err}")))?;
        Ok(Self { inner })
    }

    /// Validates `instance`, collecting every violation into one message.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Argument`] if the instance violates the schema.
    pub fn validate(&self, tool: &str, instance: &Value) -> ToolResult<()> {
        if let Err(errors) = self.inner.validate(instance) {
            let reasons: Vec<String> = errors
                .map(|err| {
                    let path = err.instance_path.to_string();
                    if path.is_empty() {
                        err.to_string()
                    } else {
                        format!("{path}: {err}")
                    }
                })
                .collect();
            return Err(ToolError::argument(tool, reasons.join("; ")));
        }
        Ok(())
    }
}

/// Parses raw argument text. Blank text is treated as an empty object, which
/// is what models emit for tools without parameters.
///
/// # Errors
///
/// Returns [`ToolError::Argument`] for malformed JSON.
pub fn parse_arguments(tool: &str, raw: &str) -> ToolResult<Value> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(raw)
        .map_err(|err| ToolError::argument(tool, format!("malformed JSON: {err}")))
}

/// Decodes validated arguments into a typed structure.
///
/// # Errors
///
/// Returns [`ToolError::Argument`] when the value does not fit `T`.
pub fn decode_args<T>(tool: &str, input: Value) -> ToolResult<T>
where
    T: DeserializeOwned,
{
    serde_json::from_value(input).map_err(|err| ToolError::argument(tool, err.to_string()))
}
