//! `exploit`: runs one Metasploit module against a target.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::process::Command;
use toolplan_primitives::{CallContext, Config};
use tracing::info;

use crate::descriptor::{Tool, ToolDescriptor, ToolMetadata};
use crate::error::{ToolError, ToolResult};
use crate::process;
use crate::registry::{BuildContext, RegistryBuilder};
use crate::schema::decode_args;

/// Registered name.
pub const NAME: &str = "exploit";

const DEFAULT_EXECUTABLE: &str = "msfconsole";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExploitArgs {
    module: String,
    #[serde(default)]
    options: BTreeMap<String, String>,
}

/// Registers the capability under [`NAME`].
pub fn register(builder: &mut RegistryBuilder) {
    builder.register(NAME, build);
}

fn build(_ctx: &BuildContext, config: &Config) -> ToolResult<Option<ToolDescriptor>> {
    if !config.is_enabled(NAME) {
        return Ok(None);
    }
    let executable = config
        .capability(NAME)
        .executable()
        .unwrap_or(DEFAULT_EXECUTABLE)
        .to_owned();

    let metadata = ToolMetadata::new(
        NAME,
        "Executes a Metasploit module against a target using the provided options and \
         returns the console output.",
        json!({
            "type": "object",
            "properties": {
                "module": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Metasploit module to use, e.g. \"exploit/unix/ftp/vsftpd_234_backdoor\"."
                },
                "options": {
                    "type": "object",
                    "additionalProperties": {"type": "string"},
                    "description": "Module options, e.g. {\"RHOSTS\": \"192.168.1.10\", \"LHOST\": \"192.168.1.5\"}."
                }
            },
            "required": ["module"],
            "additionalProperties": false
        }),
    )?;
    Ok(Some(ToolDescriptor::new(metadata, ExploitTool { executable })))
}

struct ExploitTool {
    executable: String,
}

#[async_trait]
impl Tool for ExploitTool {
    async fn invoke(&self, ctx: CallContext, input: Value) -> ToolResult<String> {
        let args: ExploitArgs = decode_args(NAME, input)?;
        let script = console_script(&args)?;

        info!(task_id = %ctx.task_id(), module = %args.module, "running exploit module");
        let mut command = Command::new(&self.executable);
        command.arg("-q").arg("-x").arg(&script);
        process::run(&ctx, NAME, command)
            .await?
            .into_success(&self.executable)
    }
}

/// Builds `use <module>; set <KEY> <value>; ...; run; exit`.
fn console_script(args: &ExploitArgs) -> ToolResult<String> {
    let module = args.module.trim();
    if module.is_empty() || !module.chars().all(|c| c.is_ascii_alphanumeric() || "/_-.".contains(c)) {
        return Err(ToolError::argument(NAME, format!("invalid module `{}`", args.module)));
    }

    let mut script = format!("use {module}; ");
    for (key, value) in &args.options {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ToolError::argument(NAME, format!("invalid option name `{key}`")));
        }
        // The console treats `;` and line breaks as command separators.
        if value.contains([';', '\n', '\r']) {
            return Err(ToolError::argument(
                NAME,
                format!("option `{key}` contains a command separator"),
            ));
        }
        script.push_str(&format!("set {key} {}; ", value.trim()));
    }
    script.push_str("run; exit");
    Ok(script)
}
