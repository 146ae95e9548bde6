//! `execute_command`: runs a shell command inside a private workspace.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::process::Command;
use toolplan_primitives::{CallContext, Config};

use crate::descriptor::{Tool, ToolDescriptor, ToolMetadata};
use crate::error::ToolResult;
use crate::process;
use crate::registry::{BuildContext, CapabilityFactory, RegistryBuilder};
use crate::schema::decode_args;
use crate::workspace::Workspace;

/// Registered name.
pub const NAME: &str = "execute_command";

const DEFAULT_SHELL: &str = "sh";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CommandArgs {
    command: String,
}

fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "command": {
                "type": "string",
                "minLength": 1,
                "description": "Shell command to run, e.g. `ls -la`."
            }
        },
        "required": ["command"],
        "additionalProperties": false
    })
}

/// Registers the capability under [`NAME`].
pub fn register(builder: &mut RegistryBuilder) {
    builder.register(NAME, factory(NAME));
}

/// Factory building the command tool under `name`.
///
/// The shell defaults to `sh` and can be overridden with the capability's
/// `executable` setting.
pub fn factory(name: &'static str) -> impl CapabilityFactory {
    move |_ctx: &BuildContext, config: &Config| -> ToolResult<Option<ToolDescriptor>> {
        if !config.is_enabled(name) {
            return Ok(None);
        }
        let shell = config
            .capability(name)
            .executable()
            .unwrap_or(DEFAULT_SHELL)
            .to_owned();
        let metadata = ToolMetadata::new(
            name,
            "Executes a shell command in a private working directory and returns its output. \
             Files written by one call are visible to later calls of the same task.",
            schema(),
        )?;

        let workspace = Workspace::create("toolplan-cmd-")?;
        let tool = CommandTool {
            name,
            shell,
            workspace: Arc::clone(&workspace),
        };
        Ok(Some(ToolDescriptor::new(metadata, tool).with_cleanup(workspace)))
    }
}

struct CommandTool {
    name: &'static str,
    shell: String,
    workspace: Arc<Workspace>,
}

#[async_trait]
impl Tool for CommandTool {
    async fn invoke(&self, ctx: CallContext, input: Value) -> ToolResult<String> {
        let args: CommandArgs = decode_args(self.name, input)?;
        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(&args.command)
            .current_dir(self.workspace.path());
        process::run(&ctx, self.name, command)
            .await?
            .into_success(&self.shell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::CleanupHook;
    use crate::error::ToolError;

    fn build(config: &Config) -> Option<ToolDescriptor> {
        let mut builder = RegistryBuilder::new();
        register(&mut builder);
        let registry = builder.freeze();
        let ctx = BuildContext::new(Arc::clone(&registry), None, CallContext::new());
        registry.build(&ctx, config).unwrap().into_iter().next()
    }

    #[tokio::test]
    async fn runs_in_workspace_and_persists_files() {
        let descriptor = build(&Config::new()).expect("enabled by default");
        let ctx = CallContext::new();

        descriptor
            .invoke(ctx.clone(), json!({"command": "echo banana > fruit.txt"}))
            .await
            .unwrap();
        let output = descriptor
            .invoke(ctx, json!({"command": "cat fruit.txt"}))
            .await
            .unwrap();
        assert_eq!(output, "banana");

        descriptor.cleanup_hook().unwrap().release().await.unwrap();
    }

    #[tokio::test]
    async fn failing_command_reports_output() {
        let descriptor = build(&Config::new()).unwrap();
        let err = descriptor
            .invoke(CallContext::new(), json!({"command": "echo nope >&2; exit 2"}))
            .await
            .expect_err("exit 2");
        assert!(matches!(err, ToolError::Execution { ref reason } if reason.contains("nope")));
        descriptor.cleanup_hook().unwrap().release().await.unwrap();
    }

    #[test]
    fn disabled_by_config() {
        assert!(build(&Config::new().disable(NAME)).is_none());
    }
}
