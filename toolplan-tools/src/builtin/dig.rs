//! `dig`: resolves a domain name to its addresses.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::process::Command;
use toolplan_primitives::{CallContext, Config};

use crate::descriptor::{Tool, ToolDescriptor, ToolMetadata};
use crate::error::{ToolError, ToolResult};
use crate::process;
use crate::registry::{BuildContext, RegistryBuilder};
use crate::schema::decode_args;

/// Registered name.
pub const NAME: &str = "dig";

const DEFAULT_EXECUTABLE: &str = "dig";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DigArgs {
    domain: String,
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
        "Resolves a domain name with `dig +short` and returns its addresses, one per line.",
        json!({
            "type": "object",
            "properties": {
                "domain": {
                    "type": "string",
                    "minLength": 1,
                    "description": "The domain name to resolve, e.g. example.com."
                }
            },
            "required": ["domain"],
            "additionalProperties": false
        }),
    )?;
    Ok(Some(ToolDescriptor::new(metadata, DigTool { executable })))
}

struct DigTool {
    executable: String,
}

#[async_trait]
impl Tool for DigTool {
    async fn invoke(&self, ctx: CallContext, input: Value) -> ToolResult<String> {
        let args: DigArgs = decode_args(NAME, input)?;
        let domain = args.domain.trim();
        if domain.starts_with('-') || domain.contains(char::is_whitespace) {
            return Err(ToolError::argument(NAME, format!("invalid domain `{domain}`")));
        }

        let mut command = Command::new(&self.executable);
        command.arg("+short").arg(domain);
        let output = process::run(&ctx, NAME, command)
            .await?
            .into_success(&self.executable)?;

        let addresses = addresses(&output);
        if addresses.is_empty() {
            return Err(ToolError::execution(format!("no records found for `{domain}`")));
        }
        Ok(addresses.join("\n"))
    }
}

// `+short` also prints CNAME targets; keep only lines that parse as addresses.
fn addresses(output: &str) -> Vec<&str> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.parse::<std::net::IpAddr>().is_ok())
        .collect()
}
