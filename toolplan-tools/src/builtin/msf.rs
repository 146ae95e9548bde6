//! `msf_search`: runs Metasploit console searches.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::process::Command;
use toolplan_primitives::{CallContext, Config};

use crate::descriptor::{Tool, ToolDescriptor, ToolMetadata};
use crate::error::{ToolError, ToolResult};
use crate::process;
use crate::registry::{BuildContext, RegistryBuilder};
use crate::schema::decode_args;

/// Registered name.
pub const NAME: &str = "msf_search";

const DEFAULT_EXECUTABLE: &str = "msfconsole";
const DEFAULT_TEMPLATE: &str = "search %s; exit";
/// Option key overriding the console script template. `%s` is replaced by
/// the query.
pub const TEMPLATE_OPTION: &str = "template";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchArgs {
    queries: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SearchReport<'a> {
    tool: &'a str,
    results: Vec<SearchResult>,
}

#[derive(Debug, Serialize)]
struct SearchResult {
    query: String,
    output: String,
}

/// Registers the capability under [`NAME`].
pub fn register(builder: &mut RegistryBuilder) {
    builder.register(NAME, build);
}

fn build(_ctx: &BuildContext, config: &Config) -> ToolResult<Option<ToolDescriptor>> {
    if !config.is_enabled(NAME) {
        return Ok(None);
    }
    let settings = config.capability(NAME);
    let executable = settings
        .executable()
        .unwrap_or(DEFAULT_EXECUTABLE)
        .to_owned();
    let template = settings
        .option(TEMPLATE_OPTION)
        .unwrap_or(DEFAULT_TEMPLATE)
        .to_owned();
    if !template.contains("%s") {
        return Err(ToolError::config(
            NAME,
            format!("`{TEMPLATE_OPTION}` must contain a `%s` placeholder"),
        ));
    }

    let metadata = ToolMetadata::new(
        NAME,
        "Executes Metasploit search queries and returns the console output per query as JSON.",
        json!({
            "type": "object",
            "properties": {
                "queries": {
                    "type": "array",
                    "items": {"type": "string", "minLength": 1},
                    "minItems": 1,
                    "description": "Metasploit search queries, e.g. [\"type:exploit name:ssh\", \"port 22\"]."
                }
            },
            "required": ["queries"],
            "additionalProperties": false
        }),
    )?;
    Ok(Some(ToolDescriptor::new(
        metadata,
        MsfSearchTool {
            executable,
            template,
        },
    )))
}

struct MsfSearchTool {
    executable: String,
    template: String,
}

#[async_trait]
impl Tool for MsfSearchTool {
    async fn invoke(&self, ctx: CallContext, input: Value) -> ToolResult<String> {
        let args: SearchArgs = decode_args(NAME, input)?;

        let mut results = Vec::with_capacity(args.queries.len());
        for query in args.queries {
            let script = self.template.replace("%s", &query);
            let mut command = Command::new(&self.executable);
            command.arg("-q").arg("-x").arg(&script);
            let output = process::run(&ctx, NAME, command)
                .await?
                .into_success(&self.executable)?;
            results.push(SearchResult { query, output });
        }

        serde_json::to_string(&SearchReport {
            tool: &self.executable,
            results,
        })
        .map_err(|err| ToolError::execution(format!("failed to encode search results: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn reports_each_query() {
        // `echo -q -x <script>` stands in for the console.
        let tool = MsfSearchTool {
            executable: "echo".into(),
            template: DEFAULT_TEMPLATE.into(),
        };
        let output = tool
            .invoke(
                CallContext::new(),
                json!({"queries": ["type:exploit name:ssh", "port 22"]}),
            )
            .await
            .unwrap();

        let report: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(report["tool"], "echo");
        assert_eq!(report["results"][0]["query"], "type:exploit name:ssh");
        assert_eq!(
            report["results"][0]["output"],
            "-q -x search type:exploit name:ssh; exit"
        );
        assert_eq!(report["results"][1]["output"], "-q -x search port 22; exit");
    }

    #[test]
    fn template_without_placeholder_is_config_error() {
        let mut config = Config::new();
        config
            .capability_mut(NAME)
            .set_option(TEMPLATE_OPTION, "search everything");

        let mut builder = RegistryBuilder::new();
        register(&mut builder);
        let registry = builder.freeze();
        let ctx = BuildContext::new(Arc::clone(&registry), None, CallContext::new());
        let err = registry.build(&ctx, &config).expect_err("bad template");
        assert!(matches!(err, ToolError::Config { ref capability, .. } if capability == NAME));
    }
}
