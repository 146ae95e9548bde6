//! `internetdb`: looks an IP up in Shodan's `InternetDB`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use toolplan_primitives::{CallContext, Config};

use crate::descriptor::{Tool, ToolDescriptor, ToolMetadata};
use crate::error::{ToolError, ToolResult};
use crate::http::HttpSession;
use crate::registry::{BuildContext, RegistryBuilder};
use crate::schema::decode_args;

use super::parse_ip;

/// Registered name.
pub const NAME: &str = "internetdb";

const DEFAULT_BASE_URL: &str = "https://internetdb.shodan.io";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Option key for the request timeout in seconds.
pub const TIMEOUT_OPTION: &str = "timeout_secs";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LookupArgs {
    ip: String,
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
    let base_url = settings
        .base_url()
        .unwrap_or(DEFAULT_BASE_URL)
        .trim_end_matches('/')
        .to_owned();
    let timeout = settings
        .parsed_option::<u64>(TIMEOUT_OPTION)
        .map_err(|err| ToolError::config(NAME, err.to_string()))?
        .unwrap_or(DEFAULT_TIMEOUT_SECS);

    let metadata = ToolMetadata::new(
        NAME,
        "Looks up an IP address in Shodan InternetDB and returns the raw JSON \
         (open ports, hostnames, tags, known vulnerabilities).",
        json!({
            "type": "object",
            "properties": {
                "ip": {"type": "string", "description": "The IP address to look up."}
            },
            "required": ["ip"],
            "additionalProperties": false
        }),
    )?;

    let session = HttpSession::new(Duration::from_secs(timeout));
    let tool = LookupTool {
        base_url,
        session: Arc::clone(&session),
    };
    Ok(Some(ToolDescriptor::new(metadata, tool).with_cleanup(session)))
}

struct LookupTool {
    base_url: String,
    session: Arc<HttpSession>,
}

#[async_trait]
impl Tool for LookupTool {
    async fn invoke(&self, ctx: CallContext, input: Value) -> ToolResult<String> {
        let args: LookupArgs = decode_args(NAME, input)?;
        let ip = parse_ip(NAME, &args.ip)?;

        let url = format!("{}/{ip}", self.base_url);
        let response = self.session.get(&ctx, NAME, &url).await?;
        if !response.status.is_success() {
            return Err(ToolError::execution(format!(
                "InternetDB returned {}: {}",
                response.status,
                response.body.trim()
            )));
        }
        Ok(response.body)
    }
}
