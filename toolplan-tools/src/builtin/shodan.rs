//! `shodan`: runs a Shodan host search and returns the raw JSON result.
//!
//! The API key comes from [`CapabilitySettings::api_key`]. Without one the
//! capability opts out, unless the executor's whitelist names it.
//!
//! [`CapabilitySettings::api_key`]: toolplan_primitives::CapabilitySettings::api_key

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use toolplan_primitives::{CallContext, Config};
use tracing::debug;

use crate::descriptor::{Tool, ToolDescriptor, ToolMetadata};
use crate::error::{ToolError, ToolResult};
use crate::http::HttpSession;
use crate::registry::{BuildContext, RegistryBuilder};
use crate::schema::decode_args;

/// Registered name.
pub const NAME: &str = "shodan";

const DEFAULT_BASE_URL: &str = "https://api.shodan.io";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Option key for the request timeout in seconds.
pub const TIMEOUT_OPTION: &str = "timeout_secs";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchArgs {
    query: SearchQuery,
    #[serde(default)]
    params: SearchParams,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchQuery {
    domain: Option<String>,
    product: Option<String>,
    asn: Option<String>,
    hostname: Option<String>,
    org: Option<String>,
    net: Option<String>,
    country: Option<String>,
    #[serde(default)]
    port: Vec<u16>,
}

impl SearchQuery {
    /// Renders the filters in Shodan's `name:value` syntax, quoting values
    /// with spaces.
    fn render(&self) -> String {
        let text_filters = [
            ("domain", &self.domain),
            ("product", &self.product),
            ("asn", &self.asn),
            ("hostname", &self.hostname),
            ("org", &self.org),
            ("net", &self.net),
            ("country", &self.country),
        ];
        let mut filters: Vec<String> = text_filters
            .into_iter()
            .filter_map(|(name, value)| {
                let value = value.as_deref()?.trim();
                if value.is_empty() {
                    None
                } else if value.contains(char::is_whitespace) {
                    Some(format!("{name}:\"{}\"", value.replace('"', "")))
                } else {
                    Some(format!("{name}:{value}"))
                }
            })
            .collect();
        if !self.port.is_empty() {
            let ports: Vec<String> = self.port.iter().map(u16::to_string).collect();
            filters.push(format!("port:{}", ports.join(",")));
        }
        filters.join(" ")
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchParams {
    #[serde(default = "first_page")]
    page: u32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self { page: first_page() }
    }
}

fn first_page() -> u32 {
    1
}

/// Registers the capability under [`NAME`].
pub fn register(builder: &mut RegistryBuilder) {
    builder.register(NAME, build);
}

fn build(ctx: &BuildContext, config: &Config) -> ToolResult<Option<ToolDescriptor>> {
    if !config.is_enabled(NAME) {
        return Ok(None);
    }
    let settings = config.capability(NAME);
    let Some(api_key) = settings.api_key().filter(|key| !key.trim().is_empty()) else {
        let requested = ctx
            .whitelist()
            .is_some_and(|names| names.iter().any(|name| name == NAME));
        if requested {
            return Err(ToolError::config(
                NAME,
                "no API key configured (set TOOLPLAN_SHODAN_API_KEY)",
            ));
        }
        debug!(capability = NAME, "no API key, skipping");
        return Ok(None);
    };
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
        "Builds a Shodan host search from the given filters and returns the raw JSON result.",
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "object",
                    "description": "Search filters; at least one is required.",
                    "properties": {
                        "domain": {"type": "string"},
                        "product": {"type": "string"},
                        "asn": {"type": "string"},
                        "hostname": {"type": "string"},
                        "org": {"type": "string"},
                        "net": {"type": "string"},
                        "country": {"type": "string"},
                        "port": {
                            "type": "array",
                            "items": {"type": "integer", "minimum": 1, "maximum": 65535}
                        }
                    },
                    "additionalProperties": false
                },
                "params": {
                    "type": "object",
                    "properties": {
                        "page": {
                            "type": "integer",
                            "minimum": 1,
                            "description": "Page number of the search (default 1)."
                        }
                    },
                    "additionalProperties": false
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    )?;

    let session = HttpSession::new(Duration::from_secs(timeout));
    let tool = SearchTool {
        base_url,
        api_key: api_key.to_owned(),
        session: Arc::clone(&session),
    };
    Ok(Some(ToolDescriptor::new(metadata, tool).with_cleanup(session)))
}

struct SearchTool {
    base_url: String,
    api_key: String,
    session: Arc<HttpSession>,
}

#[async_trait]
impl Tool for SearchTool {
    async fn invoke(&self, ctx: CallContext, input: Value) -> ToolResult<String> {
        let args: SearchArgs = decode_args(NAME, input)?;
        let query = args.query.render();
        if query.is_empty() {
            return Err(ToolError::argument(NAME, "the query has no filters"));
        }

        let url = format!(
            "{}/shodan/host/search?key={}&query={}&page={}",
            self.base_url,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(&query),
            args.params.page.max(1)
        );
        let response = self.session.get(&ctx, NAME, &url).await?;
        if !response.status.is_success() {
            return Err(ToolError::execution(format!(
                "Shodan returned {}: {}",
                response.status,
                response.body.trim()
            )));
        }
        Ok(response.body)
    }
}
