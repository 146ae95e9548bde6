//! `web_reader`: fetches a page and returns its readable content.
//!
//! HTML is rendered to plain text. Any other body comes back as-is.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyper::Uri;
use serde::Deserialize;
use serde_json::{Value, json};
use toolplan_primitives::{CallContext, Config};

use crate::descriptor::{Tool, ToolDescriptor, ToolMetadata};
use crate::error::{ToolError, ToolResult};
use crate::http::{HttpResponse, HttpSession};
use crate::registry::{BuildContext, RegistryBuilder};
use crate::schema::decode_args;

/// Registered name.
pub const NAME: &str = "web_reader";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_CHARS: usize = 20_000;
const TEXT_WIDTH: usize = 100;
/// Option key for the request timeout in seconds.
pub const TIMEOUT_OPTION: &str = "timeout_secs";
/// Option key for the longest content returned, in characters.
pub const MAX_CHARS_OPTION: &str = "max_chars";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadArgs {
    url: String,
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
    let timeout = settings
        .parsed_option::<u64>(TIMEOUT_OPTION)
        .map_err(|err| ToolError::config(NAME, err.to_string()))?
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let max_chars = settings
        .parsed_option::<usize>(MAX_CHARS_OPTION)
        .map_err(|err| ToolError::config(NAME, err.to_string()))?
        .unwrap_or(DEFAULT_MAX_CHARS);
    if max_chars == 0 {
        return Err(ToolError::config(NAME, format!("`{MAX_CHARS_OPTION}` must be positive")));
    }

    let metadata = ToolMetadata::new(
        NAME,
        "Fetches an http(s) URL and returns the page content, with HTML rendered as plain text.",
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "minLength": 1, "description": "The http or https URL to read."}
            },
            "required": ["url"],
            "additionalProperties": false
        }),
    )?;

    let session = HttpSession::new(Duration::from_secs(timeout));
    let tool = ReaderTool {
        max_chars,
        session: Arc::clone(&session),
    };
    Ok(Some(ToolDescriptor::new(metadata, tool).with_cleanup(session)))
}

struct ReaderTool {
    max_chars: usize,
    session: Arc<HttpSession>,
}

#[async_trait]
impl Tool for ReaderTool {
    async fn invoke(&self, ctx: CallContext, input: Value) -> ToolResult<String> {
        let args: ReadArgs = decode_args(NAME, input)?;
        let url = parse_url(args.url.trim())?;

        let response = self.session.get(&ctx, NAME, &url).await?;
        if !response.status.is_success() {
            return Err(ToolError::execution(format!(
                "{url} returned {}",
                response.status
            )));
        }
        Ok(truncate(readable(response)?, self.max_chars))
    }
}

fn parse_url(raw: &str) -> ToolResult<String> {
    let uri = raw
        .parse::<Uri>()
        .map_err(|err| ToolError::argument(NAME, format!("invalid URL `{raw}`: {err}")))?;
    match uri.scheme_str() {
        Some("http" | "https") if uri.host().is_some() => Ok(raw.to_owned()),
        _ => Err(ToolError::argument(
            NAME,
            format!("`{raw}` is not an absolute http(s) URL"),
        )),
    }
}

fn readable(response: HttpResponse) -> ToolResult<String> {
    if !response.is_html() {
        return Ok(response.body);
    }
    html2text::from_read(response.body.as_bytes(), TEXT_WIDTH)
        .map_err(|err| ToolError::execution(format!("failed to render HTML: {err}")))
}

fn truncate(mut content: String, max_chars: usize) -> String {
    if let Some((cut, _)) = content.char_indices().nth(max_chars) {
        content.truncate(cut);
        content.push_str("\n[truncated]");
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::CleanupHook;
    use crate::test_server::TestServer;

    fn reader(max_chars: usize) -> ReaderTool {
        ReaderTool {
            max_chars,
            session: HttpSession::new(Duration::from_secs(5)),
        }
    }

    #[tokio::test]
    async fn renders_html_as_text() {
        let server = TestServer::start(
            200,
            "text/html; charset=utf-8",
            "<html><head><title>t</title></head><body><h1>What Is My IP Address</h1><p>203.0.113.7</p></body></html>",
        )
        .await;
        let tool = reader(DEFAULT_MAX_CHARS);

        let output = tool
            .invoke(CallContext::new(), json!({"url": format!("{}/", server.base_url)}))
            .await
            .unwrap();
        assert!(output.contains("What Is My IP Address"), "{output}");
        assert!(output.contains("203.0.113.7"), "{output}");
        assert!(!output.contains("<h1>"), "{output}");
        tool.session.release().await.unwrap();
    }

    #[tokio::test]
    async fn returns_other_bodies_verbatim() {
        let body = r#"{"ip":"1.1.1.1","hostnames":["one.one.one.one"],"tags":["cloudflare"]}"#;
        let server = TestServer::start(200, "application/json", body).await;
        let tool = reader(DEFAULT_MAX_CHARS);

        let output = tool
            .invoke(CallContext::new(), json!({"url": format!("{}/1.1.1.1", server.base_url)}))
            .await
            .unwrap();
        assert_eq!(output, body);
        assert_eq!(server.targets(), ["/1.1.1.1"]);
        tool.session.release().await.unwrap();
    }

    #[tokio::test]
    async fn error_status_is_execution_error() {
        let server = TestServer::start(503, "text/plain", "down").await;
        let tool = reader(DEFAULT_MAX_CHARS);

        let err = tool
            .invoke(CallContext::new(), json!({"url": server.base_url.clone()}))
            .await
            .expect_err("503");
        assert!(matches!(err, ToolError::Execution { ref reason } if reason.contains("503")));
        tool.session.release().await.unwrap();
    }

    #[tokio::test]
    async fn non_http_urls_never_reach_network() {
        let tool = reader(DEFAULT_MAX_CHARS);
        for url in ["file:///etc/passwd", "example.com", "ftp://example.com/x"] {
            let err = tool
                .invoke(CallContext::new(), json!({"url": url}))
                .await
                .expect_err(url);
            assert!(matches!(err, ToolError::Argument { .. }), "{url}: {err:?}");
        }
    }

    #[test]
    fn long_content_is_truncated_on_a_char_boundary() {
        assert_eq!(truncate("héllo".into(), 10), "héllo");
        assert_eq!(truncate("héllo".into(), 2), "hé\n[truncated]");
    }

    #[test]
    fn zero_max_chars_is_config_error() {
        let mut config = Config::new();
        config.capability_mut(NAME).set_option(MAX_CHARS_OPTION, "0");
        let mut builder = RegistryBuilder::new();
        register(&mut builder);
        let registry = builder.freeze();
        let ctx = BuildContext::new(Arc::clone(&registry), None, CallContext::new());
        let err = registry.build(&ctx, &config).expect_err("zero");
        assert!(matches!(err, ToolError::Config { .. }));
    }
}
