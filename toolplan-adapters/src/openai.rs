//! `OpenAI`-compatible chat completions adapter.

use std::{env, fmt, time::Duration};

use async_trait::async_trait;
use futures::stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolplan_primitives::{ToolCall, ToolSpec};

use crate::http_client::{JsonEndpoint, normalize_base_url};
use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, AdapterStream, InferenceChunk, InferenceRequest,
    MessageRole, ModelAdapter, PromptMessage,
};

/// Environment variable used when loading configuration automatically.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Configuration for the `OpenAI` adapter.
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout: Duration,
    default_temperature: Option<f32>,
}

impl OpenAiConfig {
    /// Creates a configuration using the supplied model identifier.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            model: model.into(),
            base_url: "https://api.openai.com/v1/".to_owned(),
            timeout: Duration::from_secs(120),
            default_temperature: None,
        }
    }

    /// Loads the API key from the `OPENAI_API_KEY` environment variable.
    #[must_use]
    pub fn from_env(model: impl Into<String>) -> Self {
        let mut cfg = Self::new(model);
        cfg.api_key = env::var(OPENAI_API_KEY_ENV).ok();
        cfg
    }

    /// Overrides the base URL used for API calls. The URL must include the API
    /// version segment, e.g. `https://llm.internal/v1`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdapterResult<Self> {
        self.base_url = normalize_base_url("OpenAI", base_url.as_ref())?;
        Ok(self)
    }

    /// Sets the default sampling temperature used when requests omit it.
    #[must_use]
    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = Some(temperature);
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Supplies an explicit API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// `OpenAI` adapter that calls a chat completions endpoint over HTTP(S).
pub struct OpenAiAdapter {
    endpoint: JsonEndpoint,
    metadata: AdapterMetadata,
    api_key: String,
    default_temperature: Option<f32>,
}

impl fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("model", &self.metadata.model())
            .field("endpoint", self.endpoint.uri())
            .finish_non_exhaustive()
    }
}

impl OpenAiAdapter {
    /// Constructs a new adapter with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the API key is missing.
    pub fn new(config: OpenAiConfig) -> AdapterResult<Self> {
        let api_key = config
            .api_key
            .ok_or_else(|| AdapterError::configuration("OpenAI adapter requires an API key"))?;

        let endpoint =
            JsonEndpoint::new("OpenAI", &config.base_url, "chat/completions", config.timeout)?;

        Ok(Self {
            endpoint,
            metadata: AdapterMetadata::new("openai", config.model),
            api_key,
            default_temperature: config.default_temperature,
        })
    }

    fn build_request(&self, request: &InferenceRequest) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(request.messages().len() + 1);
        if let Some(system) = request.system_prompt() {
            messages.push(OpenAiMessage {
                role: MessageRole::System.to_string(),
                content: system.to_owned(),
            });
        }
        messages.extend(request.messages().iter().map(map_prompt_message));

        ChatCompletionRequest {
            model: self.metadata.model().to_owned(),
            messages,
            temperature: request.temperature().or(self.default_temperature),
            max_tokens: request.max_output_tokens(),
            tools: request.tools().iter().map(map_tool_spec).collect(),
            stream: false,
        }
    }
}

#[async_trait]
impl ModelAdapter for OpenAiAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn infer(&self, request: InferenceRequest) -> AdapterResult<AdapterStream> {
        let payload = self.build_request(&request);
        let response: ChatCompletionResponse =
            self.endpoint.post(Some(&self.api_key), &payload).await?;
        let chunk = response.into_chunk();
        Ok(Box::pin(stream::once(async move { Ok(chunk) })))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "max_tokens")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

impl ChatCompletionResponse {
    fn into_chunk(self) -> InferenceChunk {
        let Some(message) = self
            .choices
            .into_iter()
            .find_map(|choice| choice.message)
        else {
            return InferenceChunk::new(String::new(), true);
        };

        let tool_calls = message
            .tool_calls
            .into_iter()
            .map(|call| {
                let tool_call = ToolCall::new(call.function.name, call.function.arguments);
                match call.id {
                    Some(id) => tool_call.with_id(id),
                    None => tool_call,
                }
            })
            .collect();

        InferenceChunk::new(message.content.unwrap_or_default(), true).with_tool_calls(tool_calls)
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChoiceToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChoiceToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ChoiceFunction,
}

#[derive(Debug, Deserialize)]
struct ChoiceFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn map_prompt_message(message: &PromptMessage) -> OpenAiMessage {
    match message.role() {
        // Tool results are not tied to a tool_call_id here, so they travel as
        // user content.
        MessageRole::Tool => OpenAiMessage {
            role: MessageRole::User.to_string(),
            content: format!("[tool output] {}", message.content()),
        },
        role => OpenAiMessage {
            role: role.to_string(),
            content: message.content().to_owned(),
        },
    }
}

fn map_tool_spec(spec: &ToolSpec) -> OpenAiTool {
    OpenAiTool {
        kind: "function",
        function: OpenAiFunction {
            name: spec.name.clone(),
            description: spec.description.clone(),
            parameters: spec.parameters.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{InferenceRequest, MessageRole, PromptMessage};

    #[test]
    fn base_url_requires_scheme() {
        let err = OpenAiConfig::new("gpt-4")
            .with_base_url("api.openai.com")
            .expect_err("missing scheme should error");

        assert!(matches!(err, AdapterError::Configuration { .. }));
    }

    #[test]
    fn sanitize_appends_trailing_slash() {
        let cfg = OpenAiConfig::new("gpt-4")
            .with_base_url("https://llm.example.com/v1")
            .expect("valid URL");
        assert_eq!(cfg.base_url, "https://llm.example.com/v1/");
    }

    #[test]
    fn missing_key_is_configuration_error() {
        let err = OpenAiAdapter::new(OpenAiConfig::new("gpt-4")).expect_err("key required");
        assert!(matches!(err, AdapterError::Configuration { .. }));
    }

    #[test]
    fn tool_messages_travel_as_user_content() {
        let mapped = map_prompt_message(&PromptMessage::new(MessageRole::Tool, "93.184.216.34"));
        assert_eq!(mapped.role, "user");
        assert!(mapped.content.contains("93.184.216.34"));
    }

    #[test]
    fn response_parsing_extracts_tool_calls() {
        let json = r#"{
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "execute_command", "arguments": "{\"command\":\"echo banana\"}"}
                    }]
                }
            }]
        }"#;

        let parsed: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        let chunk = parsed.into_chunk();
        assert!(chunk.done);
        assert_eq!(chunk.delta, "");
        assert_eq!(chunk.tool_calls.len(), 1);
        assert_eq!(chunk.tool_calls[0].name, "execute_command");
        assert_eq!(chunk.tool_calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(
            chunk.tool_calls[0].arguments,
            r#"{"command":"echo banana"}"#
        );
    }

    #[test]
    fn build_request_includes_system_prompt_and_tools() {
        let config = OpenAiConfig::new("gpt-4")
            .with_default_temperature(0.2)
            .with_api_key("test_key");
        let adapter = OpenAiAdapter::new(config).expect("adapter");
        let request = InferenceRequest::new(vec![PromptMessage::new(MessageRole::User, "hello")])
            .unwrap()
            .with_system_prompt("be terse")
            .with_tools(vec![ToolSpec {
                name: "dig".to_owned(),
                description: "resolve a domain".to_owned(),
                parameters: serde_json::json!({"type": "object"}),
            }]);

        let chat = adapter.build_request(&request);
        assert_eq!(chat.model, adapter.metadata.model());
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[0].role, "system");
        assert_eq!(chat.tools.len(), 1);
        assert_eq!(chat.temperature, Some(0.2));

        let encoded = serde_json::to_value(&chat).unwrap();
        assert_eq!(encoded["tools"][0]["type"], "function");
        assert_eq!(encoded["tools"][0]["function"]["name"], "dig");
    }
}
