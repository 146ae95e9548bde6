//! `Ollama` adapter implementation.

use std::{fmt, time::Duration};

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

/// Configuration for the `Ollama` adapter.
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    base_url: String,
    model: String,
    default_temperature: Option<f32>,
    timeout: Duration,
}

impl OllamaConfig {
    /// Creates a configuration for the supplied model using default settings.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: "http://127.0.0.1:11434/".to_owned(),
            model: model.into(),
            default_temperature: None,
            timeout: Duration::from_secs(120),
        }
    }

    /// Overrides the base URL of the Ollama daemon.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdapterResult<Self> {
        self.base_url = normalize_base_url("Ollama", base_url.as_ref())?;
        Ok(self)
    }

    /// Sets the default sampling temperature used when the request does not
    /// provide one explicitly.
    #[must_use]
    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = Some(temperature);
        self
    }

    /// Sets the HTTP timeout for requests to the Ollama daemon.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// `Ollama` adapter that calls an Ollama daemon over HTTP/HTTPS.
pub struct OllamaAdapter {
    endpoint: JsonEndpoint,
    metadata: AdapterMetadata,
    default_temperature: Option<f32>,
}

impl fmt::Debug for OllamaAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OllamaAdapter")
            .field("model", &self.metadata.model())
            .field("endpoint", self.endpoint.uri())
            .finish_non_exhaustive()
    }
}

impl OllamaAdapter {
    /// Constructs a new adapter from the supplied configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the endpoint is invalid or the HTTP
    /// client cannot be constructed.
    pub fn new(config: OllamaConfig) -> AdapterResult<Self> {
        Ok(Self {
            endpoint: JsonEndpoint::new("Ollama", &config.base_url, "api/chat", config.timeout)?,
            metadata: AdapterMetadata::new("ollama", config.model),
            default_temperature: config.default_temperature,
        })
    }

    fn build_request(&self, request: &InferenceRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.messages().len() + 1);
        if let Some(system) = request.system_prompt() {
            messages.push(ChatMessage {
                role: MessageRole::System.to_string(),
                content: system.to_owned(),
                tool_calls: Vec::new(),
            });
        }
        messages.extend(request.messages().iter().map(map_prompt_message));

        let options = if request.temperature().is_some()
            || self.default_temperature.is_some()
            || request.max_output_tokens().is_some()
        {
            Some(ChatOptions {
                temperature: request.temperature().or(self.default_temperature),
                max_output_tokens: request.max_output_tokens(),
            })
        } else {
            None
        };

        ChatRequest {
            model: self.metadata.model().to_owned(),
            stream: false,
            messages,
            tools: request.tools().iter().map(map_tool_spec).collect(),
            options,
        }
    }
}

#[async_trait]
impl ModelAdapter for OllamaAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn infer(&self, request: InferenceRequest) -> AdapterResult<AdapterStream> {
        let payload = self.build_request(&request);
        let response: ChatResponse = self.endpoint.post(None, &payload).await?;
        let chunk = response.into_chunk()?;
        Ok(Box::pin(stream::once(async move { Ok(chunk) })))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    stream: bool,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ChatToolCall>,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatToolCall {
    function: ChatToolCallFunction,
}

// Ollama sends arguments as a JSON object rather than an encoded string.
#[derive(Debug, Serialize, Deserialize)]
struct ChatToolCallFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "num_predict")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default, rename = "done")]
    _done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl ChatResponse {
    fn into_chunk(self) -> AdapterResult<InferenceChunk> {
        if let Some(error) = self.error {
            return Err(AdapterError::response(error));
        }

        let Some(message) = self.message else {
            return Ok(InferenceChunk::new(self.response.unwrap_or_default(), true));
        };

        let mut tool_calls = Vec::with_capacity(message.tool_calls.len());
        for call in message.tool_calls {
            let arguments = match call.function.arguments {
                Value::Null => "{}".to_owned(),
                Value::String(raw) => raw,
                other => serde_json::to_string(&other).map_err(|err| {
                    AdapterError::response(format!("failed to encode Ollama tool arguments: {err}"))
                })?,
            };
            tool_calls.push(ToolCall::new(call.function.name, arguments));
        }

        Ok(InferenceChunk::new(message.content, true).with_tool_calls(tool_calls))
    }
}

fn map_prompt_message(message: &PromptMessage) -> ChatMessage {
    match message.role() {
        MessageRole::Tool => ChatMessage {
            role: "user".to_owned(),
            content: format!("[tool output] {}", message.content()),
            tool_calls: Vec::new(),
        },
        role => ChatMessage {
            role: role.to_string(),
            content: message.content().to_owned(),
            tool_calls: Vec::new(),
        },
    }
}

fn map_tool_spec(spec: &ToolSpec) -> ChatTool {
    ChatTool {
        kind: "function",
        function: ChatFunction {
            name: spec.name.clone(),
            description: spec.description.clone(),
            parameters: spec.parameters.clone(),
        },
    }
}
