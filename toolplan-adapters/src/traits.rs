//! Model contract: requests, streamed chunks, and the adapter trait.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use toolplan_primitives::{ToolCall, ToolSpec};

/// Result alias used by model adapters.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Chunks yielded by [`ModelAdapter::infer`].
pub type AdapterStream = Pin<Box<dyn Stream<Item = AdapterResult<InferenceChunk>> + Send>>;

/// Failures talking to a model provider.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Missing credentials or a malformed endpoint.
    #[error("adapter not configured: {reason}")]
    Configuration {
        /// What is missing or malformed.
        reason: String,
    },

    /// The request cannot be sent as built.
    #[error("invalid inference request: {reason}")]
    InvalidRequest {
        /// Why the request was rejected locally.
        reason: String,
    },

    /// Network failure or timeout.
    #[error("adapter transport error: {reason}")]
    Transport {
        /// Underlying failure.
        reason: String,
    },

    /// The provider answered 429.
    #[error("adapter rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Delay from the `Retry-After` header, when given in seconds.
        retry_after: Option<Duration>,
    },

    /// The provider answered with an error status or an undecodable body.
    #[error("adapter response error: {reason}")]
    Response {
        /// Status and body, or the decode failure.
        reason: String,
    },
}

impl AdapterError {
    /// Creates an [`AdapterError::InvalidRequest`].
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Creates an [`AdapterError::Configuration`].
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Creates an [`AdapterError::Transport`].
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Creates an [`AdapterError::Response`].
    #[must_use]
    pub fn response(reason: impl Into<String>) -> Self {
        Self::Response {
            reason: reason.into(),
        }
    }
}

/// Which provider and model an adapter talks to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterMetadata {
    provider: &'static str,
    model: String,
}

impl AdapterMetadata {
    /// Creates metadata for `model` served by `provider`.
    #[must_use]
    pub fn new(provider: &'static str, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Provider label, e.g. `openai` or `ollama`.
    #[must_use]
    pub const fn provider(&self) -> &'static str {
        self.provider
    }

    /// Model name sent with every request.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Author of a chat message.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions for the model.
    System,
    /// The caller.
    User,
    /// A previous model reply.
    Assistant,
    /// Tool output fed back to the model.
    Tool,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        })
    }
}

/// One chat message.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PromptMessage {
    role: MessageRole,
    content: String,
}

impl PromptMessage {
    /// Creates a message.
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Author of the message.
    #[must_use]
    pub const fn role(&self) -> MessageRole {
        self.role
    }

    /// Message text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Everything an adapter needs for one completion.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct InferenceRequest {
    /// Sent ahead of the messages as a `system` role message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    system_prompt: Option<String>,
    messages: Vec<PromptMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec>,
}

impl InferenceRequest {
    /// Creates a request from a conversation.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidRequest`] if `messages` is empty.
    pub fn new(messages: Vec<PromptMessage>) -> AdapterResult<Self> {
        if messages.is_empty() {
            return Err(AdapterError::invalid_request(
                "inference request requires at least one message",
            ));
        }
        Ok(Self::from_messages(messages))
    }

    /// Creates a single-turn request carrying one user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::from_messages(vec![PromptMessage::new(MessageRole::User, content)])
    }

    fn from_messages(messages: Vec<PromptMessage>) -> Self {
        Self {
            system_prompt: None,
            messages,
            max_output_tokens: None,
            temperature: None,
            tools: Vec::new(),
        }
    }

    /// Sets the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Caps the reply length.
    #[must_use]
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Declares tools the model may call.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    /// System prompt, if set.
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Conversation messages.
    #[must_use]
    pub fn messages(&self) -> &[PromptMessage] {
        &self.messages
    }

    /// Reply length cap, if set.
    #[must_use]
    pub const fn max_output_tokens(&self) -> Option<u32> {
        self.max_output_tokens
    }

    /// Sampling temperature, if set.
    #[must_use]
    pub const fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// Declared tools.
    #[must_use]
    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }
}

/// A piece of a streamed reply.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct InferenceChunk {
    /// Text appended by this chunk.
    pub delta: String,
    /// Set on the final chunk.
    pub done: bool,
    /// Tool calls completed in this chunk.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl InferenceChunk {
    /// Creates a text chunk.
    #[must_use]
    pub fn new(delta: impl Into<String>, done: bool) -> Self {
        Self {
            delta: delta.into(),
            done,
            tool_calls: Vec::new(),
        }
    }

    /// Attaches tool calls.
    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }
}

/// A whole reply, gathered from its chunks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InferenceOutput {
    /// Concatenated text deltas.
    pub text: String,
    /// Tool calls in emission order.
    pub tool_calls: Vec<ToolCall>,
}

/// Drains `stream` up to and including the chunk marked done.
///
/// # Errors
///
/// Propagates the first error yielded by the stream.
pub async fn collect_output(mut stream: AdapterStream) -> AdapterResult<InferenceOutput> {
    let mut output = InferenceOutput::default();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        output.text.push_str(&chunk.delta);
        output.tool_calls.extend(chunk.tool_calls);
        if chunk.done {
            break;
        }
    }
    Ok(output)
}

/// A language model provider.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Provider and model this adapter talks to.
    fn metadata(&self) -> &AdapterMetadata;

    /// Sends `request` and streams the reply.
    async fn infer(&self, request: InferenceRequest) -> AdapterResult<AdapterStream>;
}
