//! Builds a [`ModelAdapter`] from configuration.

use std::sync::Arc;

use toolplan_primitives::{ModelProvider, ModelSettings};
use tracing::debug;

use crate::ollama::{OllamaAdapter, OllamaConfig};
use crate::openai::{OpenAiAdapter, OpenAiConfig};
use crate::traits::{AdapterResult, ModelAdapter};

/// Model used when the `OpenAI` provider is selected without a model name.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
/// Model used when the Ollama provider is selected without a model name.
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen3";

/// Creates the adapter described by `settings`.
///
/// # Errors
///
/// Returns [`crate::AdapterError::Configuration`] when the base URL is
/// malformed or an `OpenAI` token is missing.
pub fn from_settings(settings: &ModelSettings) -> AdapterResult<Arc<dyn ModelAdapter>> {
    match settings.provider() {
        ModelProvider::OpenAi => {
            let model = settings.model().unwrap_or(DEFAULT_OPENAI_MODEL);
            let mut config = match settings.token() {
                Some(token) => OpenAiConfig::new(model).with_api_key(token),
                None => OpenAiConfig::from_env(model),
            };
            if let Some(base_url) = settings.base_url() {
                config = config.with_base_url(base_url)?;
            }
            debug!(provider = "openai", model, "building model adapter");
            Ok(Arc::new(OpenAiAdapter::new(config)?))
        }
        ModelProvider::Ollama => {
            let model = settings.model().unwrap_or(DEFAULT_OLLAMA_MODEL);
            let mut config = OllamaConfig::new(model);
            if let Some(base_url) = settings.base_url() {
                config = config.with_base_url(base_url)?;
            }
            debug!(provider = "ollama", model, "building model adapter");
            Ok(Arc::new(OllamaAdapter::new(config)?))
        }
    }
}
