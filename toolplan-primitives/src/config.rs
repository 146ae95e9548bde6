//! Configuration surface threaded opaquely into capability factories.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static DEFAULT_CAPABILITY: CapabilitySettings = CapabilitySettings {
    enabled: true,
    executable: None,
    api_key: None,
    base_url: None,
    options: BTreeMap::new(),
};

/// Model provider used by capabilities that need a language model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    /// `OpenAI` or any `OpenAI`-compatible chat completions endpoint.
    #[default]
    OpenAi,
    /// Local Ollama daemon.
    Ollama,
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        })
    }
}

impl FromStr for ModelProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(Error::InvalidConfig {
                reason: format!("unknown model provider `{other}`"),
            }),
        }
    }
}

/// Language model endpoint settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default)]
    provider: ModelProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
}

impl ModelSettings {
    /// Returns the configured provider.
    #[must_use]
    pub const fn provider(&self) -> ModelProvider {
        self.provider
    }

    /// Returns the endpoint base URL override.
    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Returns the API token.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns the model identifier.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Sets the provider.
    #[must_use]
    pub fn with_provider(mut self, provider: ModelProvider) -> Self {
        self.provider = provider;
        self
    }

    /// Sets the endpoint base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the API token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Per-capability switches and overrides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySettings {
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    executable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    options: BTreeMap<String, String>,
}

const fn enabled_by_default() -> bool {
    true
}

impl Default for CapabilitySettings {
    fn default() -> Self {
        DEFAULT_CAPABILITY.clone()
    }
}

impl CapabilitySettings {
    /// Returns `false` when the capability was switched off.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the executable override.
    #[must_use]
    pub fn executable(&self) -> Option<&str> {
        self.executable.as_deref()
    }

    /// Returns the credential for remote services.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Returns the service base URL override.
    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Returns a free-form option.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Returns every free-form option.
    #[must_use]
    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    /// Parses a free-form option.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when the option is present but cannot
    /// be parsed into `T`.
    pub fn parsed_option<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.option(key)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|err| Error::InvalidConfig {
                    reason: format!("option `{key}` = `{raw}`: {err}"),
                })
            })
            .transpose()
    }

    /// Enables or disables the capability.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Sets the executable override.
    pub fn set_executable(&mut self, executable: impl Into<String>) {
        self.executable = Some(executable.into());
    }

    /// Sets the credential.
    pub fn set_api_key(&mut self, api_key: impl Into<String>) {
        self.api_key = Some(api_key.into());
    }

    /// Sets the base URL override.
    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.base_url = Some(base_url.into());
    }

    /// Inserts a free-form option.
    pub fn set_option(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.options.insert(key.into(), value.into());
    }
}

/// Process configuration consumed by capability factories.
///
/// The core never interprets capability entries itself; each factory looks up
/// its own entry by capability name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    model: ModelSettings,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    capabilities: BTreeMap<String, CapabilitySettings>,
}

impl Config {
    /// Creates an empty configuration where every capability is enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the model settings.
    #[must_use]
    pub fn model(&self) -> &ModelSettings {
        &self.model
    }

    /// Replaces the model settings.
    #[must_use]
    pub fn with_model(mut self, model: ModelSettings) -> Self {
        self.model = model;
        self
    }

    /// Returns mutable model settings.
    pub fn model_mut(&mut self) -> &mut ModelSettings {
        &mut self.model
    }

    /// Returns the settings of the named capability, falling back to defaults.
    #[must_use]
    pub fn capability(&self, name: &str) -> &CapabilitySettings {
        self.capabilities.get(name).unwrap_or(&DEFAULT_CAPABILITY)
    }

    /// Returns mutable settings for the named capability, inserting defaults.
    pub fn capability_mut(&mut self, name: &str) -> &mut CapabilitySettings {
        self.capabilities.entry(name.to_owned()).or_default()
    }

    /// Returns `true` unless the capability was disabled.
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.capability(name).enabled()
    }

    /// Disables the named capability.
    #[must_use]
    pub fn disable(mut self, name: &str) -> Self {
        self.capability_mut(name).set_enabled(false);
        self
    }

    /// Iterates over explicitly configured capabilities.
    pub fn capabilities(&self) -> impl Iterator<Item = (&str, &CapabilitySettings)> {
        self.capabilities
            .iter()
            .map(|(name, settings)| (name.as_str(), settings))
    }
}
