//! Configuration loading for toolplan.
//!
//! Settings come from an optional `.env` file and the process environment,
//! the environment winning on conflicts. Every key starts with `TOOLPLAN_`:
//!
//! | key | meaning |
//! |-----|---------|
//! | `TOOLPLAN_AI_PROVIDER` | `openai` or `ollama` |
//! | `TOOLPLAN_AI_URL` | model endpoint base URL |
//! | `TOOLPLAN_AI_TOKEN` | model API token |
//! | `TOOLPLAN_MODEL` | model name |
//! | `TOOLPLAN_<CAP>_DISABLE` | `true`/`1`/`yes` turns the capability off |
//! | `TOOLPLAN_<CAP>_EXECUTABLE` | binary the capability runs |
//! | `TOOLPLAN_<CAP>_API_KEY` | API key for the capability |
//! | `TOOLPLAN_<CAP>_BASE_URL` | service base URL for the capability |
//! | `TOOLPLAN_<CAP>_OPT_<KEY>` | free-form option `<key>` |
//!
//! `<CAP>` is the capability name upper-cased with `-` written as `_`.

#![warn(missing_docs, clippy::pedantic)]

use std::path::Path;

use anyhow::{Context, Result, bail};
use toolplan_primitives::{Config, ModelProvider};
use tracing::debug;

/// Prefix shared by every recognised variable.
pub const PREFIX: &str = "TOOLPLAN_";

const DEFAULT_ENV_FILE: &str = ".env";

/// Loads configuration from `path` (or `./.env` when `None`) and the process
/// environment. A missing default file is not an error.
///
/// # Errors
///
/// Fails if an explicitly named file cannot be read, a line does not parse, or
/// a recognised value is invalid.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let mut vars: Vec<(String, String)> = Vec::new();
    match path {
        Some(path) => vars.extend(read_env_file(path)?),
        None => {
            let default = Path::new(DEFAULT_ENV_FILE);
            if default.is_file() {
                vars.extend(read_env_file(default)?);
            }
        }
    }
    vars.extend(std::env::vars());
    from_vars(vars)
}

fn read_env_file(path: &Path) -> Result<Vec<(String, String)>> {
    let entries = dotenvy::from_path_iter(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut vars = Vec::new();
    for entry in entries {
        vars.push(entry.with_context(|| format!("failed to parse {}", path.display()))?);
    }
    debug!(path = %path.display(), entries = vars.len(), "env file loaded");
    Ok(vars)
}

/// Builds a [`Config`] from key/value pairs. Later pairs override earlier
/// ones; keys without the [`PREFIX`] are ignored.
///
/// # Errors
///
/// Fails on an unknown provider, a non-boolean `_DISABLE` value, or a key that
/// names no capability.
pub fn from_vars<I, K, V>(vars: I) -> Result<Config>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut config = Config::new();
    for (key, value) in vars {
        let key = key.as_ref();
        let Some(name) = key.strip_prefix(PREFIX) else {
            continue;
        };
        apply(&mut config, name, value.into()).with_context(|| format!("invalid {key}"))?;
    }
    Ok(config)
}

fn apply(config: &mut Config, name: &str, value: String) -> Result<()> {
    match name {
        "AI_PROVIDER" => {
            let provider: ModelProvider = value.parse()?;
            let model = std::mem::take(config.model_mut()).with_provider(provider);
            *config.model_mut() = model;
        }
        "AI_URL" => {
            let model = std::mem::take(config.model_mut()).with_base_url(value);
            *config.model_mut() = model;
        }
        "AI_TOKEN" => {
            let model = std::mem::take(config.model_mut()).with_token(value);
            *config.model_mut() = model;
        }
        "MODEL" => {
            let model = std::mem::take(config.model_mut()).with_model(value);
            *config.model_mut() = model;
        }
        _ => apply_capability(config, name, value)?,
    }
    Ok(())
}

fn apply_capability(config: &mut Config, name: &str, value: String) -> Result<()> {
    if let Some((capability, option)) = name.split_once("_OPT_") {
        let capability = capability_name(capability)?;
        if option.is_empty() {
            bail!("option name is empty");
        }
        config
            .capability_mut(&capability)
            .set_option(option.to_ascii_lowercase(), value);
        return Ok(());
    }

    if let Some(capability) = name.strip_suffix("_DISABLE") {
        let disabled = parse_flag(&value)?;
        config
            .capability_mut(&capability_name(capability)?)
            .set_enabled(!disabled);
    } else if let Some(capability) = name.strip_suffix("_EXECUTABLE") {
        config
            .capability_mut(&capability_name(capability)?)
            .set_executable(value);
    } else if let Some(capability) = name.strip_suffix("_API_KEY") {
        config
            .capability_mut(&capability_name(capability)?)
            .set_api_key(value);
    } else if let Some(capability) = name.strip_suffix("_BASE_URL") {
        config
            .capability_mut(&capability_name(capability)?)
            .set_base_url(value);
    } else {
        debug!(key = %name, "unrecognised variable ignored");
    }
    Ok(())
}

fn capability_name(raw: &str) -> Result<String> {
    if raw.is_empty() {
        bail!("capability name is empty");
    }
    Ok(raw.to_ascii_lowercase())
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => bail!("expected true/false, got `{other}`"),
    }
}
