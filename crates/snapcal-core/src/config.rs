use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use snapcal_provider::ProviderConfig;
use snapcal_schema::EventDefaults;

use crate::pipeline::DEFAULT_MAX_IMAGE_BYTES;

pub const CONFIG_FILE: &str = "main.yaml";

fn default_max_image_bytes() -> usize {
    DEFAULT_MAX_IMAGE_BYTES
}

fn default_max_output_tokens() -> u32 {
    8192
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractionConfig {
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: default_max_image_bytes(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapcalConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub defaults: EventDefaults,
}

/// Substitute every `${VAR}` with its value. Unset variables become empty;
/// an unterminated `${` is kept as written.
pub fn resolve_env_var(raw: &str) -> String {
    let mut resolved = String::with_capacity(raw.len());
    let mut remaining = raw;

    while let Some((before, after)) = remaining.split_once("${") {
        resolved.push_str(before);
        let Some((name, rest)) = after.split_once('}') else {
            resolved.push_str("${");
            resolved.push_str(after);
            return resolved;
        };
        resolved.push_str(&std::env::var(name).unwrap_or_default());
        remaining = rest;
    }

    resolved.push_str(remaining);
    resolved
}

/// Load `<root>/main.yaml`, resolve `${VAR}` references and validate.
pub fn load_config(root: &Path) -> Result<SnapcalConfig> {
    let mut config = parse_config(&root.join(CONFIG_FILE))?;
    resolve_config_env(&mut config);
    validate_config(&config)?;
    Ok(config)
}

fn parse_config(path: &Path) -> Result<SnapcalConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))
}

fn resolve_config_env(config: &mut SnapcalConfig) {
    let provider = &mut config.provider;
    if let Some(key) = &mut provider.api_key {
        *key = resolve_env_var(key);
    }
    if let Some(url) = &mut provider.base_url {
        *url = resolve_env_var(url);
    }
    provider.model = resolve_env_var(&provider.model);
    config.defaults.calendar = resolve_env_var(&config.defaults.calendar);
}

pub fn validate_config(config: &SnapcalConfig) -> Result<()> {
    let has_key = config
        .provider
        .api_key
        .as_deref()
        .is_some_and(|k| !k.trim().is_empty());
    if !has_key {
        return Err(anyhow!(
            "provider.api_key is empty (set it in {CONFIG_FILE} or via ${{VAR}} reference)"
        ));
    }

    if config.provider.model.trim().is_empty() {
        return Err(anyhow!("provider.model is empty"));
    }

    if config.defaults.calendar.trim().is_empty() {
        return Err(anyhow!("defaults.calendar is empty"));
    }

    if config.extraction.max_image_bytes == 0 {
        return Err(anyhow!("extraction.max_image_bytes must be greater than zero"));
    }

    Ok(())
}
