pub mod gemini;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use gemini::GeminiProvider;
pub use types::*;

/// External generative-model capability: accepts a prompt plus an optional
/// binary part and returns the response text, or fails.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ModelCallError>;
}

// ============================================================
// Provider Configuration
// ============================================================

/// Provider type identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[default]
    Gemini,
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

/// Configuration for the model backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Provider type
    #[serde(rename = "type", default)]
    pub provider_type: ProviderType,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Custom base URL (optional, uses the provider default)
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: ProviderType::default(),
            api_key: None,
            base_url: None,
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    pub fn new(provider_type: ProviderType) -> Self {
        Self {
            provider_type,
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Create a model client from configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn ModelClient>> {
    let provider: Arc<dyn ModelClient> = match config.provider_type {
        ProviderType::Gemini => {
            let key = config
                .api_key
                .as_ref()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| anyhow!("gemini requires api_key"))?;
            let base_url = config
                .base_url
                .as_deref()
                .unwrap_or(gemini::GEMINI_API_BASE);
            Arc::new(GeminiProvider::with_options(
                key.clone(),
                base_url,
                Duration::from_secs(config.timeout_secs),
            ))
        }
    };
    tracing::info!(
        "created model client: {:?} ({})",
        config.provider_type,
        config.model
    );
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_provider_requires_api_key() {
        let config = ProviderConfig::new(ProviderType::Gemini);
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("gemini requires api_key"));
    }

    #[test]
    fn create_provider_rejects_blank_api_key() {
        let config = ProviderConfig::new(ProviderType::Gemini).with_api_key("   ");
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn create_provider_with_key_succeeds() {
        let config = ProviderConfig::new(ProviderType::Gemini)
            .with_api_key("key")
            .with_base_url("http://localhost:1234");
        assert!(create_provider(&config).is_ok());
    }

    #[test]
    fn provider_config_serialize_deserialize() {
        let config = ProviderConfig::new(ProviderType::Gemini)
            .with_api_key("secret")
            .with_model("gemini-2.5-pro");

        let json = serde_json::to_string(&config).unwrap();
        let parsed: ProviderConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, config);
        assert!(json.contains(r#""type":"gemini""#));
    }

    #[test]
    fn provider_config_fills_defaults() {
        let parsed: ProviderConfig = serde_json::from_str(r#"{"api_key":"k"}"#).unwrap();
        assert_eq!(parsed.provider_type, ProviderType::Gemini);
        assert_eq!(parsed.model, "gemini-2.5-flash");
        assert_eq!(parsed.timeout_secs, 120);
        assert!(parsed.base_url.is_none());
    }
}
