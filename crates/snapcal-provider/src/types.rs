use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Binary part attached to an image-mode request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub data: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub prompt: String,
    pub image: Option<InlineImage>,
    /// Ask the backend for a JSON-biased response where it supports one.
    pub response_mime_type: Option<String>,
    pub max_output_tokens: u32,
}

fn default_max_output_tokens() -> u32 {
    8192
}

impl ModelRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            image: None,
            response_mime_type: Some("application/json".to_string()),
            max_output_tokens: default_max_output_tokens(),
        }
    }

    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = max;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Concatenated text parts. Empty when the model returned nothing usable.
    pub text: String,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub stop_reason: Option<String>,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum ModelCallError {
    #[error("{provider} api error (timeout) [retryable]: request timed out")]
    Timeout { provider: &'static str },

    #[error("{provider} api error (connect) [retryable]: {message}")]
    Connect {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} api error ({status}): {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} api error: invalid response: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },
}

impl ModelCallError {
    /// Whether a caller may reasonably retry. The pipeline itself never does.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connect { .. } => true,
            Self::Api { status, .. } => matches!(status, 429 | 500..=599),
            Self::Transport { .. } | Self::InvalidResponse { .. } => false,
        }
    }
}
