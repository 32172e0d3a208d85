//! Google Gemini API provider
//!
//! https://ai.google.dev/api/generate-content

use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{ModelCallError, ModelClient, ModelRequest, ModelResponse};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROVIDER: &str = "gemini";

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_options(api_key, GEMINI_API_BASE, Duration::from_secs(120))
    }

    pub fn with_options(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn build_request(&self, request: &ModelRequest) -> GeminiRequest {
        let mut parts = vec![GeminiPart::Text {
            text: request.prompt.clone(),
        }];

        if let Some(image) = &request.image {
            parts.push(GeminiPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: image.mime_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(&image.data),
                },
            });
        }

        GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts,
            }],
            generation_config: Some(GeminiGenerationConfig {
                max_output_tokens: Some(request.max_output_tokens),
                response_mime_type: request.response_mime_type.clone(),
            }),
        }
    }
}

#[async_trait]
impl ModelClient for GeminiProvider {
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ModelCallError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, request.model, self.api_key
        );

        let payload = self.build_request(&request);
        tracing::debug!(
            model = %request.model,
            has_image = request.image.is_some(),
            "sending gemini generateContent request"
        );

        let resp = match self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(ModelCallError::Timeout { provider: PROVIDER });
            }
            Err(e) if e.is_connect() => {
                return Err(ModelCallError::Connect {
                    provider: PROVIDER,
                    message: e.to_string(),
                });
            }
            Err(e) => {
                return Err(ModelCallError::Transport {
                    provider: PROVIDER,
                    source: e,
                })
            }
        };

        let status = resp.status();
        if status != StatusCode::OK {
            let text = resp.text().await.unwrap_or_default();
            return Err(ModelCallError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                body: text,
            });
        }

        let body: GeminiResponse =
            resp.json()
                .await
                .map_err(|e| ModelCallError::InvalidResponse {
                    provider: PROVIDER,
                    message: e.to_string(),
                })?;
        Ok(to_model_response(body))
    }
}

/// Missing candidates or content (e.g. a safety block) yield empty text
/// rather than an error; the caller treats that as "no events".
fn to_model_response(body: GeminiResponse) -> ModelResponse {
    let Some(candidate) = body.candidates.first() else {
        if let Some(reason) = body
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            tracing::warn!(reason, "gemini blocked the prompt");
        }
        return ModelResponse {
            input_tokens: body.usage_metadata.as_ref().map(|u| u.prompt_token_count),
            ..ModelResponse::default()
        };
    };

    let mut text = String::new();
    if let Some(content) = &candidate.content {
        for part in &content.parts {
            if let GeminiPart::Text { text: t } = part {
                text.push_str(t);
            }
        }
    }

    let stop_reason = match candidate.finish_reason.as_deref() {
        Some("STOP") => Some("end_turn".to_string()),
        Some("MAX_TOKENS") => Some("max_tokens".to_string()),
        Some("SAFETY") => Some("safety".to_string()),
        Some(r) => Some(r.to_lowercase()),
        None => None,
    };

    ModelResponse {
        text,
        input_tokens: body.usage_metadata.as_ref().map(|u| u.prompt_token_count),
        output_tokens: body
            .usage_metadata
            .as_ref()
            .map(|u| u.candidates_token_count),
        stop_reason,
    }
}

// ============================================================
// Gemini API Types
// ============================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}
