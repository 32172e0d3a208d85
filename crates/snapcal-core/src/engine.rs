use std::sync::Arc;

use snapcal_provider::{InlineImage, ModelClient, ModelRequest};
use snapcal_schema::CandidateEvent;
use tokio_util::sync::CancellationToken;

use crate::parse::parse_candidates;
use crate::ExtractionError;

/// Sends one prompt to the model and reduces the reply to candidates.
#[derive(Clone)]
pub struct ExtractionEngine {
    client: Arc<dyn ModelClient>,
    model: String,
    max_output_tokens: u32,
}

impl ExtractionEngine {
    pub fn new(client: Arc<dyn ModelClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_output_tokens: 8192,
        }
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = max;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// The model call is the only suspension point. Cancellation wins over a
    /// pending call; a failed call is surfaced as-is and never retried.
    pub async fn extract_candidates(
        &self,
        prompt: String,
        image: Option<InlineImage>,
        cancel: &CancellationToken,
    ) -> Result<Vec<CandidateEvent>, ExtractionError> {
        let mut request =
            ModelRequest::new(self.model.clone(), prompt).with_max_output_tokens(self.max_output_tokens);
        if let Some(image) = image {
            request = request.with_image(image);
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("extraction cancelled during model call");
                return Err(ExtractionError::Cancelled);
            }
            result = self.client.generate(request) => result?,
        };

        tracing::debug!(
            chars = response.text.len(),
            stop_reason = response.stop_reason.as_deref().unwrap_or("unknown"),
            "model response received"
        );

        Ok(parse_candidates(&response.text))
    }
}
