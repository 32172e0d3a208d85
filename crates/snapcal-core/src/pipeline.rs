use std::sync::Arc;

use anyhow::Result;
use snapcal_provider::{create_provider, InlineImage, ModelClient};
use snapcal_schema::{
    CalendarEvent, EventDefaults, ExtractionContext, ImageInput, Modality, RawExtractionInput,
};
use tokio_util::sync::CancellationToken;

use crate::normalize::normalize;
use crate::{ExtractionEngine, ExtractionError, PromptBuilder, SnapcalConfig};

/// Separates the instruction from user-supplied text in text mode.
const TEXT_DELIMITER: &str = "\n---\n";

pub const DEFAULT_MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// Prompt -> model call -> parse -> normalize. Holds no per-call state, so
/// one instance can serve concurrent extractions.
#[derive(Clone)]
pub struct ExtractionPipeline {
    engine: ExtractionEngine,
    prompts: PromptBuilder,
    defaults: EventDefaults,
    max_image_bytes: usize,
}

impl ExtractionPipeline {
    pub fn new(client: Arc<dyn ModelClient>, model: impl Into<String>) -> Self {
        Self {
            engine: ExtractionEngine::new(client, model),
            prompts: PromptBuilder::new(),
            defaults: EventDefaults::default(),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    pub fn from_config(config: &SnapcalConfig) -> Result<Self> {
        let client = create_provider(&config.provider)?;
        Ok(Self::new(client, config.provider.model.clone())
            .with_defaults(config.defaults.clone())
            .with_max_image_bytes(config.extraction.max_image_bytes)
            .with_max_output_tokens(config.extraction.max_output_tokens))
    }

    pub fn with_defaults(mut self, defaults: EventDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_prompt_builder(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_max_image_bytes(mut self, limit: usize) -> Self {
        self.max_image_bytes = limit;
        self
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.engine = self.engine.with_max_output_tokens(max);
        self
    }

    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    pub async fn extract_from_image(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        ctx: &ExtractionContext,
    ) -> Result<Vec<CalendarEvent>, ExtractionError> {
        self.extract(
            RawExtractionInput::Image(ImageInput::new(bytes, mime_type)),
            ctx,
            &CancellationToken::new(),
        )
        .await
    }

    pub async fn extract_from_text(
        &self,
        text: &str,
        ctx: &ExtractionContext,
    ) -> Result<Vec<CalendarEvent>, ExtractionError> {
        self.extract(RawExtractionInput::text(text), ctx, &CancellationToken::new())
            .await
    }

    /// Run one extraction. Input is validated before the model is called;
    /// `NoEventsFound` is only raised after normalization.
    pub async fn extract(
        &self,
        input: RawExtractionInput,
        ctx: &ExtractionContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<CalendarEvent>, ExtractionError> {
        let modality = input.modality();
        let (prompt, image) = match input {
            RawExtractionInput::Text { content } => {
                let content = content.trim();
                if content.is_empty() {
                    return Err(ExtractionError::EmptyInput);
                }
                let prompt = format!(
                    "{}{TEXT_DELIMITER}{content}",
                    self.prompts.build(Modality::Text, ctx)
                );
                (prompt, None)
            }
            RawExtractionInput::Image(image) => {
                let image = self.validate_image(image)?;
                (self.prompts.build(Modality::Image, ctx), Some(image))
            }
        };

        tracing::debug!(%modality, timezone = %ctx.timezone_name, "starting extraction");

        let candidates = self.engine.extract_candidates(prompt, image, cancel).await?;
        let candidate_count = candidates.len();
        let events = normalize(candidates, ctx, &self.defaults);

        tracing::info!(
            %modality,
            candidates = candidate_count,
            events = events.len(),
            "extraction finished"
        );

        if events.is_empty() {
            return Err(ExtractionError::NoEventsFound {
                candidates: candidate_count,
            });
        }
        Ok(events)
    }

    fn validate_image(&self, image: ImageInput) -> Result<InlineImage, ExtractionError> {
        if image.bytes.is_empty() {
            return Err(ExtractionError::EmptyInput);
        }

        let mime_type = image.mime_type.trim().to_ascii_lowercase();
        if !mime_type.starts_with("image/") {
            return Err(ExtractionError::UnsupportedMediaType(image.mime_type));
        }

        if image.bytes.len() > self.max_image_bytes {
            return Err(ExtractionError::ImageTooLarge {
                size: image.bytes.len(),
                limit: self.max_image_bytes,
            });
        }

        Ok(InlineImage {
            data: image.bytes,
            mime_type,
        })
    }
}
