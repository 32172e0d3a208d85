use snapcal_provider::ModelCallError;
use thiserror::Error;

/// Caller-visible outcomes of an extraction call.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Blank text or an empty image; rejected before any model call.
    #[error("input is empty")]
    EmptyInput,

    #[error("unsupported media type: {0} (only images can be processed)")]
    UnsupportedMediaType(String),

    #[error("image is {size} bytes, limit is {limit}")]
    ImageTooLarge { size: usize, limit: usize },

    #[error("model call failed: {0}")]
    ModelCallFailed(#[from] ModelCallError),

    #[error("extraction cancelled")]
    Cancelled,

    /// The pipeline ran to completion without a usable event. `candidates`
    /// counts what the model returned before validation, so zero means the
    /// model found nothing and non-zero means everything was rejected.
    #[error("no events found (model returned {candidates} candidates)")]
    NoEventsFound { candidates: usize },
}

impl ExtractionError {
    /// Whether presenting "try again" makes sense for this outcome.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ModelCallFailed(err) => err.is_retryable(),
            Self::Cancelled => true,
            _ => false,
        }
    }
}
