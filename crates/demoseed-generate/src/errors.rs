use demoseed_core::{RetryError, Retryable};
use thiserror::Error;

/// Failures talking to a language model.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("request rejected: {0}")]
    InvalidRequest(String),
    #[error("unreadable response: {0}")]
    InvalidResponse(String),
    #[error("client setup failed: {0}")]
    Setup(String),
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        matches!(self, LlmError::RateLimited(_) | LlmError::Transient(_))
    }
}

/// Errors emitted while generating records.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The completion call failed for good (fatal or retries exhausted).
    #[error(transparent)]
    Completion(#[from] RetryError<LlmError>),
    /// The response held no JSON array at all.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// Every candidate in the batch was invalid or a duplicate.
    #[error("no usable records: {candidates} candidate(s), {invalid} invalid, {duplicates} duplicate")]
    NoUsableOutput {
        candidates: usize,
        invalid: usize,
        duplicates: usize,
    },
    #[error("failed to persist {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: demoseed_core::Error,
    },
    #[error("cannot load existing record set: {0}")]
    Existing(#[source] demoseed_core::Error),
}

impl GenerationError {
    /// Batch-level failures that a run tolerates up to its consecutive limit.
    pub fn is_batch_failure(&self) -> bool {
        matches!(
            self,
            GenerationError::MalformedResponse(_) | GenerationError::NoUsableOutput { .. }
        )
    }
}
