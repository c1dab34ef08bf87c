use thiserror::Error;

/// Errors emitted by the audit engine.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("invalid record set: {0}")]
    InvalidRecordSet(#[from] demoseed_core::Error),
    #[error("audit failed with {0} violation(s)")]
    Violations(u64),
    #[error("failed to write audit output: {0}")]
    Write(demoseed_core::Error),
}
