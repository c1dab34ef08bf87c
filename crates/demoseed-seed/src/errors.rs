use demoseed_core::{RetryError, Retryable};
use thiserror::Error;

use crate::seeder::SeedResult;

/// Failures reported by a remote business API.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// Credentials rejected; every later call would fail the same way.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// The entity or a field does not exist on the remote side.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    /// The payload was refused (validation, constraint, duplicate).
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl RemoteError {
    /// Errors that end a seeding run instead of a single record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RemoteError::Auth(_) | RemoteError::SchemaMismatch(_))
    }
}

impl Retryable for RemoteError {
    fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::RateLimited(_) | RemoteError::Transient(_))
    }
}

/// Errors emitted while seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    /// A required reference has no remote counterpart.
    #[error("dependency unresolved: no {entity} with {field}={value}")]
    DependencyUnresolved {
        entity: String,
        field: String,
        value: String,
    },
    /// A structural reference shared by the record set is missing remotely.
    #[error("structural prerequisite missing: no {entity} with {field}={value}")]
    PrerequisiteMissing {
        entity: String,
        field: String,
        value: String,
    },
    #[error("record has no value for key field '{0}'")]
    MissingKey(String),
    #[error(transparent)]
    Remote(#[from] RetryError<RemoteError>),
    /// The run stopped early; `result` holds what was done before.
    #[error("seeding aborted: {reason}")]
    Aborted {
        result: Box<SeedResult>,
        #[source]
        reason: Box<SeedError>,
    },
}

impl SeedError {
    /// Errors that abort the whole run rather than one record.
    pub fn is_run_fatal(&self) -> bool {
        match self {
            SeedError::PrerequisiteMissing { .. } | SeedError::Aborted { .. } => true,
            SeedError::Remote(err) => err.source.is_fatal(),
            _ => false,
        }
    }
}
