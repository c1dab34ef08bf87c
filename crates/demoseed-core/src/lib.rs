//! Core contracts and helpers for demoseed.
//!
//! This crate defines the record schema contract, natural-key exclusion
//! tracking, the retry wrapper shared by LLM and remote-API calls, and the
//! record-set persistence helpers used by both pipeline stages.

pub mod atomic;
pub mod constraints;
pub mod context;
pub mod error;
pub mod exclusion;
pub mod graph;
pub mod links;
pub mod record;
pub mod redaction;
pub mod retry;
pub mod schema;
pub mod types;
pub mod validation;

pub use atomic::{write_bytes_atomic, write_json_atomic};
pub use constraints::Constraint;
pub use context::RunContext;
pub use error::{Error, Result};
pub use exclusion::{DEFAULT_RENDER_LIMIT, ExclusionTracker};
pub use graph::{DependencyNode, DependencyReport, build_dependency_report};
pub use links::{DependencyLink, LinkRequirement};
pub use record::{
    Record, load_existing_records, load_record_set, natural_key_of, write_record_set,
};
pub use redaction::{mask_secret, redact_url};
pub use retry::{RetryError, RetryPolicy, Retryable, retry, retry_with};
pub use schema::{FieldSpec, NaturalKey, RecordSchema};
pub use types::{FieldKind, KeyMatching, StringFormat};
pub use validation::{
    SchemaViolation, ViolationKind, accept_record, validate_record, validate_schema,
};

/// Current contract version for manifests and record-set artifacts.
pub const CONTRACT_VERSION: &str = "0.1";
