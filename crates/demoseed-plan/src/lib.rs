//! Application manifests: which record types an application needs, how to
//! generate them, and how to seed them into the remote system.

pub mod errors;
pub mod model;
pub mod schema;
pub mod validate;

pub use errors::{IssueSeverity, PlanError, Result, ValidationIssue, ValidationReport};
pub use model::{
    AppManifest, FieldMapping, GenerationSettings, KeyField, RecordType, SeedTarget, Theme,
};
pub use schema::manifest_json_schema;
pub use validate::{
    ValidatedManifest, load_manifest, validate_manifest, validate_manifest_json,
    validate_manifest_semantics,
};
