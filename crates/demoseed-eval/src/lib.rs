//! Audits of persisted record sets: validity, duplicate natural keys and
//! optional-field population against the schema's targets.

pub mod engine;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod report;

pub use engine::{AuditEngine, audit_records};
pub use errors::EvalError;
pub use metrics::{AUDIT_VERSION, AuditMetrics, FieldMetrics, PerformanceMetrics, WarningItem};
pub use model::{AuditOptions, AuditResult, Violation};
pub use report::render_report;
