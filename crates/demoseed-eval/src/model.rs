use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::metrics::AuditMetrics;

/// Options for record-set audits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditOptions {
    /// Fail when any record is invalid, duplicated or keyless.
    pub strict: bool,
    /// Limit the number of examples emitted in the report.
    pub max_examples: usize,
    /// Allowed distance, in percentage points, between observed and target
    /// population of optional fields before a warning is raised.
    pub population_tolerance: f64,
    /// Emit violations.json with the full list of violations.
    pub write_violations: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            strict: false,
            max_examples: 20,
            population_tolerance: 15.0,
            write_violations: false,
            out_dir: None,
        }
    }
}

/// One problem found in a record set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub code: String,
    pub path: String,
    pub message: String,
    pub record_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuditResult {
    pub out_dir: PathBuf,
    pub metrics_path: PathBuf,
    pub report_path: PathBuf,
    pub violations_path: Option<PathBuf>,
    pub metrics: AuditMetrics,
    pub report: String,
    pub violations: Vec<Violation>,
}
