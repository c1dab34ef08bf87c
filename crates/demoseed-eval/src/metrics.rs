use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metrics contract version for record-set audits.
pub const AUDIT_VERSION: &str = "0.1";

/// Machine-readable audit of one record set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditMetrics {
    pub audit_version: String,
    pub record_type: String,
    pub source: String,
    pub audited_at: DateTime<Utc>,
    pub records: u64,
    pub valid: u64,
    pub invalid: u64,
    /// Records whose natural key repeats an earlier record.
    pub duplicate_keys: u64,
    /// Records without a usable natural key.
    pub missing_keys: u64,
    /// Invalid records per violation kind.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub violations_by_kind: BTreeMap<String, u64>,
    pub fields: Vec<FieldMetrics>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<WarningItem>,
    pub performance: PerformanceMetrics,
}

impl AuditMetrics {
    pub fn is_clean(&self) -> bool {
        self.invalid == 0 && self.duplicate_keys == 0 && self.missing_keys == 0
    }
}

/// Population of one top-level field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMetrics {
    pub field: String,
    pub required: bool,
    pub populated: u64,
    /// Share of records carrying a non-empty value, 0-100.
    pub population_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_pct: Option<u8>,
}

/// Structured warning entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningItem {
    pub code: String,
    pub path: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub load_ms: u128,
    pub audit_ms: u128,
    pub total_ms: u128,
}
