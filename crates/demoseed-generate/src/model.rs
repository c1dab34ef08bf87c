use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use demoseed_core::{Record, SchemaViolation};
use serde::{Deserialize, Serialize};

/// Records accepted from one generation call.
#[derive(Debug, Clone, Default)]
pub struct GeneratedBatch {
    pub requested: usize,
    /// Candidates found in the response, before validation.
    pub received: usize,
    pub records: Vec<Record>,
    /// Natural key of each accepted record, same order as `records`.
    pub keys: Vec<String>,
    pub rejections: Vec<Rejection>,
}

impl GeneratedBatch {
    pub fn count(&self, reason: fn(&RejectionReason) -> bool) -> usize {
        self.rejections
            .iter()
            .filter(|rejection| reason(&rejection.reason))
            .count()
    }

    pub fn invalid(&self) -> usize {
        self.count(|reason| matches!(reason, RejectionReason::Invalid(_)))
    }

    pub fn duplicates(&self) -> usize {
        self.count(|reason| matches!(reason, RejectionReason::Duplicate))
    }

    pub fn excess(&self) -> usize {
        self.count(|reason| matches!(reason, RejectionReason::Excess))
    }
}

/// A dropped candidate and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    /// Position in the model's array.
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub reason: RejectionReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    Invalid(SchemaViolation),
    Duplicate,
    /// More records than requested.
    Excess,
}

impl RejectionReason {
    /// Stable label for aggregation (`invalid.missing`, `duplicate`, ...).
    pub fn code(&self) -> String {
        match self {
            RejectionReason::Invalid(violation) => format!("invalid.{}", violation.kind.as_str()),
            RejectionReason::Duplicate => "duplicate".to_string(),
            RejectionReason::Excess => "excess".to_string(),
        }
    }
}

/// Outcome of one batch within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub index: usize,
    pub requested: usize,
    pub received: usize,
    pub accepted: usize,
    pub invalid: usize,
    pub duplicates: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a generation run, written as `generation_report.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub run_id: String,
    pub record_type: String,
    pub output: String,
    pub target_count: usize,
    /// Records already present when the run started.
    pub existing: usize,
    pub accepted: usize,
    pub invalid: usize,
    pub duplicates: usize,
    pub excess: usize,
    pub failed_batches: usize,
    /// The consecutive-failure limit ended the run before the target was met.
    pub stopped_early: bool,
    pub total_records: usize,
    pub batches: Vec<BatchReport>,
    pub rejections_by_reason: BTreeMap<String, u64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl GenerationReport {
    pub fn new(
        run_id: impl Into<String>,
        record_type: impl Into<String>,
        output: impl Into<String>,
        target_count: usize,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            record_type: record_type.into(),
            output: output.into(),
            target_count,
            existing: 0,
            accepted: 0,
            invalid: 0,
            duplicates: 0,
            excess: 0,
            failed_batches: 0,
            stopped_early: false,
            total_records: 0,
            batches: Vec::new(),
            rejections_by_reason: BTreeMap::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record_batch(&mut self, batch: &GeneratedBatch) {
        self.accepted += batch.records.len();
        self.invalid += batch.invalid();
        self.duplicates += batch.duplicates();
        self.excess += batch.excess();
        for rejection in &batch.rejections {
            *self
                .rejections_by_reason
                .entry(rejection.reason.code())
                .or_insert(0) += 1;
        }
        self.batches.push(BatchReport {
            index: self.batches.len(),
            requested: batch.requested,
            received: batch.received,
            accepted: batch.records.len(),
            invalid: batch.invalid(),
            duplicates: batch.duplicates(),
            error: None,
        });
    }

    /// Count a batch that produced nothing usable.
    pub fn record_failed_batch(
        &mut self,
        requested: usize,
        received: usize,
        invalid: usize,
        duplicates: usize,
        error: &str,
    ) {
        self.failed_batches += 1;
        self.invalid += invalid;
        self.duplicates += duplicates;
        self.batches.push(BatchReport {
            index: self.batches.len(),
            requested,
            received,
            accepted: 0,
            invalid,
            duplicates,
            error: Some(error.to_string()),
        });
    }

    pub fn is_complete(&self) -> bool {
        self.total_records >= self.target_count
    }
}
