use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use demoseed_core::{
    Record, RecordSchema, load_record_set, validate_record, write_bytes_atomic, write_json_atomic,
};
use serde_json::Value;
use tracing::info;

use crate::errors::EvalError;
use crate::metrics::{AUDIT_VERSION, AuditMetrics, FieldMetrics, PerformanceMetrics, WarningItem};
use crate::model::{AuditOptions, AuditResult, Violation};
use crate::report::render_report;

/// Audit persisted record sets against their schema.
#[derive(Debug, Clone)]
pub struct AuditEngine {
    options: AuditOptions,
}

impl AuditEngine {
    pub fn new(options: AuditOptions) -> Self {
        Self { options }
    }

    /// Audit the record set at `path` and write `metrics.json` and
    /// `report.md` (plus `violations.json` when asked) next to it, or into
    /// the configured output directory.
    pub fn run(&self, schema: &RecordSchema, path: &Path) -> Result<AuditResult, EvalError> {
        let total_start = Instant::now();
        let records = load_record_set(path)?;
        let load_ms = total_start.elapsed().as_millis();

        let audit_start = Instant::now();
        let (mut metrics, violations) =
            audit_records(schema, &records, self.options.population_tolerance);
        metrics.source = path.display().to_string();
        metrics.performance = PerformanceMetrics {
            load_ms,
            audit_ms: audit_start.elapsed().as_millis(),
            total_ms: total_start.elapsed().as_millis(),
        };

        let report = render_report(&metrics, &violations, self.options.max_examples);
        let out_dir = match &self.options.out_dir {
            Some(dir) => dir.clone(),
            None => path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };

        let metrics_path = out_dir.join("metrics.json");
        write_json_atomic(&metrics_path, &metrics).map_err(EvalError::Write)?;

        let report_path = out_dir.join("report.md");
        write_bytes_atomic(&report_path, report.as_bytes()).map_err(EvalError::Write)?;

        let violations_path = if self.options.write_violations {
            let path = out_dir.join("violations.json");
            write_json_atomic(&path, &violations).map_err(EvalError::Write)?;
            Some(path)
        } else {
            None
        };

        info!(
            record_type = %metrics.record_type,
            records = metrics.records,
            invalid = metrics.invalid,
            duplicate_keys = metrics.duplicate_keys,
            warnings = metrics.warnings.len(),
            "record set audited"
        );

        if self.options.strict && !violations.is_empty() {
            return Err(EvalError::Violations(violations.len() as u64));
        }

        Ok(AuditResult {
            out_dir,
            metrics_path,
            report_path,
            violations_path,
            metrics,
            report,
            violations,
        })
    }
}

/// Audit records in memory. `source` and timings are left for the caller.
pub fn audit_records(
    schema: &RecordSchema,
    records: &[Record],
    population_tolerance: f64,
) -> (AuditMetrics, Vec<Violation>) {
    let key_path = schema.natural_key.fields.join("+");
    let matching = schema.natural_key.matching;

    let mut violations = Vec::new();
    let mut violations_by_kind: BTreeMap<String, u64> = BTreeMap::new();
    let mut seen_keys = HashSet::new();
    let mut invalid = 0;
    let mut duplicate_keys = 0;
    let mut missing_keys = 0;

    for (index, record) in records.iter().enumerate() {
        if let Err(violation) = validate_record(schema, &Value::Object(record.clone())) {
            invalid += 1;
            *violations_by_kind
                .entry(violation.kind.as_str().to_string())
                .or_default() += 1;
            violations.push(Violation {
                code: "invalid_record".to_string(),
                path: violation.field.clone(),
                message: violation.to_string(),
                record_index: index,
                example: record.get(&violation.field).map(Value::to_string),
            });
        }

        match schema.natural_key.value_of(record) {
            Some(key) => {
                if !seen_keys.insert(matching.normalize(&key)) {
                    duplicate_keys += 1;
                    violations.push(Violation {
                        code: "duplicate_key".to_string(),
                        path: key_path.clone(),
                        message: "natural key repeats an earlier record".to_string(),
                        record_index: index,
                        example: Some(key),
                    });
                }
            }
            None => {
                missing_keys += 1;
                violations.push(Violation {
                    code: "missing_key".to_string(),
                    path: key_path.clone(),
                    message: "record has no natural key value".to_string(),
                    record_index: index,
                    example: None,
                });
            }
        }
    }

    let total = records.len() as u64;
    let mut warnings = Vec::new();
    if records.is_empty() {
        warnings.push(WarningItem {
            code: "empty_record_set".to_string(),
            path: schema.name.clone(),
            message: "record set has no records".to_string(),
            hint: Some("run generation for this record type first".to_string()),
        });
    }

    let fields: Vec<FieldMetrics> = schema
        .fields
        .iter()
        .map(|field| {
            let populated = records
                .iter()
                .filter(|record| record.get(&field.name).is_some_and(is_populated))
                .count() as u64;
            let population_pct = if total == 0 {
                0.0
            } else {
                (populated as f64 * 1000.0 / total as f64).round() / 10.0
            };
            FieldMetrics {
                field: field.name.clone(),
                required: field.required,
                populated,
                population_pct,
                target_pct: field.populate_pct,
            }
        })
        .collect();

    if total > 0 {
        for field in fields.iter().filter(|field| !field.required) {
            let Some(target) = field.target_pct else {
                continue;
            };
            if (field.population_pct - f64::from(target)).abs() > population_tolerance {
                warnings.push(WarningItem {
                    code: "population_off_target".to_string(),
                    path: field.field.clone(),
                    message: format!(
                        "populated in {:.1}% of records, target {target}%",
                        field.population_pct
                    ),
                    hint: Some("adjust the field hint or populate_pct".to_string()),
                });
            }
        }
    }

    violations.sort_by(|a, b| {
        (a.record_index, a.code.as_str()).cmp(&(b.record_index, b.code.as_str()))
    });

    let metrics = AuditMetrics {
        audit_version: AUDIT_VERSION.to_string(),
        record_type: schema.name.clone(),
        source: String::new(),
        audited_at: Utc::now(),
        records: total,
        valid: total - invalid,
        invalid,
        duplicate_keys,
        missing_keys,
        violations_by_kind,
        fields,
        warnings,
        performance: PerformanceMetrics::default(),
    };
    (metrics, violations)
}

fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn populated_ignores_blank_values() {
        assert!(!is_populated(&json!(null)));
        assert!(!is_populated(&json!("  ")));
        assert!(!is_populated(&json!([])));
        assert!(is_populated(&json!(0)));
        assert!(is_populated(&json!(false)));
    }
}
