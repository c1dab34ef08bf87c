use demoseed_core::RecordSchema;
use demoseed_eval::{AuditEngine, AuditOptions, EvalError, audit_records};
use serde_json::{Value, json};

fn customers_schema() -> RecordSchema {
    serde_json::from_value(json!({
        "name": "customers",
        "natural_key": {"fields": ["email"], "matching": "case_insensitive"},
        "fields": [
            {"name": "name", "kind": {"type": "string"}},
            {"name": "email", "kind": {"type": "string", "format": "email"}},
            {"name": "phone", "kind": {"type": "string"}, "required": false, "populate_pct": 50},
            {"name": "segment", "kind": {"type": "enum", "values": ["retail", "wholesale"]}}
        ]
    }))
    .unwrap()
}

fn records(value: Value) -> Vec<demoseed_core::Record> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item.as_object().cloned().unwrap())
        .collect()
}

#[test]
fn counts_invalid_duplicate_and_keyless_records() {
    let schema = customers_schema();
    let data = records(json!([
        {"name": "Ada", "email": "ada@example.com", "segment": "retail", "phone": "555-0100"},
        {"name": "Ada Again", "email": "ADA@example.com", "segment": "retail"},
        {"name": "Grace", "email": "grace@example.com", "segment": "government"},
        {"name": "Nobody", "segment": "wholesale"}
    ]));

    let (metrics, violations) = audit_records(&schema, &data, 15.0);

    assert_eq!(metrics.records, 4);
    assert_eq!(metrics.invalid, 2);
    assert_eq!(metrics.valid, 2);
    assert_eq!(metrics.duplicate_keys, 1);
    assert_eq!(metrics.missing_keys, 1);
    assert_eq!(metrics.violations_by_kind.get("not_in_enum"), Some(&1));
    assert_eq!(metrics.violations_by_kind.get("missing"), Some(&1));
    assert!(!metrics.is_clean());

    let codes: Vec<(usize, &str)> = violations
        .iter()
        .map(|violation| (violation.record_index, violation.code.as_str()))
        .collect();
    assert_eq!(
        codes,
        vec![
            (1, "duplicate_key"),
            (2, "invalid_record"),
            (3, "invalid_record"),
            (3, "missing_key"),
        ]
    );
}

#[test]
fn optional_population_is_compared_with_target() {
    let schema = customers_schema();
    let data = records(json!([
        {"name": "A", "email": "a@example.com", "segment": "retail", "phone": "1"},
        {"name": "B", "email": "b@example.com", "segment": "retail"},
        {"name": "C", "email": "c@example.com", "segment": "retail"},
        {"name": "D", "email": "d@example.com", "segment": "retail", "phone": ""}
    ]));

    let (metrics, _) = audit_records(&schema, &data, 15.0);
    let phone = metrics
        .fields
        .iter()
        .find(|field| field.field == "phone")
        .unwrap();
    assert_eq!(phone.populated, 1);
    assert_eq!(phone.population_pct, 25.0);
    assert_eq!(phone.target_pct, Some(50));
    assert!(metrics
        .warnings
        .iter()
        .any(|warning| warning.code == "population_off_target" && warning.path == "phone"));

    let (lenient, _) = audit_records(&schema, &data, 30.0);
    assert!(lenient.warnings.is_empty());
    assert!(lenient.is_clean());
}

#[test]
fn engine_writes_metrics_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("customers.json");
    std::fs::write(
        &path,
        serde_json::to_vec(&json!([
            {"name": "Ada", "email": "ada@example.com", "segment": "retail", "phone": "1"},
            {"name": "Bob", "email": "bob@example.com", "segment": "wholesale"}
        ]))
        .unwrap(),
    )
    .unwrap();

    let out_dir = dir.path().join("audit");
    let engine = AuditEngine::new(AuditOptions {
        out_dir: Some(out_dir.clone()),
        write_violations: true,
        ..AuditOptions::default()
    });
    let result = engine.run(&customers_schema(), &path).unwrap();

    assert!(result.metrics.is_clean());
    assert!(result.metrics_path.exists());
    assert_eq!(result.violations_path, Some(out_dir.join("violations.json")));
    let report = std::fs::read_to_string(&result.report_path).unwrap();
    assert!(report.starts_with("# Demoseed Record Audit"));
    assert!(report.contains("| phone | false | 1 | 50.0 | 50 |"));
    assert!(report.contains("ready to seed"));
}

#[test]
fn rerun_replaces_outputs_without_leaving_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("customers.json");
    std::fs::write(&path, r#"[{"name": "Ada", "email": "ada@example.com", "segment": "retail"}]"#).unwrap();
    let engine = AuditEngine::new(AuditOptions::default());

    engine.run(&customers_schema(), &path).unwrap();
    std::fs::write(&path, r#"[{"name": "Ada", "email": "ada@example.com", "segment": "retail"}, {"name": "Bob", "segment": "retail"}]"#).unwrap();
    let second = engine.run(&customers_schema(), &path).unwrap();

    let written: Value = serde_json::from_str(&std::fs::read_to_string(&second.metrics_path).unwrap()).unwrap();
    assert_eq!(written["records"], json!(2));
    let leftovers: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left: {leftovers:?}");
}

#[test]
fn unwritable_output_directory_is_a_write_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("customers.json");
    std::fs::write(&path, r#"[{"name": "Ada", "email": "ada@example.com", "segment": "retail"}]"#).unwrap();
    let blocker = dir.path().join("audit");
    std::fs::write(&blocker, "not a directory").unwrap();

    let engine = AuditEngine::new(AuditOptions {
        out_dir: Some(blocker),
        ..AuditOptions::default()
    });
    let err = engine.run(&customers_schema(), &path).unwrap_err();
    assert!(matches!(err, EvalError::Write(_)));
}

#[test]
fn strict_audit_fails_on_violations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("customers.json");
    std::fs::write(
        &path,
        r#"[{"name": "Ada", "email": "ada@example.com", "segment": "retail"},
            {"name": "Ada", "email": "ada@example.com", "segment": "retail"}]"#,
    )
    .unwrap();

    let engine = AuditEngine::new(AuditOptions {
        strict: true,
        ..AuditOptions::default()
    });
    let err = engine.run(&customers_schema(), &path).unwrap_err();
    assert!(matches!(err, EvalError::Violations(1)));
    assert!(dir.path().join("report.md").exists());
}

#[test]
fn malformed_record_set_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("customers.json");
    std::fs::write(&path, r#"{"not": "an array"}"#).unwrap();

    let err = AuditEngine::new(AuditOptions::default())
        .run(&customers_schema(), &path)
        .unwrap_err();
    assert!(matches!(err, EvalError::InvalidRecordSet(_)));
}
