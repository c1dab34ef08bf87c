use demoseed_core::{RecordSchema, ViolationKind, accept_record, validate_record, validate_schema};
use serde_json::json;

fn product_schema() -> RecordSchema {
    serde_json::from_value(json!({
        "name": "products",
        "natural_key": { "fields": ["name"] },
        "fields": [
            { "name": "name", "kind": { "type": "string", "max_length": 60 } },
            { "name": "list_price", "kind": { "type": "number", "min": 0.0 } },
            { "name": "cost", "kind": { "type": "number", "min": 0.0 }, "required": false, "populate_pct": 70 },
            { "name": "kind", "kind": { "type": "enum", "values": ["consu", "service"] } },
            { "name": "ref", "kind": { "type": "sequence", "prefix": "P" } },
            {
                "name": "variants",
                "required": false,
                "kind": {
                    "type": "list",
                    "max_items": 3,
                    "item": {
                        "type": "object",
                        "fields": [
                            { "name": "attribute", "kind": { "type": "string" } },
                            { "name": "display_type", "kind": { "type": "enum", "values": ["radio", "select", "color"] } }
                        ]
                    }
                }
            }
        ],
        "constraints": [
            { "kind": "not_greater_than", "lesser": "cost", "greater": "list_price" }
        ]
    }))
    .expect("parse schema")
}

#[test]
fn schema_from_manifest_json_is_valid() {
    let schema = product_schema();
    validate_schema(&schema).expect("valid schema");
    assert_eq!(schema.sequence_fields().count(), 1);
}

#[test]
fn nested_violation_reports_path() {
    let schema = product_schema();
    let candidate = json!({
        "name": "Oak Desk",
        "list_price": 320.0,
        "kind": "consu",
        "variants": [
            { "attribute": "Finish", "display_type": "radio" },
            { "attribute": "Size", "display_type": "dropdown" }
        ]
    });

    let violation = validate_record(&schema, &candidate).unwrap_err();
    assert_eq!(violation.field, "variants[1].display_type");
    assert_eq!(violation.kind, ViolationKind::NotInEnum);
}

#[test]
fn missing_required_field_rejects_record() {
    let schema = product_schema();
    let violation = validate_record(&schema, &json!({"name": "Desk", "kind": "consu"})).unwrap_err();
    assert_eq!(violation.field, "list_price");
    assert_eq!(violation.kind, ViolationKind::Missing);
}

#[test]
fn cross_field_constraint_is_checked() {
    let schema = product_schema();
    let candidate = json!({
        "name": "Lamp",
        "list_price": 20.0,
        "cost": 35.0,
        "kind": "consu"
    });
    let violation = validate_record(&schema, &candidate).unwrap_err();
    assert_eq!(violation.kind, ViolationKind::Constraint);
    assert_eq!(violation.field, "cost");
}

#[test]
fn accept_drops_undeclared_and_sequence_fields() {
    let schema = product_schema();
    let candidate = json!({
        "name": "Chair",
        "list_price": 45,
        "kind": "service",
        "ref": "P9999",
        "colour_notes": "not declared"
    });

    let record = accept_record(&schema, candidate).expect("accepted");
    let mut keys: Vec<&str> = record.keys().map(String::as_str).collect();
    keys.sort();
    assert_eq!(keys, vec!["kind", "list_price", "name"]);
}

#[test]
fn non_object_candidate_is_rejected() {
    let schema = product_schema();
    let violation = validate_record(&schema, &json!(["Chair"])).unwrap_err();
    assert_eq!(violation.kind, ViolationKind::NotAnObject);
    assert_eq!(violation.field, "$");
}

#[test]
fn natural_key_must_be_required() {
    let mut schema = product_schema();
    schema.natural_key.fields = vec!["cost".to_string()];
    let err = validate_schema(&schema).unwrap_err();
    assert!(err.to_string().contains("natural key field must be required"));
}
