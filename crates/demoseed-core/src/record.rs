use std::path::Path;

use serde_json::Value;

use crate::atomic::write_json_atomic;
use crate::error::{Error, Result};
use crate::schema::RecordSchema;

/// A single record: a JSON object keyed by field name.
pub type Record = serde_json::Map<String, Value>;

/// Load a persisted record set (a JSON array of objects).
pub fn load_record_set(path: &Path) -> Result<Vec<Record>> {
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;
    let Value::Array(items) = value else {
        return Err(Error::InvalidRecordSet {
            path: path.display().to_string(),
            message: "expected a JSON array".to_string(),
        });
    };

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            Value::Object(record) => Ok(record),
            _ => Err(Error::InvalidRecordSet {
                path: path.display().to_string(),
                message: format!("element {idx} is not an object"),
            }),
        })
        .collect()
}

/// Like [`load_record_set`], but a missing file yields an empty set.
pub fn load_existing_records(path: &Path) -> Result<Vec<Record>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    load_record_set(path)
}

/// Persist a record set atomically with stable two-space indentation.
pub fn write_record_set(path: &Path, records: &[Record]) -> Result<()> {
    write_json_atomic(path, records)
}

/// Natural key of `record` under `schema`, if every key field is populated.
pub fn natural_key_of(schema: &RecordSchema, record: &Record) -> Option<String> {
    schema.natural_key.value_of(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn load_rejects_non_object_elements() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("set.json");
        std::fs::write(&path, r#"[{"name": "a"}, 3]"#).unwrap();

        let err = load_record_set(&path).unwrap_err();
        assert!(err.to_string().contains("element 1 is not an object"));
    }

    #[test]
    fn write_then_load_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("set.json");
        let records: Vec<Record> = vec![
            json!({"name": "b"}).as_object().unwrap().clone(),
            json!({"name": "a"}).as_object().unwrap().clone(),
        ];

        write_record_set(&path, &records).unwrap();
        let loaded = load_record_set(&path).unwrap();

        assert_eq!(loaded, records);
        assert!(load_existing_records(&dir.path().join("missing.json")).unwrap().is_empty());
    }
}
