use std::collections::BTreeMap;

use serde_json::Value;

use crate::exclusion::ExclusionTracker;
use crate::record::Record;
use crate::schema::RecordSchema;
use crate::types::FieldKind;

/// Per-run state owned by the caller of a generation run.
///
/// Holds the exclusion tracker and the counters behind locally assigned
/// sequence fields, so independent runs never share counters.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: String,
    exclusions: ExclusionTracker,
    sequences: BTreeMap<String, u64>,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, exclusions: ExclusionTracker) -> Self {
        Self {
            run_id: run_id.into(),
            exclusions,
            sequences: BTreeMap::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn exclusions(&self) -> &ExclusionTracker {
        &self.exclusions
    }

    pub fn exclusions_mut(&mut self) -> &mut ExclusionTracker {
        &mut self.exclusions
    }

    /// Next formatted value of the named sequence (`WH0001`, `WH0002`, ...).
    pub fn next_sequence(&mut self, name: &str, prefix: &str, width: usize) -> String {
        let counter = self.sequences.entry(name.to_string()).or_insert(0);
        *counter += 1;
        format!("{prefix}{:0width$}", *counter)
    }

    /// Fill every sequence field the record does not carry yet.
    pub fn assign_sequences(&mut self, schema: &RecordSchema, record: &mut Record) {
        for field in schema.sequence_fields() {
            if let FieldKind::Sequence { prefix, width } = &field.kind {
                if record.get(&field.name).is_some_and(|value| !value.is_null()) {
                    continue;
                }
                let value = self.next_sequence(&sequence_key(schema, &field.name), prefix, *width);
                record.insert(field.name.clone(), Value::String(value));
            }
        }
    }

    /// Continue from a previously persisted record set: register its natural
    /// keys and advance sequences past the highest value already used.
    pub fn resume_from(&mut self, schema: &RecordSchema, records: &[Record]) {
        let keys: Vec<String> = records
            .iter()
            .filter_map(|record| schema.natural_key.value_of(record))
            .collect();
        self.exclusions.register_batch(keys);

        for field in schema.sequence_fields() {
            let FieldKind::Sequence { prefix, .. } = &field.kind else {
                continue;
            };
            let highest = records
                .iter()
                .filter_map(|record| record.get(&field.name).and_then(Value::as_str))
                .filter_map(|value| value.strip_prefix(prefix.as_str()))
                .filter_map(|digits| digits.parse::<u64>().ok())
                .max()
                .unwrap_or(0);
            let counter = self
                .sequences
                .entry(sequence_key(schema, &field.name))
                .or_insert(0);
            *counter = (*counter).max(highest);
        }
    }
}

fn sequence_key(schema: &RecordSchema, field: &str) -> String {
    format!("{}.{field}", schema.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, NaturalKey};
    use crate::types::KeyMatching;
    use serde_json::json;

    fn warehouses() -> RecordSchema {
        RecordSchema {
            name: "warehouses".to_string(),
            description: None,
            natural_key: NaturalKey::single("name", KeyMatching::Exact),
            fields: vec![
                FieldSpec::new(
                    "name",
                    FieldKind::String {
                        format: None,
                        max_length: None,
                    },
                ),
                FieldSpec::new(
                    "code",
                    FieldKind::Sequence {
                        prefix: "WH".to_string(),
                        width: 3,
                    },
                ),
            ],
            constraints: Vec::new(),
        }
    }

    #[test]
    fn independent_contexts_do_not_share_counters() {
        let schema = warehouses();
        let mut first = RunContext::new("a", ExclusionTracker::new(KeyMatching::Exact));
        let mut second = RunContext::new("b", ExclusionTracker::new(KeyMatching::Exact));

        let mut record = Record::new();
        first.assign_sequences(&schema, &mut record);
        let mut other = Record::new();
        first.assign_sequences(&schema, &mut other);
        let mut fresh = Record::new();
        second.assign_sequences(&schema, &mut fresh);

        assert_eq!(record["code"], json!("WH001"));
        assert_eq!(other["code"], json!("WH002"));
        assert_eq!(fresh["code"], json!("WH001"));
    }

    #[test]
    fn resume_continues_after_highest_sequence() {
        let schema = warehouses();
        let existing: Vec<Record> = vec![
            json!({"name": "North", "code": "WH007"})
                .as_object()
                .unwrap()
                .clone(),
            json!({"name": "South", "code": "WH002"})
                .as_object()
                .unwrap()
                .clone(),
        ];
        let mut ctx = RunContext::new("r", ExclusionTracker::new(KeyMatching::Exact));
        ctx.resume_from(&schema, &existing);

        let mut record = Record::new();
        ctx.assign_sequences(&schema, &mut record);

        assert_eq!(record["code"], json!("WH008"));
        assert!(ctx.exclusions().is_excluded("North"));
        assert_eq!(ctx.exclusions().len(), 2);
    }
}
