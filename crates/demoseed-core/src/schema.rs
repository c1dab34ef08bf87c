use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constraints::Constraint;
use crate::types::{FieldKind, KeyMatching};

/// Structural contract for one record type.
///
/// The same description steers the generator (through [`RecordSchema::field_guide`])
/// and validates its output (through [`crate::validate_record`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecordSchema {
    /// Record type name (e.g. `customers`).
    pub name: String,
    /// What one record represents, used as the prompt subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Fields whose values identify a record for deduplication and lookup.
    pub natural_key: NaturalKey,
    pub fields: Vec<FieldSpec>,
    /// Cross-field constraints checked after per-field validation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
}

/// One field of a record schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default = "default_required")]
    pub required: bool,
    /// Natural-language guidance for the generator.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hint: String,
    /// Share of records (0-100) that should populate this optional field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub populate_pct: Option<u8>,
}

fn default_required() -> bool {
    true
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            hint: String::new(),
            populate_pct: None,
        }
    }

    pub fn optional(mut self, populate_pct: Option<u8>) -> Self {
        self.required = false;
        self.populate_pct = populate_pct;
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }
}

/// Natural key definition for a record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NaturalKey {
    /// Field names; composite keys join their values with a single space.
    pub fields: Vec<String>,
    #[serde(default)]
    pub matching: KeyMatching,
}

impl NaturalKey {
    pub fn single(field: impl Into<String>, matching: KeyMatching) -> Self {
        Self {
            fields: vec![field.into()],
            matching,
        }
    }

    /// Raw key value of a record, or `None` when any key field is missing or empty.
    pub fn value_of(&self, record: &serde_json::Map<String, Value>) -> Option<String> {
        let mut parts = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let part = match record.get(field)? {
                Value::String(value) => value.trim().to_string(),
                Value::Number(value) => value.to_string(),
                Value::Bool(value) => value.to_string(),
                _ => return None,
            };
            if part.is_empty() {
                return None;
            }
            parts.push(part);
        }
        Some(parts.join(" "))
    }
}

impl RecordSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Fields assigned locally rather than by the generator.
    pub fn sequence_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|field| field.kind.is_sequence())
    }

    /// Natural-language description of every generated field.
    pub fn field_guide(&self) -> String {
        let mut out = String::new();
        write_guide(&mut out, &self.fields, 0);
        if !self.constraints.is_empty() {
            out.push_str("\nRules:\n");
            for constraint in &self.constraints {
                out.push_str(&format!("- {}\n", constraint.describe()));
            }
        }
        out
    }
}

fn write_guide(out: &mut String, fields: &[FieldSpec], depth: usize) {
    let indent = "  ".repeat(depth);
    for field in fields {
        if field.kind.is_sequence() {
            continue;
        }
        let presence = match (field.required, field.populate_pct) {
            (true, _) => "required".to_string(),
            (false, Some(pct)) => format!("optional, fill in about {pct}% of records"),
            (false, None) => "optional".to_string(),
        };
        out.push_str(&format!(
            "{indent}- {} ({}, {presence})",
            field.name,
            field.kind.describe()
        ));
        if !field.hint.is_empty() {
            out.push_str(": ");
            out.push_str(&collapse_whitespace(&field.hint));
        }
        out.push('\n');

        match &field.kind {
            FieldKind::Object { fields } => write_guide(out, fields, depth + 1),
            FieldKind::List { item, .. } => {
                if let FieldKind::Object { fields } = item.as_ref() {
                    write_guide(out, fields, depth + 1);
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
