use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::schema::FieldSpec;

/// Value shape of a record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    String {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<StringFormat>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
    },
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    Integer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
    Boolean,
    /// Closed set of string labels, matched exactly.
    Enum { values: Vec<String> },
    List {
        item: Box<FieldKind>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_items: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
    },
    Object { fields: Vec<FieldSpec> },
    /// Assigned locally from the run context (`PREFIX0001`), never requested
    /// from the model.
    Sequence {
        prefix: String,
        #[serde(default = "default_sequence_width")]
        width: usize,
    },
}

fn default_sequence_width() -> usize {
    4
}

impl FieldKind {
    /// Short human-readable description of the expected shape.
    pub fn describe(&self) -> String {
        match self {
            FieldKind::String { format, max_length } => {
                let mut out = match format {
                    Some(format) => format!("string ({})", format.label()),
                    None => "string".to_string(),
                };
                if let Some(max) = max_length {
                    out.push_str(&format!(", at most {max} characters"));
                }
                out
            }
            FieldKind::Number { min, max } => with_bounds("number", *min, *max),
            FieldKind::Integer { min, max } => with_bounds("integer", *min, *max),
            FieldKind::Boolean => "boolean".to_string(),
            FieldKind::Enum { values } => format!("one of [{}]", values.join(", ")),
            FieldKind::List {
                item,
                min_items,
                max_items,
            } => {
                let count = match (min_items, max_items) {
                    (Some(min), Some(max)) => format!(" with {min}-{max} items"),
                    (Some(min), None) => format!(" with at least {min} items"),
                    (None, Some(max)) => format!(" with at most {max} items"),
                    (None, None) => String::new(),
                };
                format!("list of {}{count}", item.describe())
            }
            FieldKind::Object { fields } => {
                let names: Vec<&str> = fields.iter().map(|field| field.name.as_str()).collect();
                format!("object with fields [{}]", names.join(", "))
            }
            FieldKind::Sequence { prefix, width } => {
                format!("sequence {prefix}{}", "0".repeat(*width))
            }
        }
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, FieldKind::Sequence { .. })
    }
}

fn with_bounds<T: std::fmt::Display>(label: &str, min: Option<T>, max: Option<T>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("{label} between {min} and {max}"),
        (Some(min), None) => format!("{label} >= {min}"),
        (None, Some(max)) => format!("{label} <= {max}"),
        (None, None) => label.to_string(),
    }
}

/// Well-known string formats checked during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StringFormat {
    Email,
    Phone,
    Url,
    /// ISO-8601 calendar date (`YYYY-MM-DD`).
    Date,
}

impl StringFormat {
    pub fn label(&self) -> &'static str {
        match self {
            StringFormat::Email => "email",
            StringFormat::Phone => "phone",
            StringFormat::Url => "url",
            StringFormat::Date => "date YYYY-MM-DD",
        }
    }
}

/// How natural keys are compared for duplicate detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum KeyMatching {
    /// Opaque identifiers: compared byte for byte.
    #[default]
    Exact,
    /// Email-like keys: trimmed and lowercased before comparison.
    CaseInsensitive,
}

impl KeyMatching {
    pub fn normalize(&self, key: &str) -> String {
        match self {
            KeyMatching::Exact => key.to_string(),
            KeyMatching::CaseInsensitive => key.trim().to_lowercase(),
        }
    }
}
