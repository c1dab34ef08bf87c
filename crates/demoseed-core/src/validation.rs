use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constraints::Constraint;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::schema::{FieldSpec, RecordSchema};
use crate::types::{FieldKind, StringFormat};

/// Category of a record rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    NotAnObject,
    Missing,
    WrongType,
    NotInEnum,
    OutOfRange,
    BadFormat,
    TooLong,
    ItemCount,
    Constraint,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::NotAnObject => "not_an_object",
            ViolationKind::Missing => "missing",
            ViolationKind::WrongType => "wrong_type",
            ViolationKind::NotInEnum => "not_in_enum",
            ViolationKind::OutOfRange => "out_of_range",
            ViolationKind::BadFormat => "bad_format",
            ViolationKind::TooLong => "too_long",
            ViolationKind::ItemCount => "item_count",
            ViolationKind::Constraint => "constraint",
        }
    }
}

/// Typed rejection of a candidate record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaViolation {
    /// Path of the offending field (`variants[1].display_type`), or `$` for the record.
    pub field: String,
    /// Expected shape at that path.
    pub expected: String,
    pub kind: ViolationKind,
}

impl SchemaViolation {
    fn new(field: impl Into<String>, expected: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
            kind,
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field `{}` {}: expected {}",
            self.field,
            self.kind.as_str(),
            self.expected
        )
    }
}

impl std::error::Error for SchemaViolation {}

/// Validate internal consistency of a record schema.
///
/// This checks:
/// - duplicate field names (recursively in nested objects)
/// - empty enums and inverted numeric bounds
/// - natural-key fields exist, are required and are not sequences
/// - population percentages are within 0-100 and only set on optional fields
/// - constraints reference declared fields
pub fn validate_schema(schema: &RecordSchema) -> Result<()> {
    if schema.name.trim().is_empty() {
        return Err(Error::InvalidSchema("record schema name is empty".to_string()));
    }
    check_fields(&schema.name, &schema.fields)?;

    if schema.natural_key.fields.is_empty() {
        return Err(Error::InvalidSchema(format!(
            "{}: natural key has no fields",
            schema.name
        )));
    }
    for key_field in &schema.natural_key.fields {
        let field = schema.field(key_field).ok_or_else(|| {
            Error::InvalidSchema(format!(
                "{}: natural key field not found: {key_field}",
                schema.name
            ))
        })?;
        if !field.required {
            return Err(Error::InvalidSchema(format!(
                "{}: natural key field must be required: {key_field}",
                schema.name
            )));
        }
        if field.kind.is_sequence() {
            return Err(Error::InvalidSchema(format!(
                "{}: natural key field cannot be a sequence: {key_field}",
                schema.name
            )));
        }
    }

    for constraint in &schema.constraints {
        for name in constraint.fields() {
            if schema.field(name).is_none() {
                return Err(Error::InvalidSchema(format!(
                    "{}: constraint references unknown field: {name}",
                    schema.name
                )));
            }
        }
    }

    Ok(())
}

fn check_fields(path: &str, fields: &[FieldSpec]) -> Result<()> {
    let mut names = BTreeSet::new();
    for field in fields {
        if !names.insert(field.name.as_str()) {
            return Err(Error::InvalidSchema(format!(
                "duplicate field name: {path}.{}",
                field.name
            )));
        }
        if let Some(pct) = field.populate_pct {
            if pct > 100 {
                return Err(Error::InvalidSchema(format!(
                    "populate_pct above 100: {path}.{}",
                    field.name
                )));
            }
            if field.required {
                return Err(Error::InvalidSchema(format!(
                    "populate_pct set on required field: {path}.{}",
                    field.name
                )));
            }
        }
        check_kind(&format!("{path}.{}", field.name), &field.kind)?;
    }
    Ok(())
}

fn check_kind(path: &str, kind: &FieldKind) -> Result<()> {
    match kind {
        FieldKind::Enum { values } if values.is_empty() => Err(Error::InvalidSchema(format!(
            "enum has no values: {path}"
        ))),
        FieldKind::Number {
            min: Some(min),
            max: Some(max),
        } if min > max => Err(Error::InvalidSchema(format!(
            "min greater than max: {path}"
        ))),
        FieldKind::Integer {
            min: Some(min),
            max: Some(max),
        } if min > max => Err(Error::InvalidSchema(format!(
            "min greater than max: {path}"
        ))),
        FieldKind::List { item, .. } => check_kind(&format!("{path}[]"), item),
        FieldKind::Object { fields } => check_fields(path, fields),
        FieldKind::Sequence { prefix, .. } if prefix.is_empty() => Err(Error::InvalidSchema(
            format!("sequence prefix is empty: {path}"),
        )),
        _ => Ok(()),
    }
}

/// Check a candidate record against the schema.
///
/// The whole record is rejected on the first violation; nothing is patched.
/// Sequence fields are ignored because they are assigned after generation.
pub fn validate_record(
    schema: &RecordSchema,
    value: &Value,
) -> std::result::Result<(), SchemaViolation> {
    let object = value.as_object().ok_or_else(|| {
        SchemaViolation::new("$", "a JSON object", ViolationKind::NotAnObject)
    })?;
    check_object(None, &schema.fields, object)?;

    for constraint in &schema.constraints {
        check_constraint(constraint, object)?;
    }

    Ok(())
}

/// Validate a candidate and keep only the declared top-level fields.
pub fn accept_record(
    schema: &RecordSchema,
    value: Value,
) -> std::result::Result<Record, SchemaViolation> {
    validate_record(schema, &value)?;
    let Value::Object(object) = value else {
        return Err(SchemaViolation::new(
            "$",
            "a JSON object",
            ViolationKind::NotAnObject,
        ));
    };
    Ok(object
        .into_iter()
        .filter(|(name, _)| {
            schema
                .field(name)
                .is_some_and(|field| !field.kind.is_sequence())
        })
        .collect())
}

fn check_object(
    prefix: Option<&str>,
    fields: &[FieldSpec],
    object: &serde_json::Map<String, Value>,
) -> std::result::Result<(), SchemaViolation> {
    for field in fields {
        if field.kind.is_sequence() {
            continue;
        }
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{}", field.name),
            None => field.name.clone(),
        };
        match object.get(&field.name) {
            Some(value) if is_populated(value) => check_value(&path, &field.kind, value)?,
            _ if field.required => {
                return Err(SchemaViolation::new(
                    path,
                    field.kind.describe(),
                    ViolationKind::Missing,
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_value(
    path: &str,
    kind: &FieldKind,
    value: &Value,
) -> std::result::Result<(), SchemaViolation> {
    let wrong_type = || SchemaViolation::new(path, kind.describe(), ViolationKind::WrongType);

    match kind {
        FieldKind::String { format, max_length } => {
            let text = value.as_str().ok_or_else(wrong_type)?;
            if let Some(max) = max_length {
                if text.chars().count() > *max {
                    return Err(SchemaViolation::new(
                        path,
                        kind.describe(),
                        ViolationKind::TooLong,
                    ));
                }
            }
            if let Some(format) = format {
                if !matches_format(*format, text) {
                    return Err(SchemaViolation::new(
                        path,
                        kind.describe(),
                        ViolationKind::BadFormat,
                    ));
                }
            }
            Ok(())
        }
        FieldKind::Number { min, max } => {
            let number = value.as_f64().ok_or_else(wrong_type)?;
            if min.is_some_and(|min| number < min) || max.is_some_and(|max| number > max) {
                return Err(SchemaViolation::new(
                    path,
                    kind.describe(),
                    ViolationKind::OutOfRange,
                ));
            }
            Ok(())
        }
        FieldKind::Integer { min, max } => {
            let number = value.as_i64().ok_or_else(wrong_type)?;
            if min.is_some_and(|min| number < min) || max.is_some_and(|max| number > max) {
                return Err(SchemaViolation::new(
                    path,
                    kind.describe(),
                    ViolationKind::OutOfRange,
                ));
            }
            Ok(())
        }
        FieldKind::Boolean => value.as_bool().map(|_| ()).ok_or_else(wrong_type),
        FieldKind::Enum { values } => {
            let label = value.as_str().ok_or_else(wrong_type)?;
            if values.iter().any(|allowed| allowed == label) {
                Ok(())
            } else {
                Err(SchemaViolation::new(
                    path,
                    kind.describe(),
                    ViolationKind::NotInEnum,
                ))
            }
        }
        FieldKind::List {
            item,
            min_items,
            max_items,
        } => {
            let items = value.as_array().ok_or_else(wrong_type)?;
            if min_items.is_some_and(|min| items.len() < min)
                || max_items.is_some_and(|max| items.len() > max)
            {
                return Err(SchemaViolation::new(
                    path,
                    kind.describe(),
                    ViolationKind::ItemCount,
                ));
            }
            for (idx, entry) in items.iter().enumerate() {
                check_value(&format!("{path}[{idx}]"), item, entry)?;
            }
            Ok(())
        }
        FieldKind::Object { fields } => {
            let object = value.as_object().ok_or_else(wrong_type)?;
            check_object(Some(path), fields, object)
        }
        FieldKind::Sequence { .. } => Ok(()),
    }
}

fn check_constraint(
    constraint: &Constraint,
    object: &serde_json::Map<String, Value>,
) -> std::result::Result<(), SchemaViolation> {
    let populated = |name: &str| object.get(name).is_some_and(is_populated);

    match constraint {
        Constraint::Requires { field, requires } => {
            if populated(field) && !populated(requires) {
                return Err(SchemaViolation::new(
                    requires.clone(),
                    constraint.describe(),
                    ViolationKind::Constraint,
                ));
            }
        }
        Constraint::NotGreaterThan { lesser, greater } => {
            let lesser_value = object.get(lesser).and_then(Value::as_f64);
            let greater_value = object.get(greater).and_then(Value::as_f64);
            if let (Some(low), Some(high)) = (lesser_value, greater_value) {
                if low > high {
                    return Err(SchemaViolation::new(
                        lesser.clone(),
                        constraint.describe(),
                        ViolationKind::Constraint,
                    ));
                }
            }
        }
        Constraint::MutuallyExclusive { fields } => {
            let set: Vec<&String> = fields.iter().filter(|name| populated(name)).collect();
            if set.len() > 1 {
                return Err(SchemaViolation::new(
                    set[1].clone(),
                    constraint.describe(),
                    ViolationKind::Constraint,
                ));
            }
        }
    }
    Ok(())
}

/// Present, non-null and, for strings, non-blank.
fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        _ => true,
    }
}

fn matches_format(format: StringFormat, text: &str) -> bool {
    match format {
        StringFormat::Email => email_regex().is_some_and(|re| re.is_match(text)),
        StringFormat::Phone => {
            let digits = text.chars().filter(char::is_ascii_digit).count();
            digits >= 7 && phone_regex().is_some_and(|re| re.is_match(text))
        }
        StringFormat::Url => url_regex().is_some_and(|re| re.is_match(text)),
        StringFormat::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok(),
    }
}

fn email_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[A-Za-z]{2,}$").ok())
        .as_ref()
}

fn phone_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?[0-9()\-.\s]+(\s*(x|ext\.?)\s*[0-9]+)?$").ok())
        .as_ref()
}

fn url_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://[^\s/?#]+\.[^\s/?#]+([/?#]\S*)?$").ok())
        .as_ref()
}
