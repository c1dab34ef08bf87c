use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Cross-field constraint on a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    /// When `field` is populated, `requires` must be populated too.
    Requires { field: String, requires: String },
    /// Numeric `lesser` must not exceed numeric `greater` when both are present.
    NotGreaterThan { lesser: String, greater: String },
    /// At most one of `fields` may be populated.
    MutuallyExclusive { fields: Vec<String> },
}

impl Constraint {
    pub fn describe(&self) -> String {
        match self {
            Constraint::Requires { field, requires } => {
                format!("when {field} is set, {requires} must also be set")
            }
            Constraint::NotGreaterThan { lesser, greater } => {
                format!("{lesser} must not be greater than {greater}")
            }
            Constraint::MutuallyExclusive { fields } => {
                format!("set at most one of: {}", fields.join(", "))
            }
        }
    }

    /// Field names the constraint refers to.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Constraint::Requires { field, requires } => vec![field.as_str(), requires.as_str()],
            Constraint::NotGreaterThan { lesser, greater } => {
                vec![lesser.as_str(), greater.as_str()]
            }
            Constraint::MutuallyExclusive { fields } => {
                fields.iter().map(String::as_str).collect()
            }
        }
    }
}
