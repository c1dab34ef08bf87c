use std::fmt;

use async_trait::async_trait;
use demoseed_core::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RemoteError;

/// Identifier assigned by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Int(i64),
    Str(String),
}

impl RemoteId {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_i64().map(RemoteId::Int),
            Value::String(text) if !text.is_empty() => Some(RemoteId::Str(text.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            RemoteId::Int(id) => Value::from(*id),
            RemoteId::Str(id) => Value::String(id.clone()),
        }
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteId::Int(id) => write!(f, "{id}"),
            RemoteId::Str(id) => f.write_str(id),
        }
    }
}

/// An entity as returned by the remote system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteEntity {
    pub id: RemoteId,
    pub fields: Record,
}

/// Conjunction of exact-match conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyFilter {
    pub conditions: Vec<(String, Value)>,
}

impl KeyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.conditions.push((field.into(), value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|(field, _)| field.as_str())
    }

    pub fn matches(&self, fields: &Record) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| fields.get(field) == Some(value))
    }
}

impl fmt::Display for KeyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .conditions
            .iter()
            .map(|(field, value)| format!("{field}={}", display_value(value)))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// Plain rendering of a lookup value: strings without quotes.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Minimal surface of a remote business API.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Entities matching `filter`, in the remote system's default order.
    async fn search(
        &self,
        entity: &str,
        filter: &KeyFilter,
        limit: usize,
    ) -> Result<Vec<RemoteEntity>, RemoteError>;

    async fn create(&self, entity: &str, payload: &Record) -> Result<RemoteId, RemoteError>;

    async fn update(&self, entity: &str, id: &RemoteId, payload: &Record)
    -> Result<(), RemoteError>;

    /// Remove one entity. An id that no longer exists is [`RemoteError::NotFound`].
    async fn delete(&self, entity: &str, id: &RemoteId) -> Result<(), RemoteError>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remote_ids_round_trip_through_json_values() {
        assert_eq!(RemoteId::from_value(&json!(7)), Some(RemoteId::Int(7)));
        assert_eq!(
            RemoteId::from_value(&json!("a1b2")),
            Some(RemoteId::Str("a1b2".to_string()))
        );
        assert_eq!(RemoteId::from_value(&json!(null)), None);
        assert_eq!(RemoteId::Int(3).to_value(), json!(3));
    }

    #[test]
    fn filter_matches_all_conditions() {
        let filter = KeyFilter::new()
            .eq("code", json!("WH"))
            .eq("company_id", json!(1));
        let fields = json!({"code": "WH", "company_id": 1, "name": "Main"});
        assert!(filter.matches(fields.as_object().unwrap()));
        assert_eq!(filter.to_string(), "code=WH, company_id=1");
    }
}
