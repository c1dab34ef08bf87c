//! In-process remote system for dry runs and tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use demoseed_core::Record;
use serde_json::Value;

use crate::client::{KeyFilter, RemoteClient, RemoteEntity, RemoteId};
use crate::errors::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    Search,
    Create,
    Update,
    Delete,
}

/// One call received by the in-memory remote.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub op: RemoteOp,
    pub entity: String,
    /// Search filter, the payload for writes, or the id for deletes.
    pub detail: String,
}

struct FailureRule {
    op: RemoteOp,
    entity: String,
    /// Only payloads carrying this field value; `None` matches every call.
    when: Option<(String, Value)>,
    /// Remaining injections; `None` fails forever.
    times: Option<usize>,
    error: RemoteError,
}

#[derive(Default)]
struct State {
    entities: BTreeMap<String, Vec<RemoteEntity>>,
    next_id: i64,
    calls: Vec<RemoteCall>,
    rules: Vec<FailureRule>,
}

/// Remote system kept in memory, assigning sequential integer ids.
#[derive(Default)]
pub struct InMemoryRemote {
    state: Mutex<State>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate an entity, as if it existed before the run.
    pub fn insert(&self, entity: &str, fields: Record) -> RemoteId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = RemoteId::Int(state.next_id);
        state
            .entities
            .entry(entity.to_string())
            .or_default()
            .push(RemoteEntity {
                id: id.clone(),
                fields,
            });
        id
    }

    /// Fail every `op` on `entity` whose payload has `field == value`.
    pub fn fail_when(
        &self,
        op: RemoteOp,
        entity: &str,
        field: &str,
        value: Value,
        error: RemoteError,
    ) {
        self.lock().rules.push(FailureRule {
            op,
            entity: entity.to_string(),
            when: Some((field.to_string(), value)),
            times: None,
            error,
        });
    }

    /// Fail the next `times` calls of `op` on `entity`.
    pub fn fail_next(&self, op: RemoteOp, entity: &str, times: usize, error: RemoteError) {
        self.lock().rules.push(FailureRule {
            op,
            entity: entity.to_string(),
            when: None,
            times: Some(times),
            error,
        });
    }

    pub fn entities(&self, entity: &str) -> Vec<RemoteEntity> {
        self.lock().entities.get(entity).cloned().unwrap_or_default()
    }

    pub fn count(&self, entity: &str) -> usize {
        self.lock().entities.get(entity).map_or(0, Vec::len)
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    pub fn calls_of(&self, op: RemoteOp) -> Vec<RemoteCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.op == op)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl State {
    fn record_call(&mut self, op: RemoteOp, entity: &str, detail: String) {
        self.calls.push(RemoteCall {
            op,
            entity: entity.to_string(),
            detail,
        });
    }

    fn injected_failure(
        &mut self,
        op: RemoteOp,
        entity: &str,
        payload: Option<&Record>,
    ) -> Option<RemoteError> {
        let rule = self.rules.iter_mut().find(|rule| {
            rule.op == op
                && rule.entity == entity
                && rule.times != Some(0)
                && match (&rule.when, payload) {
                    (None, _) => true,
                    (Some((field, value)), Some(payload)) => payload.get(field) == Some(value),
                    (Some(_), None) => false,
                }
        })?;
        if let Some(times) = rule.times.as_mut() {
            *times -= 1;
        }
        Some(rule.error.clone())
    }
}

#[async_trait]
impl RemoteClient for InMemoryRemote {
    async fn search(
        &self,
        entity: &str,
        filter: &KeyFilter,
        limit: usize,
    ) -> Result<Vec<RemoteEntity>, RemoteError> {
        let mut state = self.lock();
        state.record_call(RemoteOp::Search, entity, filter.to_string());
        if let Some(err) = state.injected_failure(RemoteOp::Search, entity, None) {
            return Err(err);
        }
        Ok(state
            .entities
            .get(entity)
            .map(|entities| {
                entities
                    .iter()
                    .filter(|candidate| filter.matches(&candidate.fields))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create(&self, entity: &str, payload: &Record) -> Result<RemoteId, RemoteError> {
        let mut state = self.lock();
        state.record_call(RemoteOp::Create, entity, Value::Object(payload.clone()).to_string());
        if let Some(err) = state.injected_failure(RemoteOp::Create, entity, Some(payload)) {
            return Err(err);
        }
        state.next_id += 1;
        let id = RemoteId::Int(state.next_id);
        state
            .entities
            .entry(entity.to_string())
            .or_default()
            .push(RemoteEntity {
                id: id.clone(),
                fields: payload.clone(),
            });
        Ok(id)
    }

    async fn update(
        &self,
        entity: &str,
        id: &RemoteId,
        payload: &Record,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.record_call(RemoteOp::Update, entity, Value::Object(payload.clone()).to_string());
        if let Some(err) = state.injected_failure(RemoteOp::Update, entity, Some(payload)) {
            return Err(err);
        }
        let existing = state
            .entities
            .get_mut(entity)
            .and_then(|entities| entities.iter_mut().find(|candidate| &candidate.id == id))
            .ok_or_else(|| RemoteError::NotFound(format!("{entity} {id}")))?;
        for (field, value) in payload {
            existing.fields.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn delete(&self, entity: &str, id: &RemoteId) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.record_call(RemoteOp::Delete, entity, id.to_string());
        if let Some(err) = state.injected_failure(RemoteOp::Delete, entity, None) {
            return Err(err);
        }
        let entities = state
            .entities
            .get_mut(entity)
            .ok_or_else(|| RemoteError::NotFound(format!("{entity} {id}")))?;
        let before = entities.len();
        entities.retain(|candidate| &candidate.id != id);
        if entities.len() == before {
            return Err(RemoteError::NotFound(format!("{entity} {id}")));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn injected_failures_expire() {
        let remote = InMemoryRemote::new();
        remote.fail_next(
            RemoteOp::Create,
            "res.partner",
            1,
            RemoteError::Transient("timeout".to_string()),
        );

        let payload = record(json!({"name": "Ada"}));
        assert!(remote.create("res.partner", &payload).await.is_err());
        assert_eq!(
            remote.create("res.partner", &payload).await.unwrap(),
            RemoteId::Int(1)
        );
        assert_eq!(remote.count("res.partner"), 1);
        assert_eq!(remote.calls_of(RemoteOp::Create).len(), 2);
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let remote = InMemoryRemote::new();
        let id = remote.insert("stock.warehouse", record(json!({"code": "WH", "name": "Main"})));

        remote
            .update("stock.warehouse", &id, &record(json!({"name": "Central"})))
            .await
            .unwrap();

        let stored = remote.entities("stock.warehouse");
        assert_eq!(stored[0].fields["name"], json!("Central"));
        assert_eq!(stored[0].fields["code"], json!("WH"));
    }

    #[tokio::test]
    async fn delete_removes_only_the_given_id() {
        let remote = InMemoryRemote::new();
        let first = remote.insert("res.partner", record(json!({"name": "Ada"})));
        let second = remote.insert("res.partner", record(json!({"name": "Grace"})));

        remote.delete("res.partner", &first).await.unwrap();

        let stored = remote.entities("res.partner");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, second);
        assert!(matches!(
            remote.delete("res.partner", &first).await,
            Err(RemoteError::NotFound(_))
        ));
        assert_eq!(remote.calls_of(RemoteOp::Delete).len(), 2);
    }
}
