use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use demoseed_core::{Record, RetryPolicy, retry};
use demoseed_plan::SeedTarget;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::{KeyFilter, RemoteClient, RemoteEntity, RemoteId, display_value};
use crate::errors::{RemoteError, SeedError};
use crate::resolver::Resolver;

/// Lifecycle of one seeding run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedState {
    Loading,
    ResolvingPrereqs,
    SeedingRecords,
    Completed,
    Aborted,
}

impl fmt::Display for SeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SeedState::Loading => "loading",
            SeedState::ResolvingPrereqs => "resolving_prereqs",
            SeedState::SeedingRecords => "seeding_records",
            SeedState::Completed => "completed",
            SeedState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordAction {
    Created,
    Updated,
    /// A matching entity already existed and was left untouched.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordOutcome {
    pub index: usize,
    pub key: String,
    pub action: RecordAction,
    pub id: RemoteId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedFailure {
    pub index: usize,
    pub key: Option<String>,
    pub reason: String,
}

/// Summary of one seeding run; also carried by an aborted run.
#[derive(Debug, Clone, Serialize)]
pub struct SeedResult {
    pub target: String,
    pub entity: String,
    pub state: SeedState,
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<SeedFailure>,
    pub outcomes: Vec<RecordOutcome>,
    /// Stopped on request before every record was attempted.
    pub interrupted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SeedResult {
    fn new(target: &SeedTarget, total: usize) -> Self {
        Self {
            target: target.name.clone(),
            entity: target.entity.clone(),
            state: SeedState::Loading,
            total,
            created: 0,
            updated: 0,
            skipped: 0,
            failed: 0,
            failures: Vec::new(),
            outcomes: Vec::new(),
            interrupted: false,
            abort_reason: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Records that reached a terminal outcome, successful or not.
    pub fn attempted(&self) -> usize {
        self.created + self.updated + self.skipped + self.failed
    }

    pub fn is_success(&self) -> bool {
        self.state == SeedState::Completed && self.failed == 0 && !self.interrupted
    }

    fn transition(&mut self, next: SeedState) {
        info!(
            target_name = %self.target,
            from = %self.state,
            to = %next,
            "seed state changed"
        );
        self.state = next;
    }

    fn record_outcome(&mut self, outcome: RecordOutcome) {
        match outcome.action {
            RecordAction::Created => self.created += 1,
            RecordAction::Updated => self.updated += 1,
            RecordAction::Skipped => self.skipped += 1,
        }
        self.outcomes.push(outcome);
    }

    fn record_failure(&mut self, failure: SeedFailure) {
        self.failed += 1;
        self.failures.push(failure);
    }

    fn finish(&mut self, state: SeedState) {
        self.transition(state);
        self.finished_at = Some(Utc::now());
    }
}

/// Matches deleted per record when clearing; remote duplicates beyond this
/// are left for the next clear.
const CLEAR_MATCH_LIMIT: usize = 100;

/// Summary of removing one target's entities from the remote system.
#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub target: String,
    pub entity: String,
    pub total: usize,
    pub deleted: usize,
    /// Records with no matching remote entity.
    pub missing: usize,
    pub failed: usize,
    pub failures: Vec<SeedFailure>,
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ClearResult {
    fn new(target: &SeedTarget, total: usize) -> Self {
        Self {
            target: target.name.clone(),
            entity: target.entity.clone(),
            total,
            deleted: 0,
            missing: 0,
            failed: 0,
            failures: Vec::new(),
            interrupted: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.interrupted
    }
}

/// Writes record sets into a remote system through a [`RemoteClient`].
///
/// The resolver cache lives as long as the seeder, so entities created for
/// one target resolve without a remote lookup when a later target links to
/// them.
pub struct Seeder {
    client: Arc<dyn RemoteClient>,
    resolver: Resolver,
    policy: RetryPolicy,
}

impl Seeder {
    pub fn new(client: Arc<dyn RemoteClient>, policy: RetryPolicy) -> Self {
        let resolver = Resolver::new(Arc::clone(&client), policy.clone());
        Self {
            client,
            resolver,
            policy,
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub async fn seed(
        &mut self,
        records: &[Record],
        target: &SeedTarget,
    ) -> Result<SeedResult, SeedError> {
        let never = AtomicBool::new(false);
        self.seed_until(records, target, &never).await
    }

    /// Seed `records` in order, checking `cancel` before every record.
    ///
    /// Per-record failures are collected in the result. Authentication and
    /// schema-mismatch errors, or a missing structural prerequisite, end the
    /// run with [`SeedError::Aborted`] carrying the partial result.
    pub async fn seed_until(
        &mut self,
        records: &[Record],
        target: &SeedTarget,
        cancel: &AtomicBool,
    ) -> Result<SeedResult, SeedError> {
        let mut result = SeedResult::new(target, records.len());
        info!(
            target_name = %target.name,
            entity = %target.entity,
            records = records.len(),
            "seeding started"
        );

        result.transition(SeedState::ResolvingPrereqs);
        let structural: Vec<_> = target.structural_links().cloned().collect();
        if let Err(err) = self.resolver.prefetch_structural(&structural, records).await {
            return Err(abort(result, err));
        }

        result.transition(SeedState::SeedingRecords);
        let pace = target.pace();
        for (index, record) in records.iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                info!(target_name = %target.name, attempted = index, "seeding interrupted");
                result.interrupted = true;
                break;
            }
            if index > 0 && !pace.is_zero() {
                tokio::time::sleep(pace).await;
            }

            let key = record_key(target, record);
            match self.seed_record(index, record, target).await {
                Ok(outcome) => {
                    debug!(index, key = %outcome.key, action = ?outcome.action, id = %outcome.id, "record seeded");
                    result.record_outcome(outcome);
                }
                Err(err) if err.is_run_fatal() => return Err(abort(result, err)),
                Err(err) => {
                    warn!(
                        index,
                        key = key.as_deref().unwrap_or("-"),
                        error = %err,
                        "record failed"
                    );
                    result.record_failure(SeedFailure {
                        index,
                        key,
                        reason: err.to_string(),
                    });
                }
            }
        }

        result.finish(SeedState::Completed);
        info!(
            target_name = %target.name,
            created = result.created,
            updated = result.updated,
            skipped = result.skipped,
            failed = result.failed,
            interrupted = result.interrupted,
            "seeding completed"
        );
        Ok(result)
    }

    async fn seed_record(
        &mut self,
        index: usize,
        record: &Record,
        target: &SeedTarget,
    ) -> Result<RecordOutcome, SeedError> {
        let filter = key_filter(target, record)?;
        let key = filter.to_string();
        let payload = self.build_payload(record, target).await?;

        let existing = self.resolver.find(&target.entity, &filter).await?;
        let client = &self.client;
        let (action, id) = match existing {
            Some(entity) if target.existing_first => {
                let label = format!("{}.update", client.name());
                retry(&self.policy, &label, || {
                    client.update(&target.entity, &entity.id, &payload)
                })
                .await?;
                (RecordAction::Updated, entity.id)
            }
            Some(entity) if target.skip_existing => (RecordAction::Skipped, entity.id),
            _ => {
                let label = format!("{}.create", client.name());
                let id = retry(&self.policy, &label, || {
                    client.create(&target.entity, &payload)
                })
                .await?;
                (RecordAction::Created, id)
            }
        };

        for (field, value) in &filter.conditions {
            self.resolver
                .register(&target.entity, field, value, id.clone());
        }
        Ok(RecordOutcome {
            index,
            key,
            action,
            id,
        })
    }

    pub async fn clear(
        &mut self,
        records: &[Record],
        target: &SeedTarget,
    ) -> Result<ClearResult, SeedError> {
        let never = AtomicBool::new(false);
        self.clear_until(records, target, &never).await
    }

    /// Delete every remote entity matching the natural key of a record, last
    /// record first, checking `cancel` before every record.
    ///
    /// Authentication and schema-mismatch errors end the run; anything else
    /// is collected per record. Cached ids for the entity are dropped.
    pub async fn clear_until(
        &mut self,
        records: &[Record],
        target: &SeedTarget,
        cancel: &AtomicBool,
    ) -> Result<ClearResult, SeedError> {
        let mut result = ClearResult::new(target, records.len());
        info!(
            target_name = %target.name,
            entity = %target.entity,
            records = records.len(),
            "clearing started"
        );

        for (index, record) in records.iter().enumerate().rev() {
            if cancel.load(Ordering::Relaxed) {
                info!(target_name = %target.name, "clearing interrupted");
                result.interrupted = true;
                break;
            }
            let key = record_key(target, record);
            match self.clear_record(record, target).await {
                Ok(0) => {
                    debug!(index, key = key.as_deref().unwrap_or("-"), "nothing to delete");
                    result.missing += 1;
                }
                Ok(deleted) => result.deleted += deleted,
                Err(err) if err.is_run_fatal() => {
                    self.resolver.forget(&target.entity);
                    warn!(target_name = %target.name, deleted = result.deleted, error = %err, "clearing aborted");
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        index,
                        key = key.as_deref().unwrap_or("-"),
                        error = %err,
                        "record not cleared"
                    );
                    result.failed += 1;
                    result.failures.push(SeedFailure {
                        index,
                        key,
                        reason: err.to_string(),
                    });
                }
            }
        }

        self.resolver.forget(&target.entity);
        result.finished_at = Some(Utc::now());
        info!(
            target_name = %target.name,
            deleted = result.deleted,
            missing = result.missing,
            failed = result.failed,
            interrupted = result.interrupted,
            "clearing completed"
        );
        Ok(result)
    }

    /// Delete the entities matching one record; returns how many went.
    async fn clear_record(&self, record: &Record, target: &SeedTarget) -> Result<usize, SeedError> {
        let filter = key_filter(target, record)?;
        let client = &self.client;
        let label = format!("{}.search", client.name());
        let matches: Vec<RemoteEntity> = retry(&self.policy, &label, || {
            client.search(&target.entity, &filter, CLEAR_MATCH_LIMIT)
        })
        .await?;

        let label = format!("{}.delete", client.name());
        let mut deleted = 0;
        for entity in matches {
            match retry(&self.policy, &label, || client.delete(&target.entity, &entity.id)).await {
                Ok(()) => deleted += 1,
                // Removed concurrently; the record is cleared either way.
                Err(err) if matches!(err.source, RemoteError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(deleted)
    }

    /// Remote payload: link source fields replaced by resolved ids, then the
    /// target's field mapping applied.
    async fn build_payload(
        &mut self,
        record: &Record,
        target: &SeedTarget,
    ) -> Result<Record, SeedError> {
        let mut source = record.clone();
        let mut references = Vec::new();
        for link in &target.links {
            if link.fixed_value.is_none() {
                source.remove(&link.field);
            }
            if let Some(id) = self.resolver.resolve_dependency(link, record).await? {
                references.push((link.target_field.clone(), id.to_value()));
            }
        }

        let mut payload = target.mapping.apply(&source);
        for (field, value) in references {
            payload.insert(field, value);
        }
        Ok(payload)
    }
}

fn abort(mut result: SeedResult, reason: SeedError) -> SeedError {
    warn!(
        target_name = %result.target,
        attempted = result.attempted(),
        error = %reason,
        "seeding aborted"
    );
    result.abort_reason = Some(reason.to_string());
    result.finish(SeedState::Aborted);
    SeedError::Aborted {
        result: Box::new(result),
        reason: Box::new(reason),
    }
}

/// Remote lookup filter built from the target's key fields.
fn key_filter(target: &SeedTarget, record: &Record) -> Result<KeyFilter, SeedError> {
    let mut filter = KeyFilter::new();
    for key in &target.key {
        match record.get(&key.field) {
            None | Some(Value::Null) => return Err(SeedError::MissingKey(key.field.clone())),
            Some(value) => filter = filter.eq(key.remote_name(), value.clone()),
        }
    }
    Ok(filter)
}

fn record_key(target: &SeedTarget, record: &Record) -> Option<String> {
    let parts: Vec<String> = target
        .key
        .iter()
        .map(|key| record.get(&key.field).map(display_value))
        .collect::<Option<_>>()?;
    Some(parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use demoseed_plan::{FieldMapping, KeyField};
    use serde_json::json;

    fn target() -> SeedTarget {
        SeedTarget {
            name: "warehouses".to_string(),
            record_type: "warehouses".to_string(),
            entity: "stock.warehouse".to_string(),
            key: vec![KeyField {
                field: "code".to_string(),
                remote_field: None,
            }],
            links: Vec::new(),
            existing_first: false,
            skip_existing: true,
            mapping: FieldMapping::default(),
            pace_ms: 0,
            after: Vec::new(),
        }
    }

    #[test]
    fn key_filter_requires_every_key_field() {
        let record = json!({"name": "Main"}).as_object().cloned().unwrap();
        let err = key_filter(&target(), &record).unwrap_err();
        assert!(matches!(err, SeedError::MissingKey(ref field) if field == "code"));
    }

    #[test]
    fn key_filter_uses_remote_field_names() {
        let mut target = target();
        target.key[0].remote_field = Some("short_name".to_string());
        let record = json!({"code": "WH01"}).as_object().cloned().unwrap();

        let filter = key_filter(&target, &record).unwrap();
        assert_eq!(filter.to_string(), "short_name=WH01");
        assert_eq!(record_key(&target, &record).as_deref(), Some("WH01"));
    }

    #[test]
    fn composite_record_key_is_space_joined() {
        let mut target = target();
        target.key.push(KeyField {
            field: "company".to_string(),
            remote_field: Some("company_id".to_string()),
        });
        let record = json!({"code": "WH01", "company": 3}).as_object().cloned().unwrap();

        assert_eq!(record_key(&target, &record).as_deref(), Some("WH01 3"));
        assert_eq!(record_key(&target, &json!({"code": "WH01"}).as_object().cloned().unwrap()), None);
    }

    #[test]
    fn state_names_match_serialized_form() {
        assert_eq!(SeedState::ResolvingPrereqs.to_string(), "resolving_prereqs");
        assert_eq!(
            serde_json::to_value(SeedState::SeedingRecords).unwrap(),
            json!("seeding_records")
        );
    }
}
