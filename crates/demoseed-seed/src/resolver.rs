use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use demoseed_core::{DependencyLink, LinkRequirement, Record, RetryError, RetryPolicy, retry};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::{KeyFilter, RemoteClient, RemoteEntity, RemoteId, display_value};
use crate::errors::{RemoteError, SeedError};

/// Natural-key lookups against the remote system, with a per-run cache.
///
/// Only positive results are cached; a miss is asked again next time since
/// the entity may have been created in between.
pub struct Resolver {
    client: Arc<dyn RemoteClient>,
    policy: RetryPolicy,
    cache: HashMap<(String, String, String), RemoteId>,
}

impl Resolver {
    pub fn new(client: Arc<dyn RemoteClient>, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            cache: HashMap::new(),
        }
    }

    /// First remote entity matching `filter`.
    ///
    /// Remote duplicates are collapsed to the first match in remote order;
    /// a warning names the filter so the ambiguity can be fixed by hand.
    pub async fn find(
        &self,
        entity: &str,
        filter: &KeyFilter,
    ) -> Result<Option<RemoteEntity>, RetryError<RemoteError>> {
        let label = format!("{}.search", self.client.name());
        let client = Arc::clone(&self.client);
        let mut matches = retry(&self.policy, &label, || {
            let client = Arc::clone(&client);
            async move { client.search(entity, filter, 2).await }
        })
        .await?;

        if matches.len() > 1 {
            warn!(
                entity,
                filter = %filter,
                "multiple remote entities match; using the first"
            );
        }
        Ok(if matches.is_empty() {
            None
        } else {
            Some(matches.swap_remove(0))
        })
    }

    /// Remote id for `entity` where `field` equals `value`, cached.
    pub async fn lookup(
        &mut self,
        entity: &str,
        field: &str,
        value: &Value,
    ) -> Result<Option<RemoteId>, RetryError<RemoteError>> {
        let cache_key = cache_key(entity, field, value);
        if let Some(id) = self.cache.get(&cache_key) {
            debug!(entity, field, value = %display_value(value), "resolved from cache");
            return Ok(Some(id.clone()));
        }

        let filter = KeyFilter::new().eq(field, value.clone());
        let found = self.find(entity, &filter).await?;
        Ok(found.map(|remote| {
            self.cache.insert(cache_key, remote.id.clone());
            remote.id
        }))
    }

    /// Resolve one link for one record.
    ///
    /// `Ok(None)` means the reference is absent and may be left out: an
    /// optional link with a null source or no remote match.
    pub async fn resolve_dependency(
        &mut self,
        link: &DependencyLink,
        record: &Record,
    ) -> Result<Option<RemoteId>, SeedError> {
        let value = match source_value(link, record) {
            Some(value) => value,
            None if link.requirement == LinkRequirement::Optional => return Ok(None),
            None => {
                return Err(SeedError::DependencyUnresolved {
                    entity: link.entity.clone(),
                    field: link.lookup_field.clone(),
                    value: "null".to_string(),
                });
            }
        };

        match self.lookup(&link.entity, &link.lookup_field, &value).await? {
            Some(id) => Ok(Some(id)),
            None if link.requirement == LinkRequirement::Optional => {
                debug!(
                    entity = %link.entity,
                    value = %display_value(&value),
                    "optional reference not found"
                );
                Ok(None)
            }
            None => Err(SeedError::DependencyUnresolved {
                entity: link.entity.clone(),
                field: link.lookup_field.clone(),
                value: display_value(&value),
            }),
        }
    }

    /// Resolve every distinct value of every structural link up front.
    ///
    /// Returns how many distinct references were resolved; the first miss
    /// is reported as [`SeedError::PrerequisiteMissing`].
    pub async fn prefetch_structural(
        &mut self,
        links: &[DependencyLink],
        records: &[Record],
    ) -> Result<usize, SeedError> {
        let mut resolved = 0;
        for link in links.iter().filter(|link| link.is_structural()) {
            let mut values: BTreeSet<String> = BTreeSet::new();
            let mut distinct = Vec::new();
            let sources: Vec<Value> = match &link.fixed_value {
                Some(fixed) => vec![Value::String(fixed.clone())],
                None => records
                    .iter()
                    .filter_map(|record| source_value(link, record))
                    .collect(),
            };
            for value in sources {
                if values.insert(value.to_string()) {
                    distinct.push(value);
                }
            }

            for value in distinct {
                match self.lookup(&link.entity, &link.lookup_field, &value).await? {
                    Some(_) => resolved += 1,
                    None => {
                        return Err(SeedError::PrerequisiteMissing {
                            entity: link.entity.clone(),
                            field: link.lookup_field.clone(),
                            value: display_value(&value),
                        });
                    }
                }
            }
        }
        if resolved > 0 {
            info!(resolved, "structural prerequisites resolved");
        }
        Ok(resolved)
    }

    /// Remember an entity created or found during the run.
    pub fn register(&mut self, entity: &str, field: &str, value: &Value, id: RemoteId) {
        self.cache.insert(cache_key(entity, field, value), id);
    }

    /// Drop every cached id of `entity`, e.g. after its entities were deleted.
    pub fn forget(&mut self, entity: &str) {
        self.cache.retain(|(cached_entity, _, _), _| cached_entity != entity);
    }

    pub fn cached(&self, entity: &str, field: &str, value: &Value) -> Option<&RemoteId> {
        self.cache.get(&cache_key(entity, field, value))
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

fn cache_key(entity: &str, field: &str, value: &Value) -> (String, String, String) {
    (entity.to_string(), field.to_string(), value.to_string())
}

/// Lookup value of a link: its fixed value, or the non-null record field.
pub(crate) fn source_value(link: &DependencyLink, record: &Record) -> Option<Value> {
    if let Some(fixed) = &link.fixed_value {
        return Some(Value::String(fixed.clone()));
    }
    match record.get(&link.field) {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) if text.trim().is_empty() => None,
        Some(value) => Some(value.clone()),
    }
}
