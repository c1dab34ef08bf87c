//! Generic JSON REST client: `GET` for lookups, `POST` to create, `PATCH` to
//! update and `DELETE` to clear.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use demoseed_core::{Record, mask_secret, redact_url};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::client::{KeyFilter, RemoteClient, RemoteEntity, RemoteId, display_value};
use crate::errors::RemoteError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Which kind of path a request targets.
///
/// A 404 on the collection means the entity type itself is unknown to the
/// server; on an item path it only means that one entity is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathKind {
    Collection,
    Item,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RestConfig {
    pub base_url: String,
    /// Bearer token, if the API requires one.
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    /// Key of the list in enveloped responses (`{"data": [...]}`).
    #[serde(default)]
    pub list_key: Option<String>,
    #[serde(default = "default_id_field")]
    pub id_field: String,
}

fn default_id_field() -> String {
    "id".to_string()
}

impl RestConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            list_key: None,
            id_field: default_id_field(),
        }
    }
}

impl fmt::Debug for RestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestConfig")
            .field("base_url", &redact_url(&self.base_url))
            .field("token", &self.token.as_deref().map(mask_secret))
            .field("list_key", &self.list_key)
            .field("id_field", &self.id_field)
            .finish()
    }
}

#[derive(Debug)]
pub struct RestClient {
    http: Client,
    config: RestConfig,
}

impl RestClient {
    pub fn new(config: RestConfig) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| RemoteError::Protocol(format!("http client setup failed: {err}")))?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, kind: PathKind) -> Result<Value, RemoteError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| RemoteError::Transient(format!("request failed: {err}")))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| RemoteError::Transient(format!("response read failed: {err}")))?;
        if !status.is_success() {
            return Err(map_status(status, &text, kind));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|err| RemoteError::Protocol(format!("invalid JSON response: {err}")))
    }

    fn entity_from(&self, value: Value) -> Result<RemoteEntity, RemoteError> {
        let Value::Object(mut fields) = value else {
            return Err(RemoteError::Protocol("list item is not an object".to_string()));
        };
        let id = fields
            .remove(&self.config.id_field)
            .as_ref()
            .and_then(RemoteId::from_value)
            .ok_or_else(|| {
                RemoteError::Protocol(format!("item without '{}'", self.config.id_field))
            })?;
        Ok(RemoteEntity { id, fields })
    }
}

#[async_trait]
impl RemoteClient for RestClient {
    async fn search(
        &self,
        entity: &str,
        filter: &KeyFilter,
        limit: usize,
    ) -> Result<Vec<RemoteEntity>, RemoteError> {
        let mut query: Vec<(String, String)> = filter
            .conditions
            .iter()
            .map(|(field, value)| (field.clone(), display_value(value)))
            .collect();
        query.push(("limit".to_string(), limit.to_string()));
        debug!(entity, filter = %filter, "rest search");

        let body = self
            .send(self.http.get(self.url(entity)).query(&query), PathKind::Collection)
            .await?;
        let items = list_items(body, self.config.list_key.as_deref())?;
        items
            .into_iter()
            .map(|item| self.entity_from(item))
            .filter(|entity| match entity {
                // Servers may ignore unknown query parameters; re-check locally.
                Ok(entity) => filter.matches(&entity.fields),
                Err(_) => true,
            })
            .take(limit)
            .collect()
    }

    async fn create(&self, entity: &str, payload: &Record) -> Result<RemoteId, RemoteError> {
        let body = self
            .send(self.http.post(self.url(entity)).json(payload), PathKind::Collection)
            .await?;
        created_id(&body, &self.config.id_field)
            .ok_or_else(|| RemoteError::Protocol(format!("create on {entity} returned no id")))
    }

    async fn update(
        &self,
        entity: &str,
        id: &RemoteId,
        payload: &Record,
    ) -> Result<(), RemoteError> {
        self.send(
            self.http
                .patch(self.url(&format!("{entity}/{id}")))
                .json(payload),
            PathKind::Item,
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, entity: &str, id: &RemoteId) -> Result<(), RemoteError> {
        self.send(
            self.http.delete(self.url(&format!("{entity}/{id}"))),
            PathKind::Item,
        )
        .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "rest"
    }
}

/// Items of a list response: a bare array, or an array under `list_key`
/// (falling back to `data` and `results`).
fn list_items(body: Value, list_key: Option<&str>) -> Result<Vec<Value>, RemoteError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut envelope) => {
            let key = list_key
                .map(str::to_string)
                .or_else(|| {
                    ["data", "results", "items"]
                        .into_iter()
                        .find(|key| envelope.get(*key).is_some_and(Value::is_array))
                        .map(str::to_string)
                })
                .ok_or_else(|| RemoteError::Protocol("no list in response".to_string()))?;
            match envelope.remove(&key) {
                Some(Value::Array(items)) => Ok(items),
                _ => Err(RemoteError::Protocol(format!("no list under '{key}'"))),
            }
        }
        Value::Null => Ok(Vec::new()),
        other => Err(RemoteError::Protocol(format!("unexpected list response: {other}"))),
    }
}

fn created_id(body: &Value, id_field: &str) -> Option<RemoteId> {
    body.get(id_field)
        .or_else(|| body.get("data").and_then(|data| data.get(id_field)))
        .and_then(RemoteId::from_value)
        .or_else(|| RemoteId::from_value(body))
}

fn map_status(status: StatusCode, body: &str, kind: PathKind) -> RemoteError {
    let snippet: String = body.chars().take(200).collect();
    let message = format!("HTTP {}: {snippet}", status.as_u16());
    match status.as_u16() {
        401 | 403 => RemoteError::Auth(message),
        404 if kind == PathKind::Collection => RemoteError::SchemaMismatch(message),
        404 => RemoteError::NotFound(message),
        400 | 409 | 422 => RemoteError::Rejected(message),
        429 => RemoteError::RateLimited(message),
        408 | 500..=599 => RemoteError::Transient(message),
        _ => RemoteError::Protocol(message),
    }
}
