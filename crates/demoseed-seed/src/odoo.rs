//! Odoo JSON-RPC client (`/jsonrpc`, `common.login` and `object.execute_kw`).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use demoseed_core::{Record, RetryError, RetryPolicy, mask_secret, redact_url, retry};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::client::{KeyFilter, RemoteClient, RemoteEntity, RemoteId};
use crate::errors::RemoteError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct OdooConfig {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for OdooConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OdooConfig")
            .field("url", &redact_url(&self.url))
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &mask_secret(&self.password))
            .finish()
    }
}

/// Authenticated Odoo session.
pub struct OdooRpcClient {
    http: Client,
    endpoint: String,
    config: OdooConfig,
    uid: i64,
    request_id: AtomicU64,
}

impl fmt::Debug for OdooRpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OdooRpcClient")
            .field("config", &self.config)
            .field("uid", &self.uid)
            .finish()
    }
}

impl OdooRpcClient {
    /// Log in and keep the user id for later calls.
    pub async fn connect(config: OdooConfig) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| RemoteError::Protocol(format!("http client setup failed: {err}")))?;
        let endpoint = format!("{}/jsonrpc", config.url.trim_end_matches('/'));

        let mut client = Self {
            http,
            endpoint,
            config,
            uid: 0,
            request_id: AtomicU64::new(1),
        };
        let login = client
            .call(
                "common",
                "login",
                json!([
                    client.config.database,
                    client.config.username,
                    client.config.password
                ]),
            )
            .await?;
        client.uid = match login {
            Value::Number(uid) => uid
                .as_i64()
                .ok_or_else(|| RemoteError::Protocol(format!("unexpected uid {uid}")))?,
            _ => {
                return Err(RemoteError::Auth(format!(
                    "login refused for user '{}' on database '{}'",
                    client.config.username, client.config.database
                )));
            }
        };
        info!(
            url = %redact_url(&client.config.url),
            database = %client.config.database,
            uid = client.uid,
            "connected to odoo"
        );
        Ok(client)
    }

    /// [`connect`](Self::connect) under `policy`: an unreachable server is
    /// retried, a refused login fails on the first attempt.
    pub async fn connect_with_retry(
        config: OdooConfig,
        policy: &RetryPolicy,
    ) -> Result<Self, RetryError<RemoteError>> {
        retry(policy, "odoo.login", || Self::connect(config.clone())).await
    }

    pub fn uid(&self) -> i64 {
        self.uid
    }

    /// `execute_kw` on `model`.
    pub async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Option<Value>,
    ) -> Result<Value, RemoteError> {
        let mut call_args = vec![
            json!(self.config.database),
            json!(self.uid),
            json!(self.config.password),
            json!(model),
            json!(method),
            args,
        ];
        if let Some(kwargs) = kwargs {
            call_args.push(kwargs);
        }
        debug!(model, method, "odoo execute_kw");
        self.call("object", "execute_kw", Value::Array(call_args))
            .await
    }

    async fn call(&self, service: &str, method: &str, args: Value) -> Result<Value, RemoteError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": {"service": service, "method": method, "args": args},
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
        });
        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| RemoteError::Transient(format!("request failed: {err}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| RemoteError::Transient(format!("response read failed: {err}")))?;
        if !status.is_success() {
            return Err(map_http_status(status, &text));
        }

        let payload: Value = serde_json::from_str(&text)
            .map_err(|err| RemoteError::Protocol(format!("invalid JSON-RPC response: {err}")))?;
        if let Some(error) = payload.get("error") {
            return Err(map_rpc_error(error));
        }
        payload
            .get("result")
            .cloned()
            .ok_or_else(|| RemoteError::Protocol("JSON-RPC response without result".to_string()))
    }
}

#[async_trait]
impl RemoteClient for OdooRpcClient {
    async fn search(
        &self,
        entity: &str,
        filter: &KeyFilter,
        limit: usize,
    ) -> Result<Vec<RemoteEntity>, RemoteError> {
        let mut fields: Vec<&str> = filter.fields().collect();
        fields.push("id");
        let rows = self
            .execute_kw(
                entity,
                "search_read",
                json!([domain(filter)]),
                Some(json!({"fields": fields, "limit": limit, "order": "id asc"})),
            )
            .await?;

        let Value::Array(rows) = rows else {
            return Err(RemoteError::Protocol(format!(
                "search_read on {entity} did not return a list"
            )));
        };
        rows.into_iter()
            .map(|row| {
                let Value::Object(mut fields) = row else {
                    return Err(RemoteError::Protocol(format!(
                        "search_read on {entity} returned a non-object row"
                    )));
                };
                let id = fields
                    .remove("id")
                    .as_ref()
                    .and_then(RemoteId::from_value)
                    .ok_or_else(|| RemoteError::Protocol(format!("{entity} row without id")))?;
                Ok(RemoteEntity { id, fields })
            })
            .collect()
    }

    async fn create(&self, entity: &str, payload: &Record) -> Result<RemoteId, RemoteError> {
        let created = self
            .execute_kw(entity, "create", json!([payload]), None)
            .await?;
        let id = match &created {
            Value::Array(ids) => ids.first().and_then(RemoteId::from_value),
            other => RemoteId::from_value(other),
        };
        id.ok_or_else(|| RemoteError::Protocol(format!("create on {entity} returned {created}")))
    }

    async fn update(
        &self,
        entity: &str,
        id: &RemoteId,
        payload: &Record,
    ) -> Result<(), RemoteError> {
        let written = self
            .execute_kw(entity, "write", json!([[id.to_value()], payload]), None)
            .await?;
        match written {
            Value::Bool(true) => Ok(()),
            other => Err(RemoteError::Rejected(format!(
                "write on {entity} {id} returned {other}"
            ))),
        }
    }

    async fn delete(&self, entity: &str, id: &RemoteId) -> Result<(), RemoteError> {
        let removed = self
            .execute_kw(entity, "unlink", json!([[id.to_value()]]), None)
            .await?;
        match removed {
            Value::Bool(true) => Ok(()),
            other => Err(RemoteError::Rejected(format!(
                "unlink on {entity} {id} returned {other}"
            ))),
        }
    }

    fn name(&self) -> &str {
        "odoo"
    }
}

/// Odoo domain for an exact-match filter: `[[field, "=", value], ...]`.
fn domain(filter: &KeyFilter) -> Value {
    Value::Array(
        filter
            .conditions
            .iter()
            .map(|(field, value)| json!([field, "=", value]))
            .collect(),
    )
}

fn map_http_status(status: StatusCode, body: &str) -> RemoteError {
    let message = format!("HTTP {}: {}", status.as_u16(), truncate(body, 200));
    match status.as_u16() {
        401 | 403 => RemoteError::Auth(message),
        404 => RemoteError::SchemaMismatch(message),
        429 => RemoteError::RateLimited(message),
        408 | 500..=599 => RemoteError::Transient(message),
        _ => RemoteError::Protocol(message),
    }
}

/// Classify a JSON-RPC `error` object by the server-side exception name.
fn map_rpc_error(error: &Value) -> RemoteError {
    let data = error.get("data");
    let name = data
        .and_then(|data| data.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let message = data
        .and_then(|data| data.get("message"))
        .or_else(|| error.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();

    let short_name = name.rsplit('.').next().unwrap_or(name);
    match short_name {
        "AccessDenied" | "AccessError" | "SessionExpiredException" => RemoteError::Auth(message),
        "MissingError" => RemoteError::NotFound(message),
        "KeyError" => RemoteError::SchemaMismatch(message),
        _ if message.starts_with("Invalid field") || message.contains("doesn't exist") => {
            RemoteError::SchemaMismatch(message)
        }
        "OperationalError" | "SerializationFailure" => RemoteError::Transient(message),
        _ => RemoteError::Rejected(message),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_lists_every_condition() {
        let filter = KeyFilter::new()
            .eq("code", json!("WH"))
            .eq("company_id", json!(1));
        assert_eq!(
            domain(&filter),
            json!([["code", "=", "WH"], ["company_id", "=", 1]])
        );
    }

    #[test]
    fn rpc_errors_are_classified_by_exception_name() {
        let denied = json!({"message": "Odoo Server Error", "data": {
            "name": "odoo.exceptions.AccessDenied", "message": "Access Denied"}});
        assert!(matches!(map_rpc_error(&denied), RemoteError::Auth(_)));

        let invalid = json!({"data": {"name": "builtins.ValueError",
            "message": "Invalid field 'colour' on model 'product.template'"}});
        assert!(matches!(map_rpc_error(&invalid), RemoteError::SchemaMismatch(_)));

        let constraint = json!({"data": {"name": "odoo.exceptions.ValidationError",
            "message": "The code must be unique"}});
        assert!(matches!(map_rpc_error(&constraint), RemoteError::Rejected(ref m) if m.contains("unique")));
    }

    #[test]
    fn http_statuses_map_to_retry_classes() {
        assert!(matches!(
            map_http_status(StatusCode::BAD_GATEWAY, "down"),
            RemoteError::Transient(_)
        ));
        assert!(matches!(
            map_http_status(StatusCode::TOO_MANY_REQUESTS, ""),
            RemoteError::RateLimited(_)
        ));
    }

    #[test]
    fn config_debug_masks_password() {
        let config = OdooConfig {
            url: "http://localhost:8069".to_string(),
            database: "demo".to_string(),
            username: "admin".to_string(),
            password: "super-secret-password".to_string(),
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret-password"));
    }
}
