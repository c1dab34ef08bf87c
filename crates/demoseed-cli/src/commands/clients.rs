use std::sync::Arc;

use demoseed_core::{RetryPolicy, redact_url};
use demoseed_generate::{AnthropicClient, CompletionClient, OpenAiClient};
use demoseed_seed::{
    InMemoryRemote, OdooConfig, OdooRpcClient, RemoteClient, RestClient, RestConfig, SeedError,
};
use tracing::info;

use crate::CliError;
use crate::workspace::{LlmProvider, LlmSettings, RemoteKind, RemoteSettings, Secrets};

pub const REMOTE_PASSWORD_VAR: &str = "DEMOSEED_REMOTE_PASSWORD";
pub const REMOTE_TOKEN_VAR: &str = "DEMOSEED_REMOTE_TOKEN";

pub fn completion_client(
    settings: &LlmSettings,
    secrets: &Secrets,
) -> Result<Arc<dyn CompletionClient>, CliError> {
    let api_key = secrets.require(settings.provider.api_key_var())?;
    let model = settings.model.clone();
    let base_url = settings.base_url.clone();
    let client: Arc<dyn CompletionClient> = match settings.provider {
        LlmProvider::Anthropic => Arc::new(AnthropicClient::new(model, api_key, base_url)?),
        LlmProvider::Openai => Arc::new(OpenAiClient::new(model, api_key, base_url)?),
    };
    info!(provider = client.provider(), model = client.model(), "completion client ready");
    Ok(client)
}

/// Remote client for `settings`; `dry_run` always yields an in-memory remote.
///
/// The Odoo login is retried under `policy` like any other remote call.
pub async fn remote_client(
    settings: &RemoteSettings,
    secrets: &Secrets,
    policy: &RetryPolicy,
    dry_run: bool,
) -> Result<Arc<dyn RemoteClient>, CliError> {
    if dry_run || settings.kind == RemoteKind::Memory {
        info!("using in-memory remote; nothing is written to a real system");
        return Ok(Arc::new(InMemoryRemote::new()));
    }

    info!(kind = ?settings.kind, url = %redact_url(&settings.base_url), "connecting to remote");
    match settings.kind {
        RemoteKind::Odoo => {
            let config = OdooConfig {
                url: settings.base_url.clone(),
                database: required(settings.database.as_deref(), "remote.database")?,
                username: required(settings.username.as_deref(), "remote.username")?,
                password: secrets.require(REMOTE_PASSWORD_VAR)?,
            };
            let client = OdooRpcClient::connect_with_retry(config, policy)
                .await
                .map_err(SeedError::from)?;
            Ok(Arc::new(client))
        }
        RemoteKind::Rest => {
            let config = RestConfig {
                base_url: settings.base_url.clone(),
                token: secrets.get(REMOTE_TOKEN_VAR),
                list_key: settings.list_key.clone(),
                id_field: settings.id_field.clone(),
            };
            Ok(Arc::new(RestClient::new(config)?))
        }
        RemoteKind::Memory => Ok(Arc::new(InMemoryRemote::new())),
    }
}

fn required(value: Option<&str>, key: &str) -> Result<String, CliError> {
    value
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| CliError::InvalidConfig(format!("settings key {key} is required")))
}
