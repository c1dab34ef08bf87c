use std::path::Path;

use tracing::info;

use super::{CommandContext, print_json};
use crate::CliError;
use crate::workspace::{PASSPHRASE_VAR, load_env_file, store_credentials, stored_names};

fn passphrase(ctx: &CommandContext) -> Result<String, CliError> {
    std::env::var(PASSPHRASE_VAR)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            CliError::InvalidConfig(format!(
                "{PASSPHRASE_VAR} must be set to encrypt {}",
                ctx.paths.credentials_path().display()
            ))
        })
}

/// Encrypt the `KEY=VALUE` lines of `env_file` into the workspace credentials.
pub fn run_store(ctx: &CommandContext, env_file: &Path) -> Result<(), CliError> {
    let passphrase = passphrase(ctx)?;
    let values = load_env_file(env_file)?;
    if values.is_empty() {
        return Err(CliError::InvalidConfig(format!(
            "{} has no KEY=VALUE lines",
            env_file.display()
        )));
    }
    let added = values.len();
    let names = store_credentials(&ctx.paths, &passphrase, values)?;
    info!(
        added,
        stored = names.len(),
        path = %ctx.paths.credentials_path().display(),
        "credentials stored"
    );
    print_json(&names)
}

/// List stored credential names; values are never printed.
pub fn run_list(ctx: &CommandContext) -> Result<(), CliError> {
    let passphrase = passphrase(ctx)?;
    print_json(&stored_names(&ctx.paths, &passphrase)?)
}
