use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use demoseed_core::{Record, load_record_set};
use demoseed_plan::{AppManifest, SeedTarget, load_manifest};
use demoseed_seed::{SeedError, SeedResult, Seeder};
use serde_json::json;
use tracing::info;

use super::{CommandContext, cancel_on_ctrl_c, clients, print_json, record_set_path};
use crate::CliError;
use crate::registry::write_artifact;

/// Seed the persisted record set behind `target`.
pub async fn seed_record_set(
    seeder: &mut Seeder,
    manifest: &AppManifest,
    target: &SeedTarget,
    data_dir: &Path,
    cancel: &AtomicBool,
) -> Result<SeedResult, CliError> {
    let records = load_target_records(manifest, target, data_dir)?;
    Ok(seeder.seed_until(&records, target, cancel).await?)
}

/// Persisted records of the record type behind `target`.
pub fn load_target_records(
    manifest: &AppManifest,
    target: &SeedTarget,
    data_dir: &Path,
) -> Result<Vec<Record>, CliError> {
    let record_type = manifest
        .record_type(&target.record_type)
        .ok_or_else(|| CliError::UnknownName {
            kind: "record type",
            name: target.record_type.clone(),
        })?;
    let path = record_set_path(data_dir, manifest, record_type);
    if !path.exists() {
        return Err(CliError::MissingRecordSet(path));
    }
    let records = load_record_set(&path)?;
    info!(
        target_name = %target.name,
        records = records.len(),
        source = %path.display(),
        "record set loaded"
    );
    Ok(records)
}

/// Partial result carried by an aborted seeding run.
pub fn aborted_result(err: &CliError) -> Option<&SeedResult> {
    match err {
        CliError::Seed(SeedError::Aborted { result, .. }) => Some(result.as_ref()),
        _ => None,
    }
}

pub async fn run_seed(
    ctx: &CommandContext,
    manifest_path: PathBuf,
    target_name: String,
    dry_run: bool,
) -> Result<(), CliError> {
    let validated = load_manifest(&manifest_path)?;
    let manifest = &validated.manifest;
    let target = manifest
        .seed_target(&target_name)
        .ok_or_else(|| CliError::UnknownName {
            kind: "seed target",
            name: target_name.clone(),
        })?;

    let (_, run_paths) = ctx.begin_run(
        "seed",
        Some(&manifest_path),
        Some(&validated),
        json!({
            "target": target.name,
            "entity": target.entity,
            "dry_run": dry_run,
            "remote": {
                "kind": ctx.settings.remote.kind,
                "base_url": demoseed_core::redact_url(&ctx.settings.remote.base_url),
            },
        }),
    )?;

    let policy = ctx.settings.retry.policy();
    let client =
        clients::remote_client(&ctx.settings.remote, &ctx.secrets()?, &policy, dry_run).await?;
    let mut seeder = Seeder::new(client, policy);
    let cancel = cancel_on_ctrl_c();

    let outcome = seed_record_set(&mut seeder, manifest, target, &ctx.data_dir(), &cancel).await;
    let result = match &outcome {
        Ok(result) => Some(result),
        Err(err) => aborted_result(err),
    };
    if let Some(result) = result {
        let path = write_artifact(&run_paths, "seed_result.json", result)?;
        info!(report = %path.display(), "seed result written");
        print_json(result)?;
    }
    outcome.map(|_| ())
}
