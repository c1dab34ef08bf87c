use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use demoseed_plan::{SeedTarget, ValidatedManifest, load_manifest};
use demoseed_seed::{ClearResult, Seeder};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use super::seed::load_target_records;
use super::{CommandContext, cancel_on_ctrl_c, clients, print_json};
use crate::CliError;
use crate::registry::write_artifact;

/// Outcome of one `clear` command across its targets.
#[derive(Debug, Default, Serialize)]
pub struct ClearSummary {
    pub deleted: usize,
    pub missing: usize,
    pub failed: usize,
    /// Targets without a persisted record set.
    pub skipped: Vec<String>,
    pub targets: Vec<ClearResult>,
}

impl ClearSummary {
    fn add(&mut self, result: ClearResult) {
        self.deleted += result.deleted;
        self.missing += result.missing;
        self.failed += result.failed;
        self.targets.push(result);
    }
}

/// Targets to clear: just `only`, or every target with dependents first.
pub fn clear_order<'a>(
    validated: &'a ValidatedManifest,
    only: Option<&str>,
) -> Result<Vec<&'a SeedTarget>, CliError> {
    let names: Vec<&str> = match only {
        Some(name) => vec![name],
        None => validated.seed_order.iter().rev().map(String::as_str).collect(),
    };
    names
        .into_iter()
        .map(|name| {
            validated
                .manifest
                .seed_target(name)
                .ok_or_else(|| CliError::UnknownName {
                    kind: "seed target",
                    name: name.to_string(),
                })
        })
        .collect()
}

/// Delete the remote entities behind `targets`, in the given order.
///
/// With `skip_missing`, a target whose record set was never generated is
/// noted and passed over instead of failing the command.
pub async fn clear_targets(
    seeder: &mut Seeder,
    validated: &ValidatedManifest,
    targets: &[&SeedTarget],
    data_dir: &Path,
    skip_missing: bool,
    cancel: &AtomicBool,
    summary: &mut ClearSummary,
) -> Result<(), CliError> {
    for target in targets {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let records = match load_target_records(&validated.manifest, target, data_dir) {
            Ok(records) => records,
            Err(CliError::MissingRecordSet(path)) if skip_missing => {
                warn!(target_name = %target.name, path = %path.display(), "no record set; skipping");
                summary.skipped.push(target.name.clone());
                continue;
            }
            Err(err) => return Err(err),
        };
        let result = seeder.clear_until(&records, target, cancel).await?;
        summary.add(result);
    }
    Ok(())
}

pub async fn run_clear(
    ctx: &CommandContext,
    manifest_path: PathBuf,
    target_name: Option<String>,
    dry_run: bool,
) -> Result<(), CliError> {
    let validated = load_manifest(&manifest_path)?;
    let targets = clear_order(&validated, target_name.as_deref())?;
    let order: Vec<&str> = targets.iter().map(|target| target.name.as_str()).collect();
    let (_, run_paths) = ctx.begin_run(
        "clear",
        Some(&manifest_path),
        Some(&validated),
        json!({
            "targets": order,
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

    let mut summary = ClearSummary::default();
    let outcome = clear_targets(
        &mut seeder,
        &validated,
        &targets,
        &ctx.data_dir(),
        target_name.is_none(),
        &cancel,
        &mut summary,
    )
    .await;

    let path = write_artifact(&run_paths, "clear_result.json", &summary)?;
    info!(
        report = %path.display(),
        deleted = summary.deleted,
        missing = summary.missing,
        failed = summary.failed,
        "clear finished"
    );
    print_json(&summary)?;
    outcome
}
