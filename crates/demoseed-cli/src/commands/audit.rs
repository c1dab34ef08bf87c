use std::path::PathBuf;

use demoseed_eval::{AuditEngine, AuditOptions};
use demoseed_plan::load_manifest;
use serde_json::json;
use tracing::info;

use super::{CommandContext, print_json};
use crate::CliError;

pub fn run_audit(
    ctx: &CommandContext,
    manifest_path: PathBuf,
    record_type: String,
    strict: bool,
) -> Result<(), CliError> {
    let validated = load_manifest(&manifest_path)?;
    let manifest = &validated.manifest;
    let record_type = manifest
        .record_type(&record_type)
        .ok_or_else(|| CliError::UnknownName {
            kind: "record type",
            name: record_type.clone(),
        })?;
    let path = ctx.record_set_path(manifest, record_type);
    if !path.exists() {
        return Err(CliError::MissingRecordSet(path));
    }

    let (_, run_paths) = ctx.begin_run(
        "audit",
        Some(&manifest_path),
        Some(&validated),
        json!({
            "record_type": record_type.name(),
            "source": path.display().to_string(),
            "strict": strict,
        }),
    )?;

    let engine = AuditEngine::new(AuditOptions {
        strict,
        write_violations: true,
        out_dir: Some(run_paths.root.clone()),
        ..AuditOptions::default()
    });
    let result = engine.run(&record_type.schema, &path)?;
    info!(
        report = %result.report_path.display(),
        clean = result.metrics.is_clean(),
        "audit finished"
    );
    print_json(&result.metrics)
}
