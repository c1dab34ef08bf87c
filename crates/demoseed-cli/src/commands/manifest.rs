use std::path::{Path, PathBuf};

use demoseed_core::write_bytes_atomic;
use demoseed_plan::{PlanError, ValidatedManifest, load_manifest, manifest_json_schema};
use serde::Serialize;
use tracing::info;

use super::print_json;
use crate::CliError;

/// What `manifest validate` prints.
#[derive(Debug, Serialize)]
pub struct ManifestSummary<'a> {
    pub valid: bool,
    pub app: &'a str,
    pub record_types: Vec<&'a str>,
    pub generated: Vec<&'a str>,
    pub seed_order: &'a [String],
    pub warnings: &'a [demoseed_plan::ValidationIssue],
}

impl<'a> ManifestSummary<'a> {
    pub fn of(validated: &'a ValidatedManifest) -> Self {
        let manifest = &validated.manifest;
        Self {
            valid: true,
            app: &manifest.app,
            record_types: manifest.record_types.iter().map(|rt| rt.name()).collect(),
            generated: manifest
                .record_types
                .iter()
                .filter(|rt| rt.generation.is_some())
                .map(|rt| rt.name())
                .collect(),
            seed_order: &validated.seed_order,
            warnings: &validated.warnings,
        }
    }
}

pub fn run_validate(manifest_path: &Path) -> Result<(), CliError> {
    match load_manifest(manifest_path) {
        Ok(validated) => {
            info!(
                manifest = %manifest_path.display(),
                warnings = validated.warnings.len(),
                "manifest is valid"
            );
            print_json(&ManifestSummary::of(&validated))
        }
        Err(PlanError::Invalid(report)) => {
            print_json(&report)?;
            Err(PlanError::Invalid(report).into())
        }
        Err(err) => Err(err.into()),
    }
}

/// Print the manifest JSON Schema, or write it to `out`.
pub fn run_schema(out: Option<PathBuf>) -> Result<(), CliError> {
    let schema = manifest_json_schema();
    match out {
        Some(path) => {
            let mut bytes = serde_json::to_vec_pretty(&schema)?;
            bytes.push(b'\n');
            write_bytes_atomic(&path, &bytes)?;
            info!(path = %path.display(), "manifest schema written");
            Ok(())
        }
        None => print_json(&schema),
    }
}
