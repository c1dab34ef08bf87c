use std::collections::HashSet;
use std::path::{Component, Path};

use demoseed_core::{CONTRACT_VERSION, LinkRequirement, validate_schema};
use jsonschema::JSONSchema;
use serde_json::Value;

use crate::errors::{PlanError, ValidationIssue, ValidationReport};
use crate::model::{AppManifest, RecordType, SeedTarget, Theme};
use crate::schema::manifest_json_schema;

/// Manifest that passed validation, with its seeding order and warnings.
#[derive(Debug, Clone)]
pub struct ValidatedManifest {
    pub manifest: AppManifest,
    pub seed_order: Vec<String>,
    pub warnings: Vec<ValidationIssue>,
}

/// Check a manifest document against the manifest JSON Schema.
pub fn validate_manifest_json(
    manifest_json: &Value,
    manifest_schema: &Value,
) -> Result<ValidationReport, PlanError> {
    let compiled =
        JSONSchema::compile(manifest_schema).map_err(|err| PlanError::Schema(err.to_string()))?;

    let mut report = ValidationReport::default();
    if let Err(errors) = compiled.validate(manifest_json) {
        for error in errors {
            let pointer = error.instance_path.to_string();
            let path = if pointer.is_empty() { "/".to_string() } else { pointer };
            report.push(ValidationIssue::error("schema_violation", path, error.to_string()));
        }
    }
    Ok(report)
}

/// Structural then semantic validation of a manifest document.
pub fn validate_manifest(
    manifest_json: &Value,
    manifest_schema: &Value,
) -> std::result::Result<ValidatedManifest, ValidationReport> {
    let structural = validate_manifest_json(manifest_json, manifest_schema).map_err(|err| {
        let mut report = ValidationReport::default();
        report.push(ValidationIssue::error(
            "schema_validation_error",
            "/",
            err.to_string(),
        ));
        report
    })?;
    if !structural.is_ok() {
        return Err(structural);
    }

    let manifest: AppManifest = serde_json::from_value(manifest_json.clone()).map_err(|err| {
        let mut report = ValidationReport::default();
        report.push(ValidationIssue::error("invalid_manifest_json", "/", err.to_string()));
        report
    })?;

    let report = validate_manifest_semantics(&manifest);
    if !report.is_ok() {
        return Err(report);
    }

    let seed_order = manifest
        .dependency_report()
        .topo_order
        .unwrap_or_default();
    Ok(ValidatedManifest {
        manifest,
        seed_order,
        warnings: report.warnings,
    })
}

/// Read and fully validate a manifest file.
pub fn load_manifest(path: &Path) -> Result<ValidatedManifest, PlanError> {
    let contents = std::fs::read_to_string(path)?;
    let manifest_json: Value = serde_json::from_str(&contents)?;
    let manifest_schema = serde_json::to_value(manifest_json_schema())?;
    validate_manifest(&manifest_json, &manifest_schema).map_err(PlanError::Invalid)
}

/// Cross-reference checks the JSON Schema cannot express.
pub fn validate_manifest_semantics(manifest: &AppManifest) -> ValidationReport {
    let mut report = ValidationReport::default();

    if manifest.manifest_version != CONTRACT_VERSION {
        report.push(
            ValidationIssue::error(
                "manifest_version_mismatch",
                "/manifest_version",
                format!(
                    "manifest_version '{}' is not supported (expected '{CONTRACT_VERSION}')",
                    manifest.manifest_version
                ),
            )
            .with_hint(format!("set manifest_version to \"{CONTRACT_VERSION}\"")),
        );
    }
    if manifest.app.trim().is_empty() || !is_safe_relative(&manifest.app) {
        report.push(ValidationIssue::error(
            "app_invalid",
            "/app",
            "app must be a non-empty relative directory name",
        ));
    }

    validate_theme(&manifest.theme, &mut report);
    validate_record_types(&manifest.record_types, &mut report);
    validate_seed_targets(manifest, &mut report);

    report
}

fn validate_theme(theme: &Theme, report: &mut ValidationReport) {
    if theme.subject.trim().is_empty() {
        report.push(ValidationIssue::error(
            "theme_subject_empty",
            "/theme/subject",
            "theme subject is required",
        ));
    }
    if theme.company_name.trim().is_empty() {
        report.push(
            ValidationIssue::warning(
                "company_name_empty",
                "/theme/company_name",
                "no company name; generated records will not reference the demo company",
            )
            .with_hint("set theme.company_name"),
        );
    }
    for (name, words) in &theme.vocabularies {
        if words.is_empty() {
            report.push(ValidationIssue::warning(
                "vocabulary_empty",
                format!("/theme/vocabularies/{name}"),
                format!("vocabulary '{name}' has no entries"),
            ));
        }
    }
}

fn validate_record_types(record_types: &[RecordType], report: &mut ValidationReport) {
    if record_types.is_empty() {
        report.push(
            ValidationIssue::error(
                "record_types_empty",
                "/record_types",
                "manifest requires at least one record type",
            )
            .with_hint("add a record type with a schema and a file name"),
        );
        return;
    }

    let mut names = HashSet::new();
    let mut files = HashSet::new();
    for (idx, record_type) in record_types.iter().enumerate() {
        let base = format!("/record_types/{idx}");
        if !names.insert(record_type.name()) {
            report.push(ValidationIssue::error(
                "duplicate_record_type",
                format!("{base}/schema/name"),
                format!("record type '{}' is declared twice", record_type.name()),
            ));
        }
        if let Err(err) = validate_schema(&record_type.schema) {
            report.push(ValidationIssue::error(
                "invalid_record_schema",
                format!("{base}/schema"),
                err.to_string(),
            ));
        }

        if record_type.file.trim().is_empty() || !is_safe_relative(&record_type.file) {
            report.push(ValidationIssue::error(
                "file_invalid",
                format!("{base}/file"),
                format!("'{}' is not a relative file name", record_type.file),
            ));
        } else if !record_type.file.ends_with(".json") {
            report.push(ValidationIssue::warning(
                "file_extension",
                format!("{base}/file"),
                "record sets are JSON; use a .json file name",
            ));
        }
        if !files.insert(record_type.file.as_str()) {
            report.push(ValidationIssue::error(
                "duplicate_file",
                format!("{base}/file"),
                format!("file '{}' is used by more than one record type", record_type.file),
            ));
        }

        if let Some(generation) = &record_type.generation {
            if generation.target_count == 0 {
                report.push(ValidationIssue::error(
                    "target_count_zero",
                    format!("{base}/generation/target_count"),
                    "target_count must be greater than zero",
                ));
            }
            if generation.batch_size == 0 {
                report.push(ValidationIssue::error(
                    "batch_size_zero",
                    format!("{base}/generation/batch_size"),
                    "batch_size must be greater than zero",
                ));
            } else if generation.batch_size > generation.target_count {
                report.push(ValidationIssue::warning(
                    "batch_size_exceeds_target",
                    format!("{base}/generation/batch_size"),
                    "batch_size is larger than target_count; batches are capped at the remaining count",
                ));
            }
            if generation
                .temperature
                .is_some_and(|temperature| !(0.0..=2.0).contains(&temperature))
            {
                report.push(ValidationIssue::error(
                    "temperature_out_of_range",
                    format!("{base}/generation/temperature"),
                    "temperature must be within 0.0..=2.0",
                ));
            }
        }
    }
}

fn validate_seed_targets(manifest: &AppManifest, report: &mut ValidationReport) {
    let mut names = HashSet::new();
    for (idx, target) in manifest.seed_targets.iter().enumerate() {
        let base = format!("/seed_targets/{idx}");
        if !names.insert(target.name.as_str()) {
            report.push(ValidationIssue::error(
                "duplicate_seed_target",
                format!("{base}/name"),
                format!("seed target '{}' is declared twice", target.name),
            ));
        }
        if target.entity.trim().is_empty() {
            report.push(ValidationIssue::error(
                "entity_empty",
                format!("{base}/entity"),
                "remote entity name is required",
            ));
        }
        for after in &target.after {
            if manifest.seed_target(after).is_none() {
                report.push(ValidationIssue::error(
                    "unknown_seed_target",
                    format!("{base}/after"),
                    format!("'{after}' is not a seed target"),
                ));
            }
        }

        match manifest.record_type(&target.record_type) {
            Some(record_type) => validate_target_fields(target, record_type, &base, report),
            None => report.push(ValidationIssue::error(
                "unknown_record_type",
                format!("{base}/record_type"),
                format!("record type '{}' is not declared", target.record_type),
            )),
        }
    }

    if let Some(cycle) = manifest.dependency_report().cycle {
        report.push(
            ValidationIssue::error(
                "dependency_cycle",
                "/seed_targets",
                format!("seed targets depend on each other: {}", cycle.join(", ")),
            )
            .with_hint("remove an `after` entry or a link between these targets"),
        );
    }
}

fn validate_target_fields(
    target: &SeedTarget,
    record_type: &RecordType,
    base: &str,
    report: &mut ValidationReport,
) {
    let schema = &record_type.schema;

    if target.key.is_empty() {
        report.push(ValidationIssue::error(
            "key_empty",
            format!("{base}/key"),
            "seed target needs at least one key field for remote lookup",
        ));
    }
    for (key_idx, key) in target.key.iter().enumerate() {
        if schema.field(&key.field).is_none() {
            report.push(ValidationIssue::error(
                "key_field_unknown",
                format!("{base}/key/{key_idx}/field"),
                format!("'{}' is not a field of '{}'", key.field, schema.name),
            ));
        }
    }
    let key_fields: Vec<&str> = target.key.iter().map(|key| key.field.as_str()).collect();
    let natural: Vec<&str> = schema.natural_key.fields.iter().map(String::as_str).collect();
    if !target.key.is_empty() && key_fields != natural {
        report.push(ValidationIssue::warning(
            "key_differs_from_natural_key",
            format!("{base}/key"),
            format!(
                "remote lookup uses [{}] but the record natural key is [{}]",
                key_fields.join(", "),
                natural.join(", ")
            ),
        ));
    }

    for (link_idx, link) in target.links.iter().enumerate() {
        let path = format!("{base}/links/{link_idx}");
        match &link.fixed_value {
            Some(_) if link.requirement != LinkRequirement::Structural => {
                report.push(ValidationIssue::warning(
                    "fixed_link_not_structural",
                    path,
                    "a fixed-value link is shared by every record; mark it structural",
                ));
            }
            Some(_) => {}
            None if schema.field(&link.field).is_none() => {
                report.push(ValidationIssue::error(
                    "link_field_unknown",
                    format!("{path}/field"),
                    format!("'{}' is not a field of '{}'", link.field, schema.name),
                ));
            }
            None => {}
        }
    }

    let mapped = target
        .mapping
        .exclude
        .iter()
        .map(|name| ("exclude", name))
        .chain(target.mapping.rename.keys().map(|name| ("rename", name)));
    for (section, name) in mapped {
        if schema.field(name).is_none() {
            report.push(ValidationIssue::warning(
                "mapping_field_unknown",
                format!("{base}/mapping/{section}"),
                format!("'{name}' is not a field of '{}'", schema.name),
            ));
        }
    }
}

fn is_safe_relative(name: &str) -> bool {
    Path::new(name)
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
}
