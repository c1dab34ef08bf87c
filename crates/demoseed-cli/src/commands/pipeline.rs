use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use demoseed_core::{RetryPolicy, load_existing_records};
use demoseed_generate::{CompletionClient, GenerationReport};
use demoseed_plan::{AppManifest, RecordType, ValidatedManifest, load_manifest};
use demoseed_seed::{RemoteClient, SeedResult, Seeder};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use super::generate::{GenerateOverrides, generate_record_set};
use super::seed::{aborted_result, seed_record_set};
use super::{CommandContext, cancel_on_ctrl_c, clients, print_json, record_set_path};
use crate::CliError;
use crate::registry::write_artifact;

/// Outcome of a full generate-then-seed run.
#[derive(Debug, Default, Serialize)]
pub struct PipelineSummary {
    pub generation: Vec<GenerationReport>,
    /// Record types whose sets already met their target.
    pub up_to_date: Vec<String>,
    pub seeding: Vec<SeedResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<String>,
}

/// Record types with generation settings whose persisted set is short of
/// its target.
pub fn pending_generation<'a>(
    manifest: &'a AppManifest,
    data_dir: &Path,
) -> Result<Vec<&'a RecordType>, CliError> {
    let mut pending = Vec::new();
    for record_type in &manifest.record_types {
        let Some(settings) = &record_type.generation else {
            continue;
        };
        let existing = load_existing_records(&record_set_path(data_dir, manifest, record_type))?;
        if existing.len() < settings.target_count {
            pending.push(record_type);
        }
    }
    Ok(pending)
}

/// Generation collaborators for [`run_pipeline`].
pub struct PipelineOptions {
    pub data_dir: PathBuf,
    pub policy: RetryPolicy,
    pub default_max_tokens: u32,
    pub seed: Option<u64>,
}

/// Generate every short record set, then seed all targets in dependency
/// order through one seeder so later targets resolve earlier entities from
/// its cache. Stops at the first generation error or aborted target.
pub async fn run_pipeline(
    validated: &ValidatedManifest,
    completion: Option<Arc<dyn CompletionClient>>,
    remote: Arc<dyn RemoteClient>,
    options: &PipelineOptions,
    run_id: &str,
    cancel: &AtomicBool,
    summary: &mut PipelineSummary,
) -> Result<(), CliError> {
    let manifest = &validated.manifest;
    let pending = pending_generation(manifest, &options.data_dir)?;
    for record_type in &manifest.record_types {
        if record_type.generation.is_some()
            && !pending.iter().any(|other| other.name() == record_type.name())
        {
            summary.up_to_date.push(record_type.name().to_string());
        }
    }

    if !pending.is_empty() {
        let client = completion.ok_or_else(|| {
            CliError::InvalidConfig("record sets need generation but no LLM client is configured".to_string())
        })?;
        let overrides = GenerateOverrides {
            seed: options.seed,
            ..GenerateOverrides::default()
        };
        for record_type in pending {
            let output = record_set_path(&options.data_dir, manifest, record_type);
            let report = match generate_record_set(
                manifest,
                record_type,
                Arc::clone(&client),
                options.policy.clone(),
                options.default_max_tokens,
                output,
                run_id,
                &overrides,
            )
            .await
            {
                Ok(report) => report,
                Err(err) => {
                    summary.stopped_at = Some(format!("generate {}", record_type.name()));
                    return Err(err);
                }
            };
            if !report.is_complete() {
                warn!(
                    record_type = %record_type.name(),
                    total = report.total_records,
                    target = report.target_count,
                    "record set below target; seeding what exists"
                );
            }
            summary.generation.push(report);
        }
    }

    let mut seeder = Seeder::new(remote, options.policy.clone());
    for name in &validated.seed_order {
        if cancel.load(Ordering::Relaxed) {
            summary.stopped_at = Some(format!("seed {name}"));
            info!(target_name = %name, "run interrupted before target");
            break;
        }
        let Some(target) = manifest.seed_target(name) else {
            continue;
        };
        match seed_record_set(&mut seeder, manifest, target, &options.data_dir, cancel).await {
            Ok(result) => summary.seeding.push(result),
            Err(err) => {
                if let Some(result) = aborted_result(&err) {
                    summary.seeding.push(result.clone());
                }
                summary.stopped_at = Some(format!("seed {name}"));
                return Err(err);
            }
        }
    }
    Ok(())
}

pub async fn run_all(
    ctx: &CommandContext,
    manifest_path: PathBuf,
    dry_run: bool,
    seed: Option<u64>,
) -> Result<(), CliError> {
    let validated = load_manifest(&manifest_path)?;
    let manifest = &validated.manifest;
    let (run_id, run_paths) = ctx.begin_run(
        "run",
        Some(&manifest_path),
        Some(&validated),
        json!({
            "dry_run": dry_run,
            "seed": seed,
            "seed_order": validated.seed_order,
        }),
    )?;

    let options = PipelineOptions {
        data_dir: ctx.data_dir(),
        policy: ctx.settings.retry.policy(),
        default_max_tokens: ctx.settings.llm.max_tokens,
        seed,
    };
    let secrets = ctx.secrets()?;
    let completion = if pending_generation(manifest, &options.data_dir)?.is_empty() {
        None
    } else {
        Some(clients::completion_client(&ctx.settings.llm, &secrets)?)
    };
    let remote =
        clients::remote_client(&ctx.settings.remote, &secrets, &options.policy, dry_run).await?;
    let cancel = cancel_on_ctrl_c();

    let mut summary = PipelineSummary::default();
    let outcome = run_pipeline(
        &validated,
        completion,
        remote,
        &options,
        &run_id,
        &cancel,
        &mut summary,
    )
    .await;

    let path = write_artifact(&run_paths, "pipeline_summary.json", &summary)?;
    info!(report = %path.display(), ok = outcome.is_ok(), "run finished");
    print_json(&summary)?;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use demoseed_generate::ScriptedClient;
    use demoseed_plan::validate_manifest;
    use demoseed_seed::{InMemoryRemote, RemoteOp};
    use serde_json::Value;

    fn manifest() -> ValidatedManifest {
        let document = json!({
            "manifest_version": "0.1",
            "app": "shop",
            "theme": {"subject": "bicycle repair", "company_name": "Spoke & Chain"},
            "record_types": [
                {
                    "file": "categories.json",
                    "schema": {
                        "name": "categories",
                        "natural_key": {"fields": ["name"]},
                        "fields": [{"name": "name", "kind": {"type": "string"}}]
                    },
                    "generation": {"target_count": 2, "batch_size": 2}
                },
                {
                    "file": "parts.json",
                    "schema": {
                        "name": "parts",
                        "natural_key": {"fields": ["name"]},
                        "fields": [
                            {"name": "name", "kind": {"type": "string"}},
                            {"name": "category", "kind": {"type": "string"}}
                        ]
                    }
                }
            ],
            "seed_targets": [
                {
                    "name": "parts",
                    "record_type": "parts",
                    "entity": "product.template",
                    "key": [{"field": "name"}],
                    "links": [{
                        "field": "category", "entity": "product.category",
                        "lookup_field": "name", "target_field": "categ_id"
                    }]
                },
                {
                    "name": "categories",
                    "record_type": "categories",
                    "entity": "product.category",
                    "key": [{"field": "name"}]
                }
            ]
        });
        let schema = serde_json::to_value(demoseed_plan::manifest_json_schema()).unwrap();
        validate_manifest(&document, &schema).unwrap()
    }

    fn options(data_dir: &Path) -> PipelineOptions {
        PipelineOptions {
            data_dir: data_dir.to_path_buf(),
            policy: RetryPolicy::immediate(2),
            default_max_tokens: 1024,
            seed: Some(7),
        }
    }

    fn write_parts(data_dir: &Path, parts: Value) {
        let dir = data_dir.join("shop");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("parts.json"), parts.to_string()).unwrap();
    }

    #[tokio::test]
    async fn generates_missing_sets_then_seeds_in_dependency_order() {
        let dir = tempfile::tempdir().unwrap();
        write_parts(
            dir.path(),
            json!([
                {"name": "Chain 11s", "category": "Drivetrain"},
                {"name": "Brake Pad", "category": "Brakes"}
            ]),
        );
        let llm = Arc::new(ScriptedClient::new());
        llm.push_text(json!([{"name": "Drivetrain"}, {"name": "Brakes"}]).to_string());
        let remote = Arc::new(InMemoryRemote::new());
        let validated = manifest();
        assert_eq!(validated.seed_order, vec!["categories", "parts"]);

        let mut summary = PipelineSummary::default();
        run_pipeline(
            &validated,
            Some(llm),
            remote.clone(),
            &options(dir.path()),
            "run-1",
            &AtomicBool::new(false),
            &mut summary,
        )
        .await
        .unwrap();

        assert_eq!(summary.generation.len(), 1);
        assert_eq!(summary.generation[0].total_records, 2);
        assert_eq!(summary.seeding.len(), 2);
        assert_eq!(summary.seeding[1].created, 2);
        assert_eq!(remote.count("product.category"), 2);
        assert_eq!(remote.count("product.template"), 2);
        let category_searches = remote
            .calls_of(RemoteOp::Search)
            .iter()
            .filter(|call| call.entity == "product.category")
            .count();
        assert_eq!(category_searches, 2);
    }

    #[tokio::test]
    async fn complete_sets_need_no_language_model() {
        let dir = tempfile::tempdir().unwrap();
        write_parts(dir.path(), json!([{"name": "Tube", "category": "Wheels"}]));
        std::fs::write(
            dir.path().join("shop").join("categories.json"),
            json!([{"name": "Wheels"}, {"name": "Tires"}]).to_string(),
        )
        .unwrap();
        let remote = Arc::new(InMemoryRemote::new());
        let validated = manifest();

        assert!(pending_generation(&validated.manifest, dir.path()).unwrap().is_empty());
        let mut summary = PipelineSummary::default();
        run_pipeline(
            &validated,
            None,
            remote.clone(),
            &options(dir.path()),
            "run-2",
            &AtomicBool::new(false),
            &mut summary,
        )
        .await
        .unwrap();

        assert_eq!(summary.up_to_date, vec!["categories"]);
        assert_eq!(remote.count("product.template"), 1);
    }

    #[tokio::test]
    async fn missing_static_record_set_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("shop")).unwrap();
        std::fs::write(
            dir.path().join("shop").join("categories.json"),
            json!([{"name": "Wheels"}, {"name": "Tires"}]).to_string(),
        )
        .unwrap();
        let validated = manifest();

        let mut summary = PipelineSummary::default();
        let err = run_pipeline(
            &validated,
            None,
            Arc::new(InMemoryRemote::new()),
            &options(dir.path()),
            "run-3",
            &AtomicBool::new(false),
            &mut summary,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CliError::MissingRecordSet(_)));
        assert_eq!(summary.seeding.len(), 1);
        assert_eq!(summary.stopped_at.as_deref(), Some("seed parts"));
    }
}
