use std::path::PathBuf;
use std::sync::Arc;

use demoseed_core::{ExclusionTracker, RetryPolicy, RunContext};
use demoseed_generate::{
    CompletionClient, GenerationReport, GenerationRun, Generator, GeneratorOptions, RunOptions,
};
use demoseed_plan::{AppManifest, RecordType, load_manifest};
use serde_json::json;
use tracing::info;

use super::{CommandContext, clients, print_json};
use crate::CliError;
use crate::registry::write_artifact;

/// Command-line overrides of a record type's generation settings.
#[derive(Debug, Clone, Default)]
pub struct GenerateOverrides {
    pub count: Option<usize>,
    pub batch_size: Option<usize>,
    pub seed: Option<u64>,
}

/// Grow the record set of `record_type` at `output` to its target size.
#[allow(clippy::too_many_arguments)]
pub async fn generate_record_set(
    manifest: &AppManifest,
    record_type: &RecordType,
    client: Arc<dyn CompletionClient>,
    policy: RetryPolicy,
    default_max_tokens: u32,
    output: PathBuf,
    run_id: &str,
    overrides: &GenerateOverrides,
) -> Result<GenerationReport, CliError> {
    let settings = record_type.generation.as_ref().ok_or_else(|| {
        CliError::InvalidConfig(format!(
            "record type '{}' is static and has no generation settings",
            record_type.name()
        ))
    })?;

    let seed = overrides.seed.unwrap_or_else(clock_seed);
    let options = GeneratorOptions::from_settings(settings, default_max_tokens, seed);
    let generator = Generator::with_options(client, record_type.schema.clone(), policy, options);

    let mut run_options = RunOptions::from_settings(settings, output);
    if let Some(count) = overrides.count {
        run_options.target_count = count;
    }
    if let Some(batch_size) = overrides.batch_size {
        run_options.batch_size = batch_size;
    }

    let mut ctx = RunContext::new(
        run_id,
        ExclusionTracker::new(record_type.schema.natural_key.matching),
    );
    let mut run = GenerationRun::new(generator, manifest.theme.clone(), run_options);
    Ok(run.execute(&mut ctx).await?)
}

fn clock_seed() -> u64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64
}

pub async fn run_generate(
    ctx: &CommandContext,
    manifest_path: PathBuf,
    record_type: String,
    overrides: GenerateOverrides,
) -> Result<(), CliError> {
    let validated = load_manifest(&manifest_path)?;
    let manifest = &validated.manifest;
    let record_type = manifest
        .record_type(&record_type)
        .ok_or_else(|| CliError::UnknownName {
            kind: "record type",
            name: record_type.clone(),
        })?;

    let output = ctx.record_set_path(manifest, record_type);
    let (run_id, run_paths) = ctx.begin_run(
        "generate",
        Some(&manifest_path),
        Some(&validated),
        json!({
            "record_type": record_type.name(),
            "output": output.display().to_string(),
            "count": overrides.count,
            "batch_size": overrides.batch_size,
            "seed": overrides.seed,
            "llm": {
                "provider": ctx.settings.llm.provider,
                "model": ctx.settings.llm.model,
            },
        }),
    )?;

    let client = clients::completion_client(&ctx.settings.llm, &ctx.secrets()?)?;
    let report = generate_record_set(
        manifest,
        record_type,
        client,
        ctx.settings.retry.policy(),
        ctx.settings.llm.max_tokens,
        output,
        &run_id,
        &overrides,
    )
    .await?;

    let path = write_artifact(&run_paths, "generation_report.json", &report)?;
    info!(report = %path.display(), complete = report.is_complete(), "run finished");
    print_json(&report)
}
