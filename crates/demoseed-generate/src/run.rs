use std::path::PathBuf;

use chrono::Utc;
use demoseed_core::{Record, RunContext, load_existing_records, write_record_set};
use demoseed_plan::{GenerationSettings, Theme};
use tracing::{info, warn};

use crate::errors::GenerationError;
use crate::generator::Generator;
use crate::model::GenerationReport;

/// Size and persistence settings for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub target_count: usize,
    pub batch_size: usize,
    pub max_consecutive_failures: u32,
    /// Record-set file, read on start and rewritten after every batch.
    pub output: PathBuf,
}

impl RunOptions {
    pub fn from_settings(settings: &GenerationSettings, output: PathBuf) -> Self {
        Self {
            target_count: settings.target_count,
            batch_size: settings.batch_size,
            max_consecutive_failures: settings.max_consecutive_failures,
            output,
        }
    }
}

/// Batch loop that grows a record set to its target size.
pub struct GenerationRun {
    generator: Generator,
    theme: Theme,
    options: RunOptions,
}

impl GenerationRun {
    pub fn new(generator: Generator, theme: Theme, options: RunOptions) -> Self {
        Self {
            generator,
            theme,
            options,
        }
    }

    /// Run until the target is met or too many consecutive batches fail.
    ///
    /// Records already in the output file count toward the target and seed the
    /// exclusion tracker. Completion failures that survive retries and write
    /// failures end the run with an error; everything accepted before that
    /// is already on disk.
    pub async fn execute(&mut self, ctx: &mut RunContext) -> Result<GenerationReport, GenerationError> {
        let schema = self.generator.schema().clone();
        let output = self.options.output.display().to_string();
        let mut records: Vec<Record> =
            load_existing_records(&self.options.output).map_err(GenerationError::Existing)?;
        ctx.resume_from(&schema, &records);

        let mut report = GenerationReport::new(
            ctx.run_id(),
            schema.name.clone(),
            output.clone(),
            self.options.target_count,
        );
        report.existing = records.len();

        let batch_size = self.options.batch_size.max(1);
        let mut remaining = self.options.target_count.saturating_sub(records.len());
        let mut consecutive_failures = 0u32;

        info!(
            run_id = %ctx.run_id(),
            record_type = %schema.name,
            target = self.options.target_count,
            existing = records.len(),
            remaining,
            batch_size,
            "generation started"
        );

        while remaining > 0 {
            let count = remaining.min(batch_size);
            match self
                .generator
                .generate(count, &self.theme, ctx.exclusions())
                .await
            {
                Ok(mut batch) => {
                    consecutive_failures = 0;
                    for record in &mut batch.records {
                        ctx.assign_sequences(&schema, record);
                    }
                    ctx.exclusions_mut().register_batch(&batch.keys);
                    report.record_batch(&batch);

                    remaining = remaining.saturating_sub(batch.records.len());
                    records.append(&mut batch.records);
                    write_record_set(&self.options.output, &records).map_err(|source| {
                        GenerationError::Persist {
                            path: output.clone(),
                            source,
                        }
                    })?;
                }
                Err(err) if err.is_batch_failure() => {
                    consecutive_failures += 1;
                    let (received, invalid, duplicates) = match &err {
                        GenerationError::NoUsableOutput {
                            candidates,
                            invalid,
                            duplicates,
                        } => (*candidates, *invalid, *duplicates),
                        _ => (0, 0, 0),
                    };
                    report.record_failed_batch(count, received, invalid, duplicates, &err.to_string());
                    warn!(
                        record_type = %schema.name,
                        consecutive_failures,
                        max = self.options.max_consecutive_failures,
                        error = %err,
                        "batch failed"
                    );
                    if consecutive_failures >= self.options.max_consecutive_failures {
                        warn!(
                            record_type = %schema.name,
                            total = records.len(),
                            target = self.options.target_count,
                            "stopping after consecutive failed batches"
                        );
                        report.stopped_early = true;
                        break;
                    }
                }
                Err(err) => return Err(err),
            }
        }

        report.total_records = records.len();
        report.finished_at = Some(Utc::now());
        info!(
            run_id = %ctx.run_id(),
            record_type = %schema.name,
            generated = report.accepted + report.invalid + report.duplicates,
            validated = report.accepted,
            rejected = report.invalid + report.duplicates,
            total = report.total_records,
            "generation completed"
        );
        Ok(report)
    }
}
