use std::collections::HashSet;
use std::sync::Arc;

use demoseed_core::{
    ExclusionTracker, RecordSchema, RetryPolicy, SchemaViolation, ViolationKind, accept_record,
    natural_key_of, retry,
};
use demoseed_plan::{GenerationSettings, Theme};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::errors::GenerationError;
use crate::llm::{CompletionClient, CompletionRequest};
use crate::model::{GeneratedBatch, Rejection, RejectionReason};
use crate::prompt::{SYSTEM_PROMPT, build_prompt};
use crate::response::extract_json_array;

/// Knobs for the completion request.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub instructions: Option<String>,
    /// Seed for vocabulary sampling.
    pub seed: u64,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            max_tokens: 8192,
            temperature: None,
            instructions: None,
            seed: 0,
        }
    }
}

impl GeneratorOptions {
    pub fn from_settings(settings: &GenerationSettings, default_max_tokens: u32, seed: u64) -> Self {
        Self {
            max_tokens: settings.max_tokens.unwrap_or(default_max_tokens),
            temperature: settings.temperature,
            instructions: settings.instructions.clone(),
            seed,
        }
    }
}

/// Produces validated batches of one record type.
pub struct Generator {
    client: Arc<dyn CompletionClient>,
    schema: RecordSchema,
    policy: RetryPolicy,
    options: GeneratorOptions,
    rng: ChaCha8Rng,
}

impl Generator {
    pub fn new(client: Arc<dyn CompletionClient>, schema: RecordSchema, policy: RetryPolicy) -> Self {
        Self::with_options(client, schema, policy, GeneratorOptions::default())
    }

    pub fn with_options(
        client: Arc<dyn CompletionClient>,
        schema: RecordSchema,
        policy: RetryPolicy,
        options: GeneratorOptions,
    ) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(options.seed);
        Self {
            client,
            schema,
            policy,
            options,
            rng,
        }
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Ask for `count` records and keep the valid ones that are new to
    /// `exclusions`. The tracker is only read; registering accepted keys is
    /// the caller's job once the batch is persisted.
    pub async fn generate(
        &mut self,
        count: usize,
        theme: &Theme,
        exclusions: &ExclusionTracker,
    ) -> Result<GeneratedBatch, GenerationError> {
        if count == 0 {
            return Ok(GeneratedBatch::default());
        }

        let prompt = build_prompt(
            &self.schema,
            theme,
            self.options.instructions.as_deref(),
            count,
            &exclusions.render_for_prompt(),
            &mut self.rng,
        );
        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt,
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
        };

        let label = format!("{}.complete", self.client.provider());
        let client = Arc::clone(&self.client);
        let completion = retry(&self.policy, &label, || {
            let client = Arc::clone(&client);
            let request = request.clone();
            async move { client.complete(&request).await }
        })
        .await?;

        if completion.truncated {
            warn!(
                record_type = %self.schema.name,
                output_tokens = completion.output_tokens,
                "completion hit the token limit"
            );
        }

        let candidates =
            extract_json_array(&completion.text).map_err(GenerationError::MalformedResponse)?;
        let batch = self.screen(count, candidates, exclusions);

        info!(
            record_type = %self.schema.name,
            requested = count,
            received = batch.received,
            accepted = batch.records.len(),
            invalid = batch.invalid(),
            duplicates = batch.duplicates(),
            "batch generated"
        );

        if batch.records.is_empty() {
            return Err(GenerationError::NoUsableOutput {
                candidates: batch.received,
                invalid: batch.invalid(),
                duplicates: batch.duplicates(),
            });
        }
        Ok(batch)
    }

    fn screen(
        &self,
        count: usize,
        candidates: Vec<serde_json::Value>,
        exclusions: &ExclusionTracker,
    ) -> GeneratedBatch {
        let matching = self.schema.natural_key.matching;
        let mut batch = GeneratedBatch {
            requested: count,
            received: candidates.len(),
            ..GeneratedBatch::default()
        };
        let mut batch_keys = HashSet::new();

        for (index, candidate) in candidates.into_iter().enumerate() {
            if batch.records.len() >= count {
                debug!(record_type = %self.schema.name, index, "dropping record beyond requested count");
                batch.rejections.push(Rejection {
                    index,
                    key: None,
                    reason: RejectionReason::Excess,
                });
                continue;
            }

            let record = match accept_record(&self.schema, candidate) {
                Ok(record) => record,
                Err(violation) => {
                    warn!(
                        record_type = %self.schema.name,
                        index,
                        field = %violation.field,
                        kind = violation.kind.as_str(),
                        expected = %violation.expected,
                        "generated record rejected"
                    );
                    batch.rejections.push(Rejection {
                        index,
                        key: None,
                        reason: RejectionReason::Invalid(violation),
                    });
                    continue;
                }
            };

            let Some(key) = natural_key_of(&self.schema, &record) else {
                let violation = SchemaViolation {
                    field: self.schema.natural_key.fields.join("+"),
                    expected: "a non-empty natural key".to_string(),
                    kind: ViolationKind::Missing,
                };
                warn!(record_type = %self.schema.name, index, "generated record has no natural key");
                batch.rejections.push(Rejection {
                    index,
                    key: None,
                    reason: RejectionReason::Invalid(violation),
                });
                continue;
            };

            if exclusions.is_excluded(&key) || !batch_keys.insert(matching.normalize(&key)) {
                warn!(record_type = %self.schema.name, index, key = %key, "duplicate record dropped");
                batch.rejections.push(Rejection {
                    index,
                    key: Some(key),
                    reason: RejectionReason::Duplicate,
                });
                continue;
            }

            batch.keys.push(key);
            batch.records.push(record);
        }

        batch
    }
}
