use std::collections::BTreeMap;
use std::time::Duration;

use demoseed_core::{
    DependencyLink, DependencyNode, DependencyReport, Record, RecordSchema,
    build_dependency_report,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Everything demoseed needs to know about one target application.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AppManifest {
    /// Manifest contract version (see `demoseed_core::CONTRACT_VERSION`).
    pub manifest_version: String,
    /// Application name; also the record-set directory under the data dir.
    pub app: String,
    pub theme: Theme,
    pub record_types: Vec<RecordType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seed_targets: Vec<SeedTarget>,
}

/// Business theme every generated record should fit.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Theme {
    /// Industry or subject (e.g. `outdoor gear retail`).
    pub subject: String,
    pub company_name: String,
    /// Extra free-form guidance appended to every prompt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    /// Named word lists; a few entries of each are sampled into every prompt.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vocabularies: BTreeMap<String, Vec<String>>,
    #[serde(default = "default_vocabulary_sample")]
    pub vocabulary_sample: usize,
}

fn default_vocabulary_sample() -> usize {
    4
}

/// A record type: its contract, its record-set file and how it is produced.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecordType {
    pub schema: RecordSchema,
    /// Record-set file name, relative to `<data_dir>/<app>/`.
    pub file: String,
    /// Absent for static record sets maintained by hand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationSettings>,
}

impl RecordType {
    pub fn name(&self) -> &str {
        &self.schema.name
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationSettings {
    /// Total records wanted in the record set, including existing ones.
    pub target_count: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Consecutive empty batches tolerated before the run stops.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Record-type specific instructions added to the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

fn default_batch_size() -> usize {
    10
}

fn default_max_consecutive_failures() -> u32 {
    3
}

/// How one record type is written into one remote entity.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SeedTarget {
    pub name: String,
    /// Source record type.
    pub record_type: String,
    /// Remote entity (`res.partner`, `customers`, ...).
    pub entity: String,
    /// Record fields used to look the entity up remotely.
    pub key: Vec<KeyField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<DependencyLink>,
    /// Update a matching remote entity in place instead of creating one.
    #[serde(default)]
    pub existing_first: bool,
    /// Leave matching remote entities untouched when `existing_first` is off.
    #[serde(default = "default_true")]
    pub skip_existing: bool,
    #[serde(default)]
    pub mapping: FieldMapping,
    /// Pause between records, in milliseconds.
    #[serde(default)]
    pub pace_ms: u64,
    /// Targets that must be seeded first, in addition to those implied by links.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl SeedTarget {
    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }

    pub fn structural_links(&self) -> impl Iterator<Item = &DependencyLink> {
        self.links.iter().filter(|link| link.is_structural())
    }
}

/// Record field used for remote lookup, optionally under another remote name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KeyField {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_field: Option<String>,
}

impl KeyField {
    pub fn remote_name(&self) -> &str {
        self.remote_field.as_deref().unwrap_or(&self.field)
    }
}

/// Record-to-payload translation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldMapping {
    /// Record field name to remote field name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rename: BTreeMap<String, String>,
    /// Record fields never sent to the remote system.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    /// Values added when the record does not carry the field.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub defaults: serde_json::Map<String, Value>,
}

impl FieldMapping {
    /// Payload for `record`: excluded fields dropped, renames applied, then
    /// defaults filled for remote fields still absent.
    pub fn apply(&self, record: &Record) -> Record {
        let mut payload = Record::new();
        for (name, value) in record {
            if self.exclude.iter().any(|excluded| excluded == name) {
                continue;
            }
            let remote = self.rename.get(name).unwrap_or(name);
            payload.insert(remote.clone(), value.clone());
        }
        for (name, value) in &self.defaults {
            payload.entry(name.clone()).or_insert_with(|| value.clone());
        }
        payload
    }
}

impl AppManifest {
    pub fn record_type(&self, name: &str) -> Option<&RecordType> {
        self.record_types.iter().find(|record_type| record_type.name() == name)
    }

    pub fn seed_target(&self, name: &str) -> Option<&SeedTarget> {
        self.seed_targets.iter().find(|target| target.name == name)
    }

    /// Stable content hash, recorded in run metadata.
    pub fn fingerprint(&self) -> serde_json::Result<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Seed targets ordered so that link targets and `after` targets come first.
    pub fn dependency_report(&self) -> DependencyReport {
        let nodes: Vec<DependencyNode> = self
            .seed_targets
            .iter()
            .map(|target| {
                let mut depends_on: Vec<String> = target
                    .links
                    .iter()
                    .flat_map(|link| {
                        self.seed_targets
                            .iter()
                            .filter(move |other| other.entity == link.entity)
                            .map(|other| other.name.clone())
                    })
                    .collect();
                depends_on.extend(target.after.iter().cloned());
                DependencyNode::new(target.name.clone(), depends_on)
            })
            .collect();
        build_dependency_report(&nodes)
    }
}
