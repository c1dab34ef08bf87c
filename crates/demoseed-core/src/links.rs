use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How strictly a record needs its referenced entity to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LinkRequirement {
    /// The record fails when the reference cannot be resolved.
    #[default]
    Required,
    /// The reference is dropped from the payload when unresolved.
    Optional,
    /// Must resolve before any record is written; otherwise the run aborts.
    Structural,
}

/// Reference from a record field to an entity in the remote system.
///
/// `field` holds a natural value (e.g. a warehouse code). The seeder looks up
/// `entity` where `lookup_field` equals that value and writes the resulting
/// remote id into `target_field`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DependencyLink {
    pub field: String,
    pub entity: String,
    pub lookup_field: String,
    pub target_field: String,
    #[serde(default)]
    pub requirement: LinkRequirement,
    /// Fixed lookup value for structural prerequisites not carried by records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_value: Option<String>,
}

impl DependencyLink {
    pub fn is_structural(&self) -> bool {
        self.requirement == LinkRequirement::Structural
    }
}
