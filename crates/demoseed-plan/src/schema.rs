use schemars::schema::RootSchema;
use schemars::schema_for;

use crate::model::AppManifest;

/// JSON Schema for manifest documents.
pub fn manifest_json_schema() -> RootSchema {
    schema_for!(AppManifest)
}
