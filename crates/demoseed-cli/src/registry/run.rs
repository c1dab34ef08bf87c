use std::fs::{OpenOptions, create_dir_all};
use std::path::PathBuf;
use std::process::Command;

use chrono::{DateTime, Utc};
use demoseed_core::{CONTRACT_VERSION, write_json_atomic};
use serde::Serialize;
use serde_json::Value;

use super::RegistryResult;

/// Metadata captured at run start.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub command: String,
    pub runs_dir: PathBuf,
    pub manifest: Option<PathBuf>,
    pub manifest_fingerprint: Option<String>,
    /// Command options and the redacted settings in effect.
    pub options: Value,
}

/// JSON config written to each run directory.
#[derive(Debug, Serialize)]
pub struct RunConfig {
    pub run_id: String,
    pub started_at: String,
    pub command: String,
    pub contract_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_fingerprint: Option<String>,
    pub options: Value,
    pub git: GitInfo,
}

/// Git metadata for reproducibility.
#[derive(Debug, Serialize)]
pub struct GitInfo {
    pub commit: Option<String>,
    pub dirty: Option<bool>,
}

/// Paths for run artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub logs_path: PathBuf,
}

impl RunPaths {
    pub fn artifact(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

pub fn start_run(record: &RunRecord) -> RegistryResult<RunPaths> {
    let timestamp = record.started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let root = record
        .runs_dir
        .join(format!("{timestamp}__run_{}", record.run_id));
    create_dir_all(&root)?;

    let config_path = root.join("config.json");
    let logs_path = root.join("logs.ndjson");

    let config = RunConfig {
        run_id: record.run_id.clone(),
        started_at: record.started_at.to_rfc3339(),
        command: record.command.clone(),
        contract_version: CONTRACT_VERSION.to_string(),
        manifest: record
            .manifest
            .as_ref()
            .map(|path| path.display().to_string()),
        manifest_fingerprint: record.manifest_fingerprint.clone(),
        options: record.options.clone(),
        git: collect_git_info(),
    };
    write_json_atomic(&config_path, &config)?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&logs_path)?;

    Ok(RunPaths {
        root,
        config_path,
        logs_path,
    })
}

/// Write a stage report (`generation_report.json`, `seed_result.json`, ...).
pub fn write_artifact<T: Serialize + ?Sized>(
    paths: &RunPaths,
    name: &str,
    value: &T,
) -> RegistryResult<PathBuf> {
    let path = paths.artifact(name);
    write_json_atomic(&path, value)?;
    Ok(path)
}

pub fn collect_git_info() -> GitInfo {
    let commit = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            } else {
                None
            }
        })
        .filter(|value| !value.is_empty());

    let dirty = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| !output.stdout.is_empty());

    GitInfo { commit, dirty }
}
