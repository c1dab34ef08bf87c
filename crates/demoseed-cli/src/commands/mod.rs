pub mod audit;
pub mod clear;
pub mod clients;
pub mod generate;
pub mod manifest;
pub mod pipeline;
pub mod secrets;
pub mod seed;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use demoseed_plan::{AppManifest, RecordType, ValidatedManifest};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::CliError;
use crate::registry::{RunPaths, RunRecord, init_run_logging, start_run};
use crate::workspace::{Secrets, Settings, WorkspacePaths, load_or_create_settings};

/// Workspace state shared by every command.
pub struct CommandContext {
    pub paths: WorkspacePaths,
    pub settings: Settings,
}

impl CommandContext {
    pub fn open(root: PathBuf) -> Result<Self, CliError> {
        let paths = WorkspacePaths::new(root);
        paths.ensure_dirs()?;
        let settings = load_or_create_settings(&paths)?;
        Ok(Self { paths, settings })
    }

    pub fn secrets(&self) -> Result<Secrets, CliError> {
        Ok(Secrets::load(&self.paths)?)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.paths.data_dir(&self.settings.data_dir)
    }

    pub fn record_set_path(&self, manifest: &AppManifest, record_type: &RecordType) -> PathBuf {
        record_set_path(&self.data_dir(), manifest, record_type)
    }

    /// Create the run directory and route logs into it.
    pub fn begin_run(
        &self,
        command: &str,
        manifest_path: Option<&Path>,
        validated: Option<&ValidatedManifest>,
        options: Value,
    ) -> Result<(String, RunPaths), CliError> {
        let run_id = Uuid::new_v4().to_string();
        let record = RunRecord {
            run_id: run_id.clone(),
            started_at: chrono::Utc::now(),
            command: command.to_string(),
            runs_dir: self.paths.runs_dir.clone(),
            manifest: manifest_path.map(Path::to_path_buf),
            manifest_fingerprint: validated
                .map(|validated| validated.manifest.fingerprint())
                .transpose()?,
            options,
        };
        let run_paths = start_run(&record)?;
        init_run_logging(&run_paths.logs_path)?;
        info!(
            run_id = %run_id,
            command,
            config = %run_paths.config_path.display(),
            "run started"
        );
        for issue in validated.iter().flat_map(|validated| &validated.warnings) {
            warn!(code = %issue.code, path = %issue.path, "{}", issue.message);
        }
        Ok((run_id, run_paths))
    }
}

pub fn record_set_path(data_dir: &Path, manifest: &AppManifest, record_type: &RecordType) -> PathBuf {
    data_dir.join(&manifest.app).join(&record_type.file)
}

/// Flag raised by Ctrl-C; seeding stops before the next record.
pub fn cancel_on_ctrl_c() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let raised = Arc::clone(&flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing the current record");
            raised.store(true, Ordering::Relaxed);
        }
    });
    flag
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
