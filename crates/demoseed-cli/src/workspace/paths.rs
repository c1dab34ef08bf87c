use std::path::{Path, PathBuf};

use super::{WorkspaceError, WorkspaceResult};

#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub config_dir: PathBuf,
    pub secrets_dir: PathBuf,
    pub runs_dir: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: PathBuf) -> Self {
        let config_dir = root.join("config");
        let secrets_dir = root.join("secrets");
        let runs_dir = root.join("runs");
        Self {
            root,
            config_dir,
            secrets_dir,
            runs_dir,
        }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join("settings.toml")
    }

    pub fn env_path(&self) -> PathBuf {
        self.root.join(".env")
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.secrets_dir.join("credentials.age")
    }

    /// Record sets live under `<data_dir>/<app>/`; relative settings paths
    /// are taken from the workspace root.
    pub fn data_dir(&self, configured: &Path) -> PathBuf {
        if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            self.root.join(configured)
        }
    }

    pub fn ensure_dirs(&self) -> WorkspaceResult<()> {
        create_if_missing(&self.root)?;
        create_if_missing(&self.config_dir)?;
        create_if_missing(&self.secrets_dir)?;
        create_if_missing(&self.runs_dir)?;
        Ok(())
    }
}

fn create_if_missing(path: &Path) -> WorkspaceResult<()> {
    if path.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(WorkspaceError::from)
}
