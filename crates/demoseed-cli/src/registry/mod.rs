mod logging;
mod run;

pub use logging::{init_logging, init_run_logging};
pub use run::{RunPaths, RunRecord, start_run, write_artifact};

use thiserror::Error;

/// Registry-level errors for run artifacts.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("artifact write error: {0}")]
    Write(#[from] demoseed_core::Error),
    #[error("logging error: {0}")]
    Logging(String),
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
