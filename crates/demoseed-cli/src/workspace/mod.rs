mod paths;
mod secrets;
mod settings;

pub use paths::WorkspacePaths;
pub use secrets::{PASSPHRASE_VAR, Secrets, load_env_file, store_credentials, stored_names};
pub use settings::{
    LlmProvider, LlmSettings, RemoteKind, RemoteSettings, Settings, load_or_create_settings,
};

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("write error: {0}")]
    Write(#[from] demoseed_core::Error),
    #[error("toml decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("toml encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),
    #[error("encryption error: {0}")]
    Crypto(String),
    #[error("missing secret {name}: {hint}")]
    MissingSecret { name: String, hint: String },
}

pub type WorkspaceResult<T> = Result<T, WorkspaceError>;
