//! Storage paths
//!
//! Resolves where the connection file lives on disk:
//! `~/.ssh-keeper/config` on every platform.

use std::path::PathBuf;

/// Storage path errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to determine home directory")]
    NoHomeDir,
}

/// The ssh-keeper configuration directory.
pub fn config_dir() -> Result<PathBuf, StorageError> {
    dirs::home_dir()
        .map(|home| home.join(".ssh-keeper"))
        .ok_or(StorageError::NoHomeDir)
}

/// Default path of the connection file.
pub fn connections_file() -> Result<PathBuf, StorageError> {
    Ok(config_dir()?.join("config"))
}
