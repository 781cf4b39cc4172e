//! Tool Source Store Port - the on-disk home of tool source files.
//!
//! Tool sources live in a single flat directory, one file per tool keyed
//! by tool name. Backups land in a sibling `backups/` directory as
//! `<tool>_backup_<timestamp>` with a JSON sidecar describing the backup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::foundation::Timestamp;

/// Source store errors.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("tool source not found: {0}")]
    NotFound(String),

    #[error("backup not found for tool: {0}")]
    BackupNotFound(String),

    #[error("filesystem error: {0}")]
    Io(String),
}

impl SourceError {
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }
}

/// Metadata sidecar written next to every backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub tool_name: String,
    pub backup_path: PathBuf,
    pub original_path: PathBuf,
    pub created_at: Timestamp,
}

/// Port over the tool source directory.
#[async_trait]
pub trait ToolSourceStore: Send + Sync {
    /// Reads the source of a tool by name.
    async fn read_source(&self, tool_name: &str) -> Result<String, SourceError>;

    /// Writes (atomically replaces) the source of a tool; returns the path.
    async fn write_source(&self, tool_name: &str, code: &str) -> Result<PathBuf, SourceError>;

    /// Copies the current source into the backups directory with a
    /// timestamped name and sidecar metadata.
    async fn backup(&self, tool_name: &str) -> Result<BackupRecord, SourceError>;

    /// Restores a backup over the live source file.
    async fn restore(&self, backup: &BackupRecord) -> Result<(), SourceError>;

    /// The most recent backup of a tool, if any.
    async fn latest_backup(&self, tool_name: &str) -> Result<Option<BackupRecord>, SourceError>;

    /// All tool sources in the directory, as (tool name, source) pairs.
    async fn list_sources(&self) -> Result<Vec<(String, String)>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tool_source_store_trait_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn ToolSourceStore>();
    }
}
