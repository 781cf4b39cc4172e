//! Filesystem tool source store.
//!
//! Layout: one source file per tool at `<dir>/<tool_name>.py` (reads also
//! accept the older `<tool_name>_tool.py` form), backups under
//! `<dir>/backups/<tool>_backup_<timestamp>.py` with a JSON sidecar.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::domain::foundation::Timestamp;
use crate::ports::{BackupRecord, SourceError, ToolSourceStore};

/// Tool source directory on the local filesystem.
#[derive(Clone)]
pub struct FsToolSourceStore {
    directory: PathBuf,
}

impl FsToolSourceStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// The canonical path a tool's source is written to.
    pub fn source_path(&self, tool_name: &str) -> PathBuf {
        self.directory.join(format!("{}.py", tool_name))
    }

    fn backups_dir(&self) -> PathBuf {
        self.directory.join("backups")
    }

    /// Resolves the on-disk file for a tool, probing the exact name first
    /// and the `_tool` suffix form for compatibility.
    async fn resolve_source_path(&self, tool_name: &str) -> Option<PathBuf> {
        let exact = self.source_path(tool_name);
        if fs::metadata(&exact).await.is_ok() {
            return Some(exact);
        }
        let suffixed = self.directory.join(format!("{}_tool.py", tool_name));
        if fs::metadata(&suffixed).await.is_ok() {
            return Some(suffixed);
        }
        None
    }

    fn tool_name_from_path(path: &Path) -> Option<String> {
        let stem = path.file_stem()?.to_str()?;
        Some(
            stem.strip_suffix("_tool")
                .unwrap_or(stem)
                .to_string(),
        )
    }

    fn sidecar_path(backup_path: &Path) -> PathBuf {
        let mut sidecar = backup_path.as_os_str().to_owned();
        sidecar.push(".meta.json");
        PathBuf::from(sidecar)
    }
}

#[async_trait]
impl ToolSourceStore for FsToolSourceStore {
    async fn read_source(&self, tool_name: &str) -> Result<String, SourceError> {
        let path = self
            .resolve_source_path(tool_name)
            .await
            .ok_or_else(|| SourceError::NotFound(tool_name.to_string()))?;
        fs::read_to_string(&path)
            .await
            .map_err(|e| SourceError::io(format!("read {}: {}", path.display(), e)))
    }

    async fn write_source(&self, tool_name: &str, code: &str) -> Result<PathBuf, SourceError> {
        fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| SourceError::io(format!("create tool dir: {}", e)))?;

        let path = self.source_path(tool_name);
        // Stage then rename so readers never observe a half-written file.
        let staging = self.directory.join(format!(".{}.tmp", tool_name));
        fs::write(&staging, code)
            .await
            .map_err(|e| SourceError::io(format!("stage {}: {}", staging.display(), e)))?;
        fs::rename(&staging, &path)
            .await
            .map_err(|e| SourceError::io(format!("replace {}: {}", path.display(), e)))?;
        Ok(path)
    }

    async fn backup(&self, tool_name: &str) -> Result<BackupRecord, SourceError> {
        let original_path = self
            .resolve_source_path(tool_name)
            .await
            .ok_or_else(|| SourceError::NotFound(tool_name.to_string()))?;

        let backups = self.backups_dir();
        fs::create_dir_all(&backups)
            .await
            .map_err(|e| SourceError::io(format!("create backups dir: {}", e)))?;

        let created_at = Timestamp::now();
        let stamp = created_at
            .as_datetime()
            .format("%Y%m%d_%H%M%S%3f")
            .to_string();
        let backup_path = backups.join(format!("{}_backup_{}.py", tool_name, stamp));

        fs::copy(&original_path, &backup_path)
            .await
            .map_err(|e| SourceError::io(format!("copy to {}: {}", backup_path.display(), e)))?;

        let record = BackupRecord {
            tool_name: tool_name.to_string(),
            backup_path: backup_path.clone(),
            original_path,
            created_at,
        };
        let sidecar = Self::sidecar_path(&backup_path);
        let metadata = serde_json::to_string_pretty(&record)
            .map_err(|e| SourceError::io(format!("encode sidecar: {}", e)))?;
        fs::write(&sidecar, metadata)
            .await
            .map_err(|e| SourceError::io(format!("write sidecar: {}", e)))?;

        Ok(record)
    }

    async fn restore(&self, backup: &BackupRecord) -> Result<(), SourceError> {
        if fs::metadata(&backup.backup_path).await.is_err() {
            return Err(SourceError::BackupNotFound(backup.tool_name.clone()));
        }
        fs::copy(&backup.backup_path, &backup.original_path)
            .await
            .map_err(|e| {
                SourceError::io(format!(
                    "restore {} -> {}: {}",
                    backup.backup_path.display(),
                    backup.original_path.display(),
                    e
                ))
            })?;
        Ok(())
    }

    async fn latest_backup(&self, tool_name: &str) -> Result<Option<BackupRecord>, SourceError> {
        let backups = self.backups_dir();
        let mut entries = match fs::read_dir(&backups).await {
            Ok(entries) => entries,
            Err(_) => return Ok(None),
        };

        let prefix = format!("{}_backup_", tool_name);
        let mut newest: Option<BackupRecord> = None;
        while let Ok(Some(entry)) = entries.next_entry().await.map_err(|e| e.to_string()) {
            let path = entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            if !name.starts_with(&prefix) || !name.ends_with(".py") {
                continue;
            }
            let sidecar = Self::sidecar_path(&path);
            let record = match fs::read_to_string(&sidecar).await {
                Ok(raw) => match serde_json::from_str::<BackupRecord>(&raw) {
                    Ok(record) => record,
                    Err(_) => continue,
                },
                Err(_) => continue,
            };
            if newest
                .as_ref()
                .map_or(true, |n| record.created_at.is_after(&n.created_at))
            {
                newest = Some(record);
            }
        }
        Ok(newest)
    }

    async fn list_sources(&self) -> Result<Vec<(String, String)>, SourceError> {
        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(_) => return Ok(Vec::new()),
        };

        let mut sources = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await.map_err(|e| e.to_string()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("py") {
                continue;
            }
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'))
            {
                continue;
            }
            let tool_name = match Self::tool_name_from_path(&path) {
                Some(name) => name,
                None => continue,
            };
            let code = fs::read_to_string(&path)
                .await
                .map_err(|e| SourceError::io(format!("read {}: {}", path.display(), e)))?;
            sources.push((tool_name, code));
        }
        sources.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FsToolSourceStore) {
        let dir = TempDir::new().unwrap();
        let store = FsToolSourceStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn write_then_read_roundtrips() {
        let (_dir, store) = store();
        store.write_source("hello_world", "print('hi')").await.unwrap();
        let code = store.read_source("hello_world").await.unwrap();
        assert_eq!(code, "print('hi')");
    }

    #[tokio::test]
    async fn read_accepts_tool_suffix_form() {
        let (dir, store) = store();
        tokio::fs::write(dir.path().join("legacy_tool.py"), "x = 1")
            .await
            .unwrap();
        assert_eq!(store.read_source("legacy").await.unwrap(), "x = 1");
    }

    #[tokio::test]
    async fn missing_source_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.read_source("ghost").await,
            Err(SourceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn backup_and_restore_roundtrip() {
        let (_dir, store) = store();
        store.write_source("t", "version one").await.unwrap();
        let backup = store.backup("t").await.unwrap();

        store.write_source("t", "version two").await.unwrap();
        assert_eq!(store.read_source("t").await.unwrap(), "version two");

        store.restore(&backup).await.unwrap();
        assert_eq!(store.read_source("t").await.unwrap(), "version one");
    }

    #[tokio::test]
    async fn latest_backup_returns_newest() {
        let (_dir, store) = store();
        store.write_source("t", "v1").await.unwrap();
        store.backup("t").await.unwrap();
        store.write_source("t", "v2").await.unwrap();
        let second = store.backup("t").await.unwrap();

        let latest = store.latest_backup("t").await.unwrap().unwrap();
        assert_eq!(latest.backup_path, second.backup_path);
    }

    #[tokio::test]
    async fn latest_backup_without_backups_is_none() {
        let (_dir, store) = store();
        assert!(store.latest_backup("t").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_sources_skips_staging_files() {
        let (dir, store) = store();
        store.write_source("a", "code a").await.unwrap();
        store.write_source("b", "code b").await.unwrap();
        tokio::fs::write(dir.path().join(".c.tmp"), "staging")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "not a tool")
            .await
            .unwrap();

        let sources = store.list_sources().await.unwrap();
        let names: Vec<&str> = sources.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
