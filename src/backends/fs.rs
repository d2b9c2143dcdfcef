//! File system backend: lists files under a root directory

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::QueryResult;
use crate::error::EyeError;
use crate::service::Backend;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsConfig {
    pub root: PathBuf,
}

/// One listed file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub mode: String,
    pub mod_time: Option<DateTime<Utc>>,
    pub is_dir: bool,
    pub path: String,
}

impl FileInfo {
    fn from_metadata(name: String, parent: &Path, metadata: &std::fs::Metadata) -> Self {
        Self {
            name,
            size: metadata.len(),
            mode: mode_string(metadata),
            mod_time: metadata.modified().ok().map(DateTime::<Utc>::from),
            is_dir: metadata.is_dir(),
            path: parent.to_string_lossy().to_string(),
        }
    }
}

#[cfg(unix)]
fn mode_string(metadata: &std::fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    format!("{:o}", metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn mode_string(metadata: &std::fs::Metadata) -> String {
    if metadata.permissions().readonly() {
        "r".to_string()
    } else {
        "rw".to_string()
    }
}

pub struct FsBackend {
    config: FsConfig,
}

impl FsBackend {
    pub fn new(config: FsConfig) -> Self {
        Self { config }
    }

    fn resolve(&self, query: &str) -> PathBuf {
        let relative = query.trim().trim_start_matches('/');
        if relative.is_empty() || relative == "." {
            self.config.root.clone()
        } else {
            self.config.root.join(relative)
        }
    }

    async fn list(&self, target: &Path) -> Result<Vec<FileInfo>, EyeError> {
        let metadata = tokio::fs::metadata(target).await.map_err(|e| {
            EyeError::Backend(format!("{}: {}", target.display(), e))
        })?;

        if !metadata.is_dir() {
            let name = target
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let parent = target.parent().unwrap_or(target);
            return Ok(vec![FileInfo::from_metadata(name, parent, &metadata)]);
        }

        let mut entries = tokio::fs::read_dir(target).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    // Entry removed while listing
                    tracing::debug!(path = %entry.path().display(), error = %e, "Skipping entry");
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().to_string();
            files.push(FileInfo::from_metadata(name, target, &metadata));
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

#[async_trait]
impl Backend for FsBackend {
    fn kind(&self) -> &'static str {
        "fs"
    }

    async fn connect(&self) -> Result<(), EyeError> {
        let metadata = tokio::fs::metadata(&self.config.root).await.map_err(|e| {
            EyeError::Config(format!("{}: {}", self.config.root.display(), e))
        })?;
        if !metadata.is_dir() {
            return Err(EyeError::Config(format!(
                "{} is not a directory",
                self.config.root.display()
            )));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), EyeError> {
        tokio::fs::metadata(&self.config.root)
            .await
            .map(|_| ())
            .map_err(|e| EyeError::Connection(format!("{}: {}", self.config.root.display(), e)))
    }

    /// Paths must stay under the root
    fn prepare_query(&self, query: &str) -> Result<String, EyeError> {
        let relative = Path::new(query.trim().trim_start_matches('/'));
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(EyeError::InvalidRequest(format!(
                "path '{}' leaves the service root",
                query
            )));
        }
        Ok(query.to_string())
    }

    async fn fetch(&self, query: &str) -> Result<Vec<QueryResult>, EyeError> {
        let files = self.list(&self.resolve(query)).await?;
        files
            .into_iter()
            .map(|f| {
                serde_json::to_value(f)
                    .map(QueryResult::new)
                    .map_err(|e| EyeError::Backend(e.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(root: &Path) -> FsBackend {
        FsBackend::new(FsConfig {
            root: root.to_path_buf(),
        })
    }

    #[tokio::test]
    async fn test_lists_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.log"), "hello").unwrap();
        std::fs::write(dir.path().join("a.log"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let backend = backend(dir.path());
        backend.connect().await.unwrap();
        let records = backend.fetch(".").await.unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].value(&["name"]).as_str(), Some("a.log"));
        assert_eq!(records[1].value(&["size"]).as_i64(), Some(5));
        assert_eq!(records[2].value(&["is_dir"]).as_bool(), Some(true));
    }

    #[tokio::test]
    async fn test_single_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.csv"), "1,2,3").unwrap();

        let records = backend(dir.path()).fetch("data.csv").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value(&["name"]).as_str(), Some("data.csv"));
    }

    #[tokio::test]
    async fn test_missing_path_is_backend_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = backend(dir.path()).fetch("missing").await;
        assert!(matches!(result, Err(EyeError::Backend(_))));
    }

    #[tokio::test]
    async fn test_connect_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            backend(&missing).connect().await,
            Err(EyeError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_parent_paths() {
        let backend = backend(Path::new("/tmp"));
        assert!(backend.prepare_query("logs/today").is_ok());
        assert!(matches!(
            backend.prepare_query("../etc"),
            Err(EyeError::InvalidRequest(_))
        ));
    }
}
