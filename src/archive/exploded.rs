use async_trait::async_trait;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use super::{Archive, StreamAndLength, is_safe_entry_path, reopen};
use crate::error::{ArchiveError, Result};

/// A directory laid out like the inside of a ZIP.
///
/// Nothing is enumerated at open; [`list_entries`](Archive::list_entries)
/// walks the tree on every call.
#[derive(Clone)]
pub struct ExplodedDir {
    root: Arc<PathBuf>,
    identifier: Arc<str>,
}

impl ExplodedDir {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&root).await?;
        if !metadata.is_dir() {
            return Err(ArchiveError::NotADirectory(root));
        }
        debug!("{}: opened exploded directory", root.display());

        Ok(Self {
            identifier: root.to_string_lossy().into(),
            root: Arc::new(root),
        })
    }

    fn entry_file(&self, path: &str) -> Option<PathBuf> {
        is_safe_entry_path(path).then(|| self.root.join(path))
    }
}

#[async_trait]
impl Archive for ExplodedDir {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Always 0, see [`Archive`]
    fn entry_count(&self) -> usize {
        0
    }

    /// Always true, see [`Archive`]
    fn has_entries(&self) -> bool {
        true
    }

    async fn has_entry(&self, path: &str) -> bool {
        let Some(file) = self.entry_file(path) else {
            return false;
        };
        tokio::fs::metadata(file)
            .await
            .is_ok_and(|m| !m.is_dir())
    }

    async fn list_entries(&self) -> Result<Vec<String>> {
        let root = Arc::clone(&self.root);
        tokio::task::spawn_blocking(move || walk_files(&root)).await?
    }

    async fn open_entry_stream(&self, path: &str) -> Result<StreamAndLength> {
        let not_found = || ArchiveError::NotFound(path.to_string());
        let file = self.entry_file(path).ok_or_else(not_found)?;

        let metadata = match tokio::fs::metadata(&file).await {
            Ok(m) if !m.is_dir() => m,
            Ok(_) => return Err(not_found()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        let content = tokio::fs::read(&file).await?;

        Ok(StreamAndLength::new(
            Box::new(std::io::Cursor::new(content)),
            metadata.len(),
            reopen(self, path),
        ))
    }

    fn release(&self) {
        debug!("{}: released", self.identifier);
    }
}

/// Every file under `root` as a `/`-separated path relative to it.
///
/// Paths are derived from canonical forms on both sides so that symlinks
/// and trailing separators in `root` don't leak into entry names.
fn walk_files(root: &Path) -> Result<Vec<String>> {
    let canonical_root = std::fs::canonicalize(root)?;
    let mut entries = Vec::new();

    for item in WalkDir::new(&canonical_root)
        .follow_links(true)
        .sort_by_file_name()
    {
        let item = item?;
        if !item.file_type().is_file() {
            continue;
        }

        let canonical = std::fs::canonicalize(item.path())?;
        // A symlink pointing outside the tree keeps its in-tree name
        let relative = match canonical.strip_prefix(&canonical_root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => match item.path().strip_prefix(&canonical_root) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => {
                    warn!("{}: outside of {}", item.path().display(), root.display());
                    continue;
                }
            },
        };

        let entry = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        entries.push(entry);
    }

    Ok(entries)
}
