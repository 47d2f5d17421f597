//! File system storage implementation.
//!
//! Every context is a directory below the storage root and every entry a
//! file inside it, e.g. `<root>/<context id>/metadata.json`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use labflow_core::ContextId;
use tokio::fs;
use tracing::{debug, warn};

use super::{Result, StorageError, StorageService};

/// File-based storage backend.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Open storage rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        debug!("Opened storage at {}", root.display());
        Ok(Self { root })
    }

    /// The storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn context_dir(&self, id: &ContextId) -> PathBuf {
        self.root.join(id.as_str())
    }

    fn entry_path(&self, id: &ContextId, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains('/') || key.contains('\\') || key == ".." {
            return Err(StorageError::Other(format!("invalid storage key [{}]", key)));
        }
        Ok(self.context_dir(id).join(key))
    }
}

#[async_trait]
impl StorageService for FileStorage {
    async fn store(&self, id: &ContextId, key: &str, data: &[u8]) -> Result<()> {
        let path = self.entry_path(id, key)?;
        fs::create_dir_all(self.context_dir(id)).await?;
        fs::write(&path, data).await?;
        Ok(())
    }

    async fn retrieve(&self, id: &ContextId, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(id, key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn context_ids(&self) -> Result<Vec<ContextId>> {
        let mut ids = Vec::new();
        let mut rd = fs::read_dir(&self.root).await?;
        while let Some(entry) = rd.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match name.parse::<ContextId>() {
                Ok(id) => ids.push(id),
                Err(e) => warn!("Ignoring directory [{}] in storage: {}", name, e),
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn delete_key(&self, id: &ContextId, key: &str) -> Result<()> {
        let path = self.entry_path(id, key)?;
        fs::remove_file(&path).await.or_else(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Ok(()),
            _ => Err(e),
        })?;
        Ok(())
    }

    async fn delete_context(&self, id: &ContextId) -> Result<()> {
        fs::remove_dir_all(self.context_dir(id)).await.or_else(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Ok(()),
            _ => Err(e),
        })?;
        Ok(())
    }
}
