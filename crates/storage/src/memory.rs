//! In-process storage, mainly for tests and throwaway runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use labflow_core::ContextId;
use tokio::sync::Mutex;

use super::{Result, StorageService};

type Entries = BTreeMap<String, Vec<u8>>;

/// Storage backend keeping every context in memory.
#[derive(Default)]
pub struct MemoryStorage {
    contexts: Mutex<BTreeMap<ContextId, Entries>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of contexts currently held, complete or not.
    pub async fn len(&self) -> usize {
        self.contexts.lock().await.len()
    }

    /// Whether the store holds no context.
    pub async fn is_empty(&self) -> bool {
        self.contexts.lock().await.is_empty()
    }
}

#[async_trait]
impl StorageService for MemoryStorage {
    async fn store(&self, id: &ContextId, key: &str, data: &[u8]) -> Result<()> {
        self.contexts
            .lock()
            .await
            .entry(id.clone())
            .or_default()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn retrieve(&self, id: &ContextId, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .contexts
            .lock()
            .await
            .get(id)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn context_ids(&self) -> Result<Vec<ContextId>> {
        Ok(self.contexts.lock().await.keys().cloned().collect())
    }

    async fn delete_key(&self, id: &ContextId, key: &str) -> Result<()> {
        if let Some(entries) = self.contexts.lock().await.get_mut(id) {
            entries.remove(key);
        }
        Ok(())
    }

    async fn delete_context(&self, id: &ContextId) -> Result<()> {
        self.contexts.lock().await.remove(id);
        Ok(())
    }
}
