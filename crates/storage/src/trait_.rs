//! Storage trait abstraction.

use async_trait::async_trait;
use labflow_core::{match_constraints, ContextId, Discriminators, ExecutionMetadata, MatchMode};
use tracing::warn;

use crate::records::{retrieve_json, DISCRIMINATORS_KEY, METADATA_KEY};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Durable key/value store for execution contexts.
///
/// Every context is a namespace of binary entries addressed by key. A context
/// counts as complete once its [`METADATA_KEY`] entry exists.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Write `data` under `key` in the context `id`, creating the context if needed.
    async fn store(&self, id: &ContextId, key: &str, data: &[u8]) -> Result<()>;

    /// Read the entry `key` of context `id`.
    async fn retrieve(&self, id: &ContextId, key: &str) -> Result<Option<Vec<u8>>>;

    /// Ids of every context in the store, complete or not.
    async fn context_ids(&self) -> Result<Vec<ContextId>>;

    /// Remove a single entry. Missing entries are not an error.
    async fn delete_key(&self, id: &ContextId, key: &str) -> Result<()>;

    /// Remove a context with all of its entries. Missing contexts are not an error.
    async fn delete_context(&self, id: &ContextId) -> Result<()>;

    /// Metadata of a completed context.
    async fn get_context(&self, id: &ContextId) -> Result<ExecutionMetadata> {
        retrieve_json(self, id, METADATA_KEY)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("context [{}]", id)))
    }

    /// Completed contexts of `task_type` whose stored discriminators carry
    /// every entry of `constraints`, newest first.
    async fn list_contexts(
        &self,
        task_type: &str,
        constraints: &Discriminators,
    ) -> Result<Vec<ExecutionMetadata>> {
        let mut found = Vec::new();

        for id in self.context_ids().await? {
            let meta: ExecutionMetadata = match retrieve_json(self, &id, METADATA_KEY).await {
                Ok(Some(meta)) => meta,
                // No completion marker: still running or crashed
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping unreadable context [{}]: {}", id, e);
                    continue;
                }
            };
            if meta.task_type != task_type {
                continue;
            }

            let stored: Discriminators = retrieve_json(self, &id, DISCRIMINATORS_KEY)
                .await?
                .unwrap_or_default();
            if match_constraints(constraints, &stored, MatchMode::Lenient) {
                found.push(meta);
            }
        }

        found.sort_by(|a, b| b.end.cmp(&a.end).then_with(|| b.id.cmp(&a.id)));
        Ok(found)
    }
}
