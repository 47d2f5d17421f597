//! Task context - what a running task sees of the engine.

use std::collections::BTreeSet;
use std::sync::Arc;

use labflow_core::{Configuration, ContextId, ExecutionMetadata};
use labflow_storage::records::{ATTRIBUTES_KEY, CONFIGURATION_KEY, DISCRIMINATORS_KEY};
use labflow_storage::{retrieve_json, store_json, StorageError, StorageService};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info};

use crate::engine::ExecutionService;
use crate::error::ExecError;
use crate::resolver::{resolve_import, ImportRef};
use crate::task::Task;

/// Position of a context in the task lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Context allocated, nothing persisted yet
    Created,
    /// Task configuration persisted
    Initialized,
    /// Task logic executing
    Running,
    /// Reports done and completion marker written
    Completed,
    /// Context removed after a failure
    Failed,
    /// Shut down
    Destroyed,
}

/// Configuration and visible executions handed to a task run inside a batch.
///
/// Both parts are immutable snapshots taken when the task is started.
#[derive(Debug, Clone, Default)]
pub struct ImportScope {
    config: Arc<Configuration>,
    visible: Arc<BTreeSet<ContextId>>,
}

impl ImportScope {
    /// Create a scope.
    pub fn new(config: Configuration, visible: BTreeSet<ContextId>) -> Self {
        Self {
            config: Arc::new(config),
            visible: Arc::new(visible),
        }
    }

    /// Live configuration of the enclosing batch.
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Executions the task may import from.
    pub fn visible(&self) -> &BTreeSet<ContextId> {
        &self.visible
    }

    /// Whether `id` may be imported.
    pub fn contains(&self, id: &ContextId) -> bool {
        self.visible.contains(id)
    }
}

/// Execution context of one task run.
pub struct TaskContext {
    metadata: ExecutionMetadata,
    state: LifecycleState,
    service: ExecutionService,
    scope: Option<ImportScope>,
}

impl TaskContext {
    pub(crate) fn new(
        metadata: ExecutionMetadata,
        service: ExecutionService,
        scope: Option<ImportScope>,
    ) -> Self {
        Self {
            metadata,
            state: LifecycleState::Created,
            service,
            scope,
        }
    }

    /// Id of this execution.
    pub fn id(&self) -> &ContextId {
        &self.metadata.id
    }

    /// Metadata of this execution.
    pub fn metadata(&self) -> &ExecutionMetadata {
        &self.metadata
    }

    /// Mutable metadata, used by the lifecycle manager for timestamps.
    pub fn metadata_mut(&mut self) -> &mut ExecutionMetadata {
        &mut self.metadata
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Move to another lifecycle state.
    pub fn set_state(&mut self, state: LifecycleState) {
        self.state = state;
    }

    /// Import scope, if the task runs inside a batch.
    pub fn scope(&self) -> Option<&ImportScope> {
        self.scope.as_ref()
    }

    /// Configuration a nested batch inherits from its parent.
    pub fn inherited_configuration(&self) -> Configuration {
        self.scope
            .as_ref()
            .map(|s| s.config().clone())
            .unwrap_or_default()
    }

    /// Executions a nested batch inherits as visible from its parent.
    pub fn inherited_scope(&self) -> BTreeSet<ContextId> {
        self.scope
            .as_ref()
            .map(|s| s.visible().clone())
            .unwrap_or_default()
    }

    /// Storage backing this context.
    pub fn storage(&self) -> &Arc<dyn StorageService> {
        self.service.storage()
    }

    /// Execution service, used by batches to run subtasks.
    pub fn execution_service(&self) -> &ExecutionService {
        &self.service
    }

    /// Store a JSON entry in this context.
    pub async fn store_json<T>(&self, key: &str, value: &T) -> Result<(), ExecError>
    where
        T: Serialize + Sync + ?Sized,
    {
        store_json(self.storage().as_ref(), self.id(), key, value).await?;
        Ok(())
    }

    /// Read a JSON entry of this context.
    pub async fn retrieve_json<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, ExecError> {
        Ok(retrieve_json(self.storage().as_ref(), self.id(), key).await?)
    }

    /// Persist the configuration snapshot of `task`: discriminators,
    /// attributes and the full configuration.
    pub async fn persist_task(&self, task: &dyn Task) -> Result<(), ExecError> {
        self.store_json(DISCRIMINATORS_KEY, &task.discriminators()).await?;
        self.store_json(ATTRIBUTES_KEY, task.base().attributes()).await?;
        self.store_json(CONFIGURATION_KEY, task.base().configuration()).await?;
        Ok(())
    }

    /// Resolve a reference to an upstream execution.
    ///
    /// Inside a batch only executions visible in the import scope resolve.
    pub async fn resolve(&self, reference: &ImportRef) -> Result<ExecutionMetadata, ExecError> {
        resolve_import(self.storage().as_ref(), self.scope.as_ref(), reference).await
    }

    /// Resolve a reference given in URI form.
    pub async fn resolve_uri(&self, uri: &str) -> Result<ExecutionMetadata, ExecError> {
        let reference: ImportRef = uri.parse()?;
        self.resolve(&reference).await
    }

    /// Resolve `reference` and read the JSON entry `key` of the upstream execution.
    pub async fn import_json<T: DeserializeOwned>(
        &self,
        reference: &ImportRef,
        key: &str,
    ) -> Result<T, ExecError> {
        let upstream = self.resolve(reference).await?;
        retrieve_json(self.storage().as_ref(), &upstream.id, key)
            .await?
            .ok_or_else(|| {
                StorageError::NotFound(format!("[{}] in context [{}]", key, upstream.id)).into()
            })
    }

    /// Emit a lifecycle message.
    pub fn message(&self, msg: impl std::fmt::Display) {
        info!(context = %self.id(), "{}", msg);
    }

    /// Emit a lifecycle error.
    pub fn error(&self, msg: impl std::fmt::Display, cause: &dyn std::fmt::Display) {
        error!(context = %self.id(), "{}: {}", msg, cause);
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("metadata", &self.metadata)
            .field("state", &self.state)
            .field("scope", &self.scope)
            .finish()
    }
}
