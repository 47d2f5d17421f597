//! Lab - entry point for running top-level tasks.

use std::sync::Arc;

use labflow_core::ContextId;
use labflow_storage::StorageService;
use tracing::info;

use crate::engine::ExecutionService;
use crate::error::ExecError;
use crate::lifecycle::LifeCycleManager;
use crate::task::Task;

/// Runs tasks against one storage backend.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use labflow_execution::{BatchTask, Lab};
/// # use labflow_storage::FileStorage;
/// # async fn demo() -> anyhow::Result<()> {
/// let lab = Lab::new(Arc::new(FileStorage::new(".labflow").await?));
/// let mut batch = BatchTask::new("Experiment");
/// let id = lab.run(&mut batch).await?;
/// println!("finished {}", id);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Lab {
    service: ExecutionService,
}

impl Lab {
    /// Create a lab over `storage` with the default lifecycle.
    pub fn new(storage: Arc<dyn StorageService>) -> Self {
        Self {
            service: ExecutionService::new(storage),
        }
    }

    /// Replace the lifecycle manager.
    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn LifeCycleManager>) -> Self {
        self.service = self.service.with_lifecycle(lifecycle);
        self
    }

    /// Storage backend.
    pub fn storage(&self) -> &Arc<dyn StorageService> {
        self.service.storage()
    }

    /// Execution service.
    pub fn service(&self) -> &ExecutionService {
        &self.service
    }

    /// Run `task` outside of any batch and return its context id.
    pub async fn run(&self, task: &mut dyn Task) -> Result<ContextId, ExecError> {
        let engine = self.service.create_engine(&*task);
        let id = engine.run(task, None).await?;
        info!("Task [{}] finished as [{}]", task.task_type(), id);
        Ok(id)
    }
}
