//! Shared fixtures for the scheduling integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use labflow_core::{ContextId, Dimension, ParameterSpace};
use labflow_execution::{ExecError, ImportRef, Task, TaskBase, TaskContext};
use labflow_storage::StorageService;

/// Entry listing the upstream executions a [`Step`] resolved.
pub const UPSTREAM_KEY: &str = "upstream.json";

/// Leaf task that resolves its imports and records what it saw.
pub struct Step {
    base: TaskBase,
    imports: Vec<ImportRef>,
    attempts: Arc<AtomicUsize>,
}

impl Step {
    /// A step of `task_type` discriminated by `x`.
    pub fn new(task_type: &str) -> Self {
        Self {
            base: TaskBase::new(task_type).with_discriminator("x"),
            imports: Vec::new(),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Add a discriminator.
    pub fn discriminated_by(mut self, key: &str) -> Self {
        self.base = self.base.with_discriminator(key);
        self
    }

    /// Import the latest execution of `task_type`.
    pub fn importing(self, task_type: &str) -> Self {
        self.importing_ref(ImportRef::latest(task_type))
    }

    /// Import an explicit reference.
    pub fn importing_ref(mut self, reference: ImportRef) -> Self {
        self.imports.push(reference);
        self
    }

    /// Counter of `execute` calls, shared with the caller.
    pub fn attempts(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.attempts)
    }
}

#[async_trait]
impl Task for Step {
    fn base(&self) -> &TaskBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TaskBase {
        &mut self.base
    }

    async fn execute(&mut self, ctx: &mut TaskContext) -> Result<(), ExecError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let mut upstream = Vec::new();
        for reference in &self.imports {
            upstream.push(ctx.resolve(reference).await?.id);
        }
        ctx.store_json(UPSTREAM_KEY, &upstream).await?;
        Ok(())
    }
}

/// Space with a single discrete `x` dimension.
pub fn space_x(values: &[i64]) -> ParameterSpace {
    ParameterSpace::new([Dimension::discrete("x", values.to_vec())])
}

/// Number of `execute` calls so far.
pub fn count(attempts: &Arc<AtomicUsize>) -> usize {
    attempts.load(Ordering::SeqCst)
}

/// Task type recorded for `id`.
pub async fn type_of(storage: &dyn StorageService, id: &ContextId) -> String {
    storage.get_context(id).await.unwrap().task_type
}

/// Upstream ids a [`Step`] execution resolved.
pub async fn upstream_of(storage: &dyn StorageService, id: &ContextId) -> Vec<ContextId> {
    labflow_storage::retrieve_json(storage, id, UPSTREAM_KEY)
        .await
        .unwrap()
        .unwrap_or_default()
}
