//! Task model - the unit of work the engine runs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use labflow_core::{Configuration, Discriminators};

use crate::context::TaskContext;
use crate::error::ExecError;
use crate::report::Report;

/// Whether a task runs domain logic itself or aggregates subtasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Runs its own logic; executions are memoized by discriminators.
    Leaf,
    /// Schedules subtasks; never memoized, always re-entered.
    Batch,
}

/// State shared by every task: identity, configuration and reports.
#[derive(Clone, Default)]
pub struct TaskBase {
    task_type: String,
    discriminator_keys: BTreeSet<String>,
    configuration: Configuration,
    attributes: BTreeMap<String, String>,
    reports: BTreeMap<String, Arc<dyn Report>>,
}

impl TaskBase {
    /// Create a task base of the given type.
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            ..Default::default()
        }
    }

    /// Declare a configuration parameter as part of the cache identity.
    pub fn with_discriminator(mut self, key: impl Into<String>) -> Self {
        self.discriminator_keys.insert(key.into());
        self
    }

    /// Declare several discriminators at once.
    pub fn with_discriminators<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.discriminator_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Attach a report. A second report of the same type replaces the first.
    pub fn with_report(mut self, report: impl Report + 'static) -> Self {
        self.add_report(Arc::new(report));
        self
    }

    /// Attach a shared report.
    pub fn add_report(&mut self, report: Arc<dyn Report>) {
        self.reports.insert(report.report_type().to_string(), report);
    }

    /// Builder-style attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    /// Set a free-form attribute persisted with the execution.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Task type.
    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    /// Apply the configuration of the current parameter space point.
    pub fn configure(&mut self, config: &Configuration) {
        self.configuration = config.clone();
    }

    /// Configuration last applied.
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Current values of the declared discriminators.
    ///
    /// Parameters absent from the configuration are left out.
    pub fn discriminators(&self) -> Discriminators {
        self.discriminator_keys
            .iter()
            .filter_map(|key| {
                self.configuration
                    .get(key)
                    .map(|value| (key.clone(), value.to_string()))
            })
            .collect()
    }

    /// Attributes.
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Reports sorted by report type.
    pub fn reports(&self) -> Vec<Arc<dyn Report>> {
        self.reports.values().cloned().collect()
    }
}

impl std::fmt::Debug for TaskBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskBase")
            .field("task_type", &self.task_type)
            .field("discriminator_keys", &self.discriminator_keys)
            .field("attributes", &self.attributes)
            .field("reports", &self.reports.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A named unit of work.
///
/// Implementors embed a [`TaskBase`] and provide [`execute`](Task::execute).
/// Task code reaches upstream outputs through [`TaskContext::resolve`].
#[async_trait]
pub trait Task: Send + Sync {
    /// Shared task state.
    fn base(&self) -> &TaskBase;

    /// Mutable shared task state.
    fn base_mut(&mut self) -> &mut TaskBase;

    /// Run the task's own logic.
    async fn execute(&mut self, ctx: &mut TaskContext) -> Result<(), ExecError>;

    /// Leaf or batch.
    fn kind(&self) -> TaskKind {
        TaskKind::Leaf
    }

    /// Stable identifier of the task.
    fn task_type(&self) -> &str {
        self.base().task_type()
    }

    /// Apply the configuration of the current parameter space point.
    fn configure(&mut self, config: &Configuration) {
        self.base_mut().configure(config);
    }

    /// Cache identity under the current configuration.
    fn discriminators(&self) -> Discriminators {
        self.base().discriminators()
    }
}
