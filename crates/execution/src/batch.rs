//! Batch tasks - run a set of subtasks over every point of a parameter space.
//!
//! Within one configuration subtasks are attempted in registration order.
//! A subtask whose import cannot be resolved yet goes to the back of the
//! queue; a subtask deferred twice without any progress in between means the
//! remaining subtasks can never be satisfied and the batch fails.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use labflow_core::{Configuration, ContextId, Discriminators, ExecutionMetadata, ParameterSpace};
use labflow_storage::records::ATTRIBUTES_KEY;
use labflow_storage::{retrieve_json, StorageError, StorageService};
use tracing::{debug, info, trace};

use crate::context::{ImportScope, TaskContext};
use crate::engine::ExecutionService;
use crate::error::ExecError;
use crate::lookup::latest_execution;
use crate::policy::{Arbiter, ConsolePrompt, Decision, ExecutionPolicy, ReusePrompt};
use crate::task::{Task, TaskBase, TaskKind};

/// Attribute listing every execution a batch run used, in first-use order.
pub const SUBTASKS_KEY: &str = "Subtasks";

/// Longest parameter value shown in the configuration banner.
const MAX_VALUE_WIDTH: usize = 150;

/// A task aggregating subtasks over a parameter space.
///
/// Batches are never memoized: every run re-enters the parameter space, while
/// each leaf subtask is looked up and reused or run according to the
/// [`ExecutionPolicy`].
pub struct BatchTask {
    base: TaskBase,
    tasks: Vec<Box<dyn Task>>,
    parameter_space: ParameterSpace,
    policy: ExecutionPolicy,
    prompt: Arc<dyn ReusePrompt>,
}

impl BatchTask {
    /// Create an empty batch of the given type.
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            base: TaskBase::new(task_type),
            tasks: Vec::new(),
            parameter_space: ParameterSpace::default(),
            policy: ExecutionPolicy::default(),
            prompt: Arc::new(ConsolePrompt),
        }
    }

    /// Add a subtask.
    pub fn with_task(mut self, task: impl Task + 'static) -> Self {
        self.add_task(Box::new(task));
        self
    }

    /// Add a boxed subtask.
    pub fn add_task(&mut self, task: Box<dyn Task>) {
        self.tasks.push(task);
    }

    /// Set the parameter space.
    pub fn with_parameter_space(mut self, space: ParameterSpace) -> Self {
        self.parameter_space = space;
        self
    }

    /// Set the execution policy.
    pub fn with_execution_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the prompt consulted under [`ExecutionPolicy::AskExisting`].
    pub fn with_prompt(mut self, prompt: impl ReusePrompt + 'static) -> Self {
        self.prompt = Arc::new(prompt);
        self
    }

    /// Subtasks in registration order.
    pub fn tasks(&self) -> &[Box<dyn Task>] {
        &self.tasks
    }

    /// Parameter space.
    pub fn parameter_space(&self) -> &ParameterSpace {
        &self.parameter_space
    }

    /// Execution policy.
    pub fn execution_policy(&self) -> ExecutionPolicy {
        self.policy
    }

    async fn execute_configuration(
        &mut self,
        service: &ExecutionService,
        config: &Configuration,
        inherited_scope: &BTreeSet<ContextId>,
        completed: &mut CompletedSubtasks,
    ) -> Result<(), ExecError> {
        for id in completed.iter() {
            trace!("-- Already executed: {}", id);
        }

        // Visibility restarts from the inherited scope in every configuration
        let mut scope = inherited_scope.clone();

        for task in &mut self.tasks {
            task.configure(config);
        }

        let arbiter = Arbiter::new(self.policy, Arc::clone(&self.prompt));
        let mut queue: VecDeque<usize> = (0..self.tasks.len()).collect();
        let mut deferred = BTreeSet::new();
        let mut reasons = Vec::new();

        while let Some(index) = queue.pop_front() {
            let task = self.tasks[index].as_mut();

            match resolve_or_run(service, &arbiter, task, config, &scope, completed).await {
                Ok(meta) => {
                    completed.insert(meta.id.clone());
                    scope.insert(meta.id);
                    deferred.clear();
                    reasons.clear();
                }
                Err(e) if e.is_deferrable() => {
                    debug!("Deferring execution of task [{}]: {}", task.task_type(), e);
                    queue.push_back(index);

                    if deferred.contains(&index) {
                        return Err(ExecError::DependencyCycle { reasons });
                    }
                    deferred.insert(index);
                    reasons.push(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Task for BatchTask {
    fn base(&self) -> &TaskBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TaskBase {
        &mut self.base
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Batch
    }

    fn discriminators(&self) -> Discriminators {
        Discriminators::new()
    }

    async fn execute(&mut self, ctx: &mut TaskContext) -> Result<(), ExecError> {
        let inherited_config = ctx.inherited_configuration();
        let inherited_scope = ctx.inherited_scope();
        let service = ctx.execution_service().clone();

        // One subtask execution may serve several configurations
        let mut completed = CompletedSubtasks::default();

        let space = self.parameter_space.clone();
        let total = space.estimated_size();
        for (n, mut config) in space.iter().enumerate() {
            config.merge_defaults(&inherited_config);

            info!("== Running new configuration [{}] ==", ctx.id());
            for (key, value) in config.iter() {
                info!("[{}]: [{}]", key, abbreviate_middle(&value.to_string(), MAX_VALUE_WIDTH));
            }

            self.execute_configuration(&service, &config, &inherited_scope, &mut completed)
                .await?;

            info!("Completed configuration {}/{}", n + 1, total);
        }

        // Persist again so reports can see the subtasks
        self.base.set_attribute(SUBTASKS_KEY, completed.to_string());
        ctx.persist_task(&*self).await?;
        Ok(())
    }
}

impl std::fmt::Debug for BatchTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchTask")
            .field("base", &self.base)
            .field(
                "tasks",
                &self.tasks.iter().map(|t| t.task_type()).collect::<Vec<_>>(),
            )
            .field("parameter_space", &self.parameter_space)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Executions used by one batch run, across all configurations.
#[derive(Debug, Default)]
struct CompletedSubtasks {
    order: Vec<ContextId>,
    seen: BTreeSet<ContextId>,
}

impl CompletedSubtasks {
    fn insert(&mut self, id: ContextId) {
        if self.seen.insert(id.clone()) {
            self.order.push(id);
        }
    }

    fn contains(&self, id: &ContextId) -> bool {
        self.seen.contains(id)
    }

    fn iter(&self) -> impl Iterator<Item = &ContextId> {
        self.order.iter()
    }
}

impl std::fmt::Display for CompletedSubtasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.order.iter().map(ContextId::as_str).collect();
        write!(f, "[{}]", ids.join(", "))
    }
}

async fn resolve_or_run(
    service: &ExecutionService,
    arbiter: &Arbiter,
    task: &mut dyn Task,
    config: &Configuration,
    scope: &BTreeSet<ContextId>,
    completed: &CompletedSubtasks,
) -> Result<ExecutionMetadata, ExecError> {
    if task.kind() == TaskKind::Leaf {
        let existing = match latest_execution(
            service.storage().as_ref(),
            task.task_type(),
            &task.discriminators(),
            config,
        )
        .await
        {
            Ok(meta) => Some(meta),
            Err(ExecError::ContextNotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        let decision = arbiter
            .decide(existing, |id| scope.contains(id) || completed.contains(id))
            .await?;
        if let Decision::Reuse(meta) = decision {
            debug!("Using existing execution [{}]", meta.id);
            return Ok(meta);
        }
    }

    info!("Executing task [{}]", task.task_type());
    let engine = service.create_engine(&*task);
    let id = engine
        .run(task, Some(ImportScope::new(config.clone(), scope.clone())))
        .await?;
    Ok(service.storage().get_context(&id).await?)
}

/// Executions a completed batch used, read from its [`SUBTASKS_KEY`] attribute.
///
/// Contexts without the attribute have no subtasks.
pub async fn subtasks_of(
    storage: &dyn StorageService,
    id: &ContextId,
) -> Result<Vec<ContextId>, ExecError> {
    let attributes: BTreeMap<String, String> = retrieve_json(storage, id, ATTRIBUTES_KEY)
        .await?
        .ok_or_else(|| {
            StorageError::NotFound(format!("[{}] in context [{}]", ATTRIBUTES_KEY, id))
        })?;

    let Some(raw) = attributes.get(SUBTASKS_KEY) else {
        return Ok(Vec::new());
    };

    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(", ")
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<ContextId>().map_err(|e| {
                ExecError::from(StorageError::Other(format!(
                    "Invalid subtask id [{}] in [{}]: {}",
                    s, id, e
                )))
            })
        })
        .collect()
}

/// Shorten `s` to at most `max` characters by replacing its middle with `…`.
fn abbreviate_middle(s: &str, max: usize) -> String {
    let len = s.chars().count();
    if len <= max || max < 2 {
        return s.to_string();
    }

    let keep = max - 1;
    let head = keep / 2 + keep % 2;
    let tail = keep / 2;

    let mut out: String = s.chars().take(head).collect();
    out.push('…');
    out.extend(s.chars().skip(len - tail));
    out
}
