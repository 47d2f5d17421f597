//! Execution policy - whether a compatible prior execution is reused.

use std::sync::Arc;

use async_trait::async_trait;
use labflow_core::{ContextId, ExecutionMetadata};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::error::ExecError;

/// What a batch does with subtasks that already have a compatible execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPolicy {
    /// Always run again.
    #[default]
    RunAgain,
    /// Reuse any compatible execution.
    UseExisting,
    /// Ask the operator for every compatible execution.
    AskExisting,
}

impl std::str::FromStr for ExecutionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "run_again" => Ok(ExecutionPolicy::RunAgain),
            "use_existing" => Ok(ExecutionPolicy::UseExisting),
            "ask_existing" => Ok(ExecutionPolicy::AskExisting),
            other => Err(format!(
                "invalid execution policy: {other} (expected \"run_again\", \"use_existing\" or \"ask_existing\")"
            )),
        }
    }
}

/// Operator decision callback used under [`ExecutionPolicy::AskExisting`].
#[async_trait]
pub trait ReusePrompt: Send + Sync {
    /// Return `true` to execute the task again, `false` to reuse `existing`.
    async fn should_rerun(&self, existing: &ExecutionMetadata) -> Result<bool, ExecError>;
}

#[async_trait]
impl<F> ReusePrompt for F
where
    F: Fn(&ExecutionMetadata) -> bool + Send + Sync,
{
    async fn should_rerun(&self, existing: &ExecutionMetadata) -> Result<bool, ExecError> {
        Ok(self(existing))
    }
}

/// Asks on stdout and reads `y`/`n` from stdin. End of input means rerun.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsolePrompt;

#[async_trait]
impl ReusePrompt for ConsolePrompt {
    async fn should_rerun(&self, existing: &ExecutionMetadata) -> Result<bool, ExecError> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            println!(
                "\n\n[{}] has already been executed in this configuration. Do you wish to execute it again? (y/n)",
                existing.task_type
            );
            match lines.next_line().await.map_err(ExecError::Prompt)? {
                Some(line) => match line.trim().to_lowercase().as_str() {
                    "y" => return Ok(true),
                    "n" => return Ok(false),
                    _ => continue,
                },
                None => return Ok(true),
            }
        }
    }
}

/// Outcome of arbitration.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Execute the task.
    Run,
    /// Adopt this execution instead of running.
    Reuse(ExecutionMetadata),
}

/// Applies an [`ExecutionPolicy`] to a compatible prior execution.
#[derive(Clone)]
pub struct Arbiter {
    policy: ExecutionPolicy,
    prompt: Arc<dyn ReusePrompt>,
}

impl Arbiter {
    /// Create an arbiter.
    pub fn new(policy: ExecutionPolicy, prompt: Arc<dyn ReusePrompt>) -> Self {
        Self { policy, prompt }
    }

    /// The policy applied.
    pub fn policy(&self) -> ExecutionPolicy {
        self.policy
    }

    /// Decide whether to run or reuse.
    ///
    /// An execution the current aggregate already produced or adopted is
    /// reused regardless of policy, so no task runs twice for one aggregate.
    pub async fn decide<F>(
        &self,
        existing: Option<ExecutionMetadata>,
        in_aggregate: F,
    ) -> Result<Decision, ExecError>
    where
        F: Fn(&ContextId) -> bool + Send,
    {
        let Some(meta) = existing else {
            return Ok(Decision::Run);
        };

        if in_aggregate(&meta.id) {
            return Ok(Decision::Reuse(meta));
        }

        match self.policy {
            ExecutionPolicy::RunAgain => Ok(Decision::Run),
            ExecutionPolicy::UseExisting => Ok(Decision::Reuse(meta)),
            ExecutionPolicy::AskExisting => {
                if self.prompt.should_rerun(&meta).await? {
                    debug!("Operator chose to run [{}] again", meta.task_type);
                    Ok(Decision::Run)
                } else {
                    Ok(Decision::Reuse(meta))
                }
            }
        }
    }
}

impl std::fmt::Debug for Arbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arbiter").field("policy", &self.policy).finish()
    }
}
