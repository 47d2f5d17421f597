//! Execution errors.

use labflow_core::Discriminators;
use labflow_storage::StorageError;

/// Errors raised while scheduling and running tasks.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// An import could not be resolved yet. The batch scheduler defers the
    /// task and retries it later in the same configuration pass.
    #[error("Unable to resolve import [{reference}]: {reason}")]
    UnresolvedImport {
        /// The reference that failed, in URI form
        reference: String,
        /// Why it failed
        reason: String,
    },

    /// No stored execution matched a lookup.
    #[error("No completed execution of [{task_type}] matches {constraints:?}")]
    ContextNotFound {
        /// Task type that was looked up
        task_type: String,
        /// Discriminators the execution had to carry
        constraints: Discriminators,
    },

    /// A lifecycle step (persistence, reports) failed.
    #[error("{message}")]
    LifeCycle {
        /// What failed
        message: String,
        /// Underlying cause
        #[source]
        source: anyhow::Error,
    },

    /// An import reference is malformed.
    #[error("Invalid import reference [{0}]")]
    InvalidReference(String),

    /// Tasks kept deferring each other without any progress.
    #[error("Circular or unsatisfiable dependencies detected:{}", format_reasons(.reasons))]
    DependencyCycle {
        /// Every deferral reason seen since the last progress
        reasons: Vec<String>,
    },

    /// Reading the operator's answer failed.
    #[error("Unable to read answer from prompt: {0}")]
    Prompt(#[source] std::io::Error),

    /// Storage error
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Failure raised by task or report code
    #[error(transparent)]
    Task(#[from] anyhow::Error),
}

impl ExecError {
    /// Build a lifecycle error with its cause.
    pub fn lifecycle(message: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        ExecError::LifeCycle {
            message: message.into(),
            source: cause.into(),
        }
    }

    /// Whether the scheduler may defer the failing task and retry it later.
    ///
    /// Also recognizes an unresolved import that task code wrapped into an
    /// [`anyhow::Error`].
    pub fn is_deferrable(&self) -> bool {
        match self {
            ExecError::UnresolvedImport { .. } => true,
            ExecError::Task(e) => e.chain().any(|cause| {
                matches!(
                    cause.downcast_ref::<ExecError>(),
                    Some(ExecError::UnresolvedImport { .. })
                )
            }),
            _ => false,
        }
    }
}

fn format_reasons(reasons: &[String]) -> String {
    reasons.iter().map(|r| format!("\n - {}", r)).collect()
}
