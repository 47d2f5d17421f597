//! Import references and their scoped resolution.

use labflow_core::{ContextId, Discriminators, ExecutionMetadata};
use labflow_storage::{StorageError, StorageService};

use crate::context::ImportScope;
use crate::error::ExecError;
use crate::lookup::latest_execution;

/// URI scheme of latest-by-type references.
pub const LATEST_CONTEXT_SCHEME: &str = "task-latest";

/// URI scheme of direct-by-id references.
pub const CONTEXT_ID_SCHEME: &str = "task-id";

/// Reference to the output of another task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportRef {
    /// The newest compatible execution of a task type.
    Latest {
        /// Task type to look up
        task_type: String,
        /// Discriminators the execution must carry
        constraints: Discriminators,
    },
    /// One specific execution.
    Context(ContextId),
}

impl ImportRef {
    /// Latest execution of `task_type` without extra constraints.
    pub fn latest(task_type: impl Into<String>) -> Self {
        ImportRef::Latest {
            task_type: task_type.into(),
            constraints: Discriminators::new(),
        }
    }

    /// Latest execution of `task_type` carrying the given discriminators.
    pub fn latest_with<I, K, V>(task_type: impl Into<String>, constraints: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        ImportRef::Latest {
            task_type: task_type.into(),
            constraints: constraints
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// A specific execution.
    pub fn context(id: ContextId) -> Self {
        ImportRef::Context(id)
    }
}

impl std::fmt::Display for ImportRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportRef::Latest { task_type, constraints } => {
                write!(f, "{}://{}", LATEST_CONTEXT_SCHEME, task_type)?;
                for (i, (k, v)) in constraints.iter().enumerate() {
                    f.write_str(if i == 0 { "?" } else { "&" })?;
                    write!(f, "{}={}", k, v)?;
                }
                Ok(())
            }
            ImportRef::Context(id) => write!(f, "{}://{}", CONTEXT_ID_SCHEME, id),
        }
    }
}

impl std::str::FromStr for ImportRef {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ExecError::InvalidReference(s.to_string());

        let (scheme, rest) = s.split_once("://").ok_or_else(invalid)?;
        let (authority, query) = match rest.split_once('?') {
            Some((authority, query)) => (authority, Some(query)),
            None => (rest, None),
        };
        if authority.is_empty() {
            return Err(invalid());
        }

        match scheme {
            LATEST_CONTEXT_SCHEME => {
                let mut constraints = Discriminators::new();
                for pair in query.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
                    let (k, v) = pair.split_once('=').ok_or_else(invalid)?;
                    constraints.insert(k.to_string(), v.to_string());
                }
                Ok(ImportRef::Latest {
                    task_type: authority.to_string(),
                    constraints,
                })
            }
            CONTEXT_ID_SCHEME if query.is_none() => {
                let id = authority.parse().map_err(|_| invalid())?;
                Ok(ImportRef::Context(id))
            }
            _ => Err(invalid()),
        }
    }
}

/// Resolve `reference` to a completed execution.
///
/// With a scope, the resolved execution must also be visible in it: a task
/// cannot see the output of a sibling that has not run yet in the current
/// batch pass, even if an older execution exists in storage. Without a scope
/// (a task run outside any batch) latest-by-type lookups use the constraints
/// alone.
pub async fn resolve_import(
    storage: &dyn StorageService,
    scope: Option<&ImportScope>,
    reference: &ImportRef,
) -> Result<ExecutionMetadata, ExecError> {
    let unresolved = |reason: String| ExecError::UnresolvedImport {
        reference: reference.to_string(),
        reason,
    };

    let meta = match reference {
        ImportRef::Latest { task_type, constraints } => match scope {
            Some(scope) => {
                match latest_execution(storage, task_type, constraints, scope.config()).await {
                    Ok(meta) => meta,
                    Err(e @ ExecError::ContextNotFound { .. }) => {
                        return Err(unresolved(e.to_string()))
                    }
                    Err(e) => return Err(e),
                }
            }
            None => {
                let found = storage.list_contexts(task_type, constraints).await?;
                match found.into_iter().next() {
                    Some(meta) => meta,
                    None => {
                        let e = ExecError::ContextNotFound {
                            task_type: task_type.clone(),
                            constraints: constraints.clone(),
                        };
                        return Err(unresolved(e.to_string()));
                    }
                }
            }
        },
        ImportRef::Context(id) => match storage.get_context(id).await {
            Ok(meta) => meta,
            Err(StorageError::NotFound(what)) => {
                return Err(unresolved(format!("{} does not exist", what)))
            }
            Err(e) => return Err(e.into()),
        },
    };

    if let Some(scope) = scope {
        if !scope.contains(&meta.id) {
            let visible: Vec<&str> = scope.visible().iter().map(ContextId::as_str).collect();
            return Err(unresolved(format!(
                "Resolved context [{}] not in scope {:?}",
                meta.id, visible
            )));
        }
    }

    Ok(meta)
}
