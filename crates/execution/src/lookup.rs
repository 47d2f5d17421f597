//! Lookup of the latest execution compatible with a configuration.

use labflow_core::{match_constraints, Configuration, Discriminators, ExecutionMetadata, MatchMode};
use labflow_storage::records::DISCRIMINATORS_KEY;
use labflow_storage::{retrieve_json, StorageService};
use tracing::trace;

use crate::error::ExecError;

/// Find the most recent completed execution of `task_type` that carries
/// `discriminators` and does not conflict with `config`.
///
/// The stored discriminators of each candidate are read as constraints on the
/// configuration (merged with `discriminators`); candidates are tried in the
/// order storage lists them, newest first.
pub async fn latest_execution(
    storage: &dyn StorageService,
    task_type: &str,
    discriminators: &Discriminators,
    config: &Configuration,
) -> Result<ExecutionMetadata, ExecError> {
    let mut candidate = config.to_string_map();
    candidate.extend(discriminators.iter().map(|(k, v)| (k.clone(), v.clone())));

    for meta in storage.list_contexts(task_type, discriminators).await? {
        let stored: Discriminators = retrieve_json(storage, &meta.id, DISCRIMINATORS_KEY)
            .await?
            .unwrap_or_default();
        if match_constraints(&stored, &candidate, MatchMode::Lenient) {
            return Ok(meta);
        }
        trace!("Execution [{}] conflicts with the configuration", meta.id);
    }

    Err(ExecError::ContextNotFound {
        task_type: task_type.to_string(),
        constraints: discriminators.clone(),
    })
}
