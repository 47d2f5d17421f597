//! Well-known context entries and JSON helpers.

use labflow_core::ContextId;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Result, StorageService};

/// Execution metadata. Its presence marks a context as successfully completed.
pub const METADATA_KEY: &str = "metadata.json";

/// Discriminators of the task that produced the context.
pub const DISCRIMINATORS_KEY: &str = "discriminators.json";

/// Free-form string attributes of the task.
pub const ATTRIBUTES_KEY: &str = "attributes.json";

/// Full configuration the task was run with.
pub const CONFIGURATION_KEY: &str = "configuration.json";

/// Serialize `value` as pretty JSON and store it under `key`.
pub async fn store_json<S, T>(storage: &S, id: &ContextId, key: &str, value: &T) -> Result<()>
where
    S: StorageService + ?Sized,
    T: Serialize + Sync + ?Sized,
{
    let json = serde_json::to_string_pretty(value)?;
    storage.store(id, key, json.as_bytes()).await
}

/// Read and deserialize the JSON entry `key`, if present.
pub async fn retrieve_json<S, T>(storage: &S, id: &ContextId, key: &str) -> Result<Option<T>>
where
    S: StorageService + ?Sized,
    T: DeserializeOwned,
{
    match storage.retrieve(id, key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}
