//! Unique identifiers for execution contexts.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier of one task execution.
///
/// Generated ids have the form `<task type>-<ulid>`, so ids of the same task
/// type sort by creation time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContextId(String);

/// Error returned when a string cannot be used as a context id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseContextIdError {
    /// The id was empty
    #[error("context id must not be empty")]
    Empty,

    /// The id contains a character that cannot appear in a storage key
    #[error("context id [{0}] contains a path separator")]
    PathSeparator(String),

    /// The id names the current or parent directory
    #[error("context id [{0}] is reserved")]
    Reserved(String),
}

impl ContextId {
    /// Generate a fresh id for an execution of `task_type`.
    pub fn generate(task_type: &str) -> Self {
        let prefix: String = task_type
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        Self(format!("{}-{}", prefix, Ulid::new()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ContextId {
    type Err = ParseContextIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

impl TryFrom<String> for ContextId {
    type Error = ParseContextIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.trim().is_empty() {
            return Err(ParseContextIdError::Empty);
        }
        if s.contains('/') || s.contains('\\') {
            return Err(ParseContextIdError::PathSeparator(s));
        }
        if s == "." || s == ".." {
            return Err(ParseContextIdError::Reserved(s));
        }
        Ok(Self(s))
    }
}

impl From<ContextId> for String {
    fn from(id: ContextId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique_and_prefixed() {
        let a = ContextId::generate("Preprocess");
        let b = ContextId::generate("Preprocess");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("Preprocess-"));
    }

    #[test]
    fn test_generated_id_replaces_separators() {
        let id = ContextId::generate("stage/one");
        assert!(id.as_str().starts_with("stage_one-"));
        assert!(id.as_str().parse::<ContextId>().is_ok());
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert_eq!("".parse::<ContextId>(), Err(ParseContextIdError::Empty));
        assert!(matches!(
            "../etc".parse::<ContextId>(),
            Err(ParseContextIdError::PathSeparator(_))
        ));
        for dir in [".", ".."] {
            assert_eq!(
                dir.parse::<ContextId>(),
                Err(ParseContextIdError::Reserved(dir.to_string()))
            );
        }
        assert!("..Train-01ABC".parse::<ContextId>().is_ok());
    }
}
