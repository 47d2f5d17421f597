//! Discriminators and the constraint matcher.
//!
//! Discriminators are the parameters that make up the cache identity of a
//! task execution. A stored execution is compatible with a configuration when
//! its discriminators do not conflict with it.

use std::collections::BTreeMap;

/// Discriminator values in canonical string form, keyed by parameter name.
pub type Discriminators = BTreeMap<String, String>;

/// How strictly a candidate has to agree with stored discriminators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Every stored key must be present in the candidate with the same value.
    /// Extra candidate keys are ignored.
    Lenient,
    /// Like [`MatchMode::Lenient`], and the candidate must not carry any key
    /// that is absent from the stored discriminators.
    Strict,
}

/// Check whether `candidate` satisfies the `stored` discriminators.
///
/// Compatibility searches use [`MatchMode::Lenient`] because a configuration
/// routinely carries parameters that are irrelevant to the task being matched.
pub fn match_constraints(
    stored: &Discriminators,
    candidate: &Discriminators,
    mode: MatchMode,
) -> bool {
    let stored_hold = stored
        .iter()
        .all(|(key, value)| candidate.get(key) == Some(value));

    match mode {
        MatchMode::Lenient => stored_hold,
        MatchMode::Strict => stored_hold && candidate.keys().all(|k| stored.contains_key(k)),
    }
}
