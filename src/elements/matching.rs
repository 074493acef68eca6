//! Merge predicate for story elements.
//!
//! Deliberately a named function rather than `PartialEq`: the relation is
//! not transitive ("Иван Петров" ~ "Петров" ~ "Пётр Петров" does not make
//! the two full names equal), so it must not masquerade as equality.

use serde::{Deserialize, Serialize};

use super::element::StoryElement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrictness {
    /// Any shared name or alias word links two elements.
    #[default]
    SharedWord,
    /// One element's full name must be a known name of the other.
    KnownName,
}

/// Whether `candidate` describes the same element as `existing`.
pub fn should_merge(existing: &StoryElement, candidate: &StoryElement, strictness: MatchStrictness) -> bool {
    if existing.id == candidate.id {
        return true;
    }
    if existing.kind != candidate.kind {
        return false;
    }
    match strictness {
        MatchStrictness::SharedWord => candidate.names().any(|n| existing.is_known_as(n)),
        MatchStrictness::KnownName => {
            existing.is_known_as(&candidate.name) || candidate.is_known_as(&existing.name)
        }
    }
}
