//! Core type definitions for SalDB.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Serial number of a committed revision.
///
/// Revision ids are gap-free and strictly increasing per store. Revision 0
/// is the empty initial state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct RevisionId(pub u64);

impl RevisionId {
    /// The empty initial revision.
    pub const ROOT: RevisionId = RevisionId(0);

    /// Creates a new revision id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next revision id.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rev:{}", self.0)
    }
}

impl From<u64> for RevisionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A revision addressed either by id or by tag name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionRef {
    /// A revision id.
    Id(RevisionId),
    /// A symbolic tag.
    Tag(String),
}

impl From<RevisionId> for RevisionRef {
    fn from(id: RevisionId) -> Self {
        Self::Id(id)
    }
}

impl From<u64> for RevisionRef {
    fn from(id: u64) -> Self {
        Self::Id(RevisionId::new(id))
    }
}

impl From<&str> for RevisionRef {
    fn from(tag: &str) -> Self {
        Self::Tag(tag.to_string())
    }
}

impl From<String> for RevisionRef {
    fn from(tag: String) -> Self {
        Self::Tag(tag)
    }
}

impl fmt::Display for RevisionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Tag(name) => write!(f, "tag:{name}"),
        }
    }
}
