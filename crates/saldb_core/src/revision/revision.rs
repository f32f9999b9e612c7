//! Revision records.

use crate::object::{ObjectId, Version};
use crate::types::RevisionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata of a committed revision, as shown in the revision log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionMeta {
    /// Revision id.
    pub id: RevisionId,
    /// Parent revision; `None` for the oldest retained revision.
    pub parent: Option<RevisionId>,
    /// Commit time.
    pub timestamp: DateTime<Utc>,
    /// Committing user.
    pub user: Option<String>,
    /// Free-form commit note.
    pub note: Option<String>,
}

/// A tag remap recorded in a revision delta.
///
/// Keeping the previous target lets a rollback restore the tag table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagChange {
    /// Target before the change; `None` if the tag did not exist.
    pub previous: Option<RevisionId>,
    /// Target after the change; `None` if the tag was removed.
    pub target: Option<RevisionId>,
}

/// Copy-on-write delta of a revision relative to its parent.
#[derive(Debug, Clone, Default)]
pub struct Delta {
    /// New object versions; `None` marks removal.
    pub objects: BTreeMap<ObjectId, Version>,
    /// Tag remaps.
    pub tags: BTreeMap<String, TagChange>,
}

impl Delta {
    /// Creates an empty delta.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the delta changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.tags.is_empty()
    }
}

/// A committed revision.
#[derive(Debug, Clone)]
pub struct Revision {
    /// Revision metadata.
    pub meta: RevisionMeta,
    /// Changes relative to the parent.
    pub delta: Delta,
}

impl Revision {
    /// Returns the revision id.
    #[must_use]
    pub fn id(&self) -> RevisionId {
        self.meta.id
    }
}
