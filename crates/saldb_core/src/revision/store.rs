//! Revision store: the serial revision table and the tag table.

use crate::error::{CoreError, CoreResult};
use crate::index::HistoryEntry;
use crate::object::{ObjectId, PersistentObject};
use crate::revision::revision::{Delta, Revision, RevisionMeta, TagChange};
use crate::types::{RevisionId, RevisionRef};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Append-only table of committed revisions plus the tag table.
///
/// The store itself is not synchronized; the owning
/// [`Store`](crate::Store) serializes every mutation.
#[derive(Debug)]
pub struct RevisionStore {
    revisions: BTreeMap<RevisionId, Revision>,
    tags: BTreeMap<String, RevisionId>,
    latest: RevisionId,
}

impl Default for RevisionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RevisionStore {
    /// Creates a store holding only the empty revision 0.
    #[must_use]
    pub fn new() -> Self {
        let root = Revision {
            meta: RevisionMeta {
                id: RevisionId::ROOT,
                parent: None,
                timestamp: Utc::now(),
                user: None,
                note: None,
            },
            delta: Delta::new(),
        };
        Self {
            revisions: BTreeMap::from([(RevisionId::ROOT, root)]),
            tags: BTreeMap::new(),
            latest: RevisionId::ROOT,
        }
    }

    /// Rebuilds a store from persisted revisions, oldest first.
    ///
    /// # Errors
    ///
    /// `Codec` if ids are not contiguous, parents do not chain, or a tag
    /// targets a revision that is not present.
    pub fn from_parts(
        revisions: Vec<Revision>,
        tags: BTreeMap<String, RevisionId>,
    ) -> CoreResult<Self> {
        let mut table = BTreeMap::new();
        let mut expected: Option<RevisionId> = None;
        for revision in revisions {
            let id = revision.id();
            let chained = match expected {
                None => revision.meta.parent.is_none(),
                Some(next) => {
                    let parent = RevisionId::new(next.as_u64().saturating_sub(1));
                    id == next && revision.meta.parent == Some(parent)
                }
            };
            if !chained {
                return Err(CoreError::codec(format!(
                    "revision {id} does not continue the revision chain"
                )));
            }
            expected = Some(id.next());
            table.insert(id, revision);
        }
        let Some(latest) = table.keys().next_back().copied() else {
            return Err(CoreError::codec("revision table is empty"));
        };
        if let Some((name, target)) = tags.iter().find(|(_, t)| !table.contains_key(t)) {
            return Err(CoreError::codec(format!(
                "tag `{name}` targets missing revision {target}"
            )));
        }
        Ok(Self {
            revisions: table,
            tags,
            latest,
        })
    }

    /// Returns the latest revision id.
    #[must_use]
    pub fn latest(&self) -> RevisionId {
        self.latest
    }

    /// Returns the oldest retained revision id.
    #[must_use]
    pub fn floor(&self) -> RevisionId {
        self.revisions
            .keys()
            .next()
            .copied()
            .unwrap_or(RevisionId::ROOT)
    }

    /// Returns true if revision `id` is addressable.
    #[must_use]
    pub fn contains(&self, id: RevisionId) -> bool {
        self.revisions.contains_key(&id)
    }

    /// Returns revision `id`.
    pub fn get(&self, id: RevisionId) -> CoreResult<&Revision> {
        self.revisions
            .get(&id)
            .ok_or_else(|| CoreError::not_found(format!("revision {id}")))
    }

    /// Resolves an id or tag to an addressable revision id.
    pub fn resolve(&self, target: &RevisionRef) -> CoreResult<RevisionId> {
        match target {
            RevisionRef::Id(id) => self.get(*id).map(Revision::id),
            RevisionRef::Tag(name) => self.resolve_tag(name),
        }
    }

    /// Resolves a tag to its revision id.
    ///
    /// # Errors
    ///
    /// `NotFound` if the tag does not exist.
    pub fn resolve_tag(&self, name: &str) -> CoreResult<RevisionId> {
        self.tags
            .get(name)
            .copied()
            .filter(|id| self.contains(*id))
            .ok_or_else(|| CoreError::not_found(format!("tag `{name}`")))
    }

    /// Returns the tag table.
    #[must_use]
    pub fn tags(&self) -> &BTreeMap<String, RevisionId> {
        &self.tags
    }

    /// Describes moving tag `name` to `target`, or removing it when `target`
    /// is `None`.
    pub fn tag_change(&self, name: &str, target: Option<RevisionId>) -> CoreResult<TagChange> {
        if name.is_empty() {
            return Err(CoreError::validation("tag name is empty"));
        }
        let previous = self.tags.get(name).copied();
        match target {
            Some(id) if !self.contains(id) => Err(CoreError::not_found(format!("revision {id}"))),
            None if previous.is_none() => Err(CoreError::not_found(format!("tag `{name}`"))),
            _ => Ok(TagChange { previous, target }),
        }
    }

    /// Appends a revision on top of `parent`.
    ///
    /// # Errors
    ///
    /// `Conflict` if `parent` is not the latest revision.
    pub fn commit(
        &mut self,
        parent: RevisionId,
        delta: Delta,
        user: Option<String>,
        note: Option<String>,
    ) -> CoreResult<RevisionId> {
        self.check_parent(parent)?;
        for (name, change) in &delta.tags {
            match change.target {
                Some(target) => {
                    self.tags.insert(name.clone(), target);
                }
                None => {
                    self.tags.remove(name);
                }
            }
        }
        let id = self.latest.next();
        self.revisions.insert(
            id,
            Revision {
                meta: RevisionMeta {
                    id,
                    parent: Some(parent),
                    timestamp: Utc::now(),
                    user,
                    note,
                },
                delta,
            },
        );
        self.latest = id;
        Ok(id)
    }

    /// Fails with `Conflict` unless `parent` is the latest revision.
    pub fn check_parent(&self, parent: RevisionId) -> CoreResult<()> {
        if parent != self.latest {
            return Err(CoreError::Conflict {
                parent,
                latest: self.latest,
            });
        }
        Ok(())
    }

    /// Removes the latest revision and restores the tag table it changed.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the latest revision has no parent: revision 0, or
    /// the oldest retained revision after a forget.
    pub fn roll_back(&mut self) -> CoreResult<Revision> {
        let latest = self.get(self.latest)?;
        let Some(parent) = latest.meta.parent else {
            return Err(CoreError::invalid_state(format!(
                "revision {} has no parent to roll back to",
                self.latest
            )));
        };
        let Some(revision) = self.revisions.remove(&self.latest) else {
            return Err(CoreError::not_found(format!("revision {}", self.latest)));
        };
        for (name, change) in &revision.delta.tags {
            match change.previous {
                Some(previous) => {
                    self.tags.insert(name.clone(), previous);
                }
                None => {
                    self.tags.remove(name);
                }
            }
        }
        self.latest = parent;
        Ok(revision)
    }

    /// Checks that revisions older than `cutoff` may be forgotten.
    ///
    /// # Errors
    ///
    /// `InvalidState` if `cutoff` is past the latest revision or a tag
    /// targets a revision that would be forgotten.
    pub fn check_forget(&self, cutoff: RevisionId) -> CoreResult<()> {
        if cutoff > self.latest {
            return Err(CoreError::invalid_state(format!(
                "cannot forget past the latest revision {}",
                self.latest
            )));
        }
        if let Some((name, target)) = self.tags.iter().find(|(_, t)| **t < cutoff) {
            return Err(CoreError::invalid_state(format!(
                "tag `{name}` targets {target}, which would be forgotten"
            )));
        }
        Ok(())
    }

    /// Drops every revision older than `cutoff`, making `cutoff` the new
    /// floor. `carried` holds the objects whose newest version predates the
    /// cutoff; they join the cutoff revision's delta.
    ///
    /// Returns the number of revisions dropped.
    pub fn forget(
        &mut self,
        cutoff: RevisionId,
        carried: BTreeMap<ObjectId, Arc<PersistentObject>>,
    ) -> CoreResult<usize> {
        self.check_forget(cutoff)?;
        let retained = self.revisions.split_off(&cutoff);
        let dropped = self.revisions.len();
        self.revisions = retained;
        if let Some(floor) = self.revisions.get_mut(&cutoff) {
            floor.meta.parent = None;
            for (id, object) in carried {
                floor.delta.objects.entry(id).or_insert(Some(object));
            }
        }
        Ok(dropped)
    }

    /// Returns revision metadata in ascending id order.
    #[must_use]
    pub fn log(&self) -> Vec<RevisionMeta> {
        self.revisions.values().map(|r| r.meta.clone()).collect()
    }

    /// Iterates over retained revisions, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Revision> + Clone {
        self.revisions.values()
    }

    /// Returns the object history in the form index replay consumes.
    pub fn history(&self) -> impl Iterator<Item = HistoryEntry<'_>> + Clone {
        self.revisions
            .values()
            .map(|r| (r.meta.id, r.meta.parent, &r.delta.objects))
    }

    /// Returns the number of retained revisions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    /// Always false: revision 0 or the floor is always retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }
}
