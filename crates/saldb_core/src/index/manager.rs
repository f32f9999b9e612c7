//! Index manager: incremental, revision-aware maintenance of every index.
//!
//! The manager turns each commit's object changes into index updates and
//! applies them atomically with the commit. Because postings carry validity
//! spans, readers of any addressable revision see exactly the entries that
//! held at that revision.
//!
//! # Invariants
//!
//! - Updates are computed before the commit is published; any failure
//!   aborts the commit with no index change
//! - Updates are applied only inside the commit critical section
//! - Index contents are derivable from the revision table alone

use crate::error::{CoreError, CoreResult};
use crate::index::hash::HashIndex;
use crate::index::key::IndexKey;
use crate::index::ordered::OrderedIndex;
use crate::index::spec::{IndexDefinition, IndexKind, IndexSpec};
use crate::index::text::{TextIndex, TokenizerConfig};
use crate::index::traits::{IdSet, Index};
use crate::object::{ObjectGraph, ObjectId, PersistentObject, Version};
use crate::types::RevisionId;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A single posting change produced by a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexUpdate {
    /// `id` starts holding `key` in `index`.
    Insert {
        /// Index name.
        index: String,
        /// Indexed key.
        key: IndexKey,
        /// Object id.
        id: ObjectId,
    },
    /// `id` stops holding `key` in `index`.
    Remove {
        /// Index name.
        index: String,
        /// Indexed key.
        key: IndexKey,
        /// Object id.
        id: ObjectId,
    },
}

/// One revision of history as seen by index replay.
pub type HistoryEntry<'a> = (
    RevisionId,
    Option<RevisionId>,
    &'a BTreeMap<ObjectId, Version>,
);

/// Owns every index of a store.
pub struct IndexManager {
    indexes: BTreeMap<String, Box<dyn Index>>,
    tokenizer: TokenizerConfig,
}

impl std::fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexManager")
            .field("indexes", &self.indexes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl IndexManager {
    /// Creates empty indexes for `specs`.
    pub fn new(specs: &[IndexSpec], tokenizer: TokenizerConfig) -> Self {
        let mut manager = Self {
            indexes: BTreeMap::new(),
            tokenizer,
        };
        for spec in specs {
            let index = manager.build(spec.clone());
            manager.indexes.insert(spec.name().to_string(), index);
        }
        manager
    }

    fn build(&self, spec: IndexSpec) -> Box<dyn Index> {
        match spec.index_kind() {
            IndexKind::Ordered => Box::new(OrderedIndex::new(spec)),
            IndexKind::Hash => Box::new(HashIndex::new(spec)),
            IndexKind::Text => Box::new(TextIndex::new(spec, self.tokenizer.clone())),
        }
    }

    /// Returns the index called `name`.
    ///
    /// # Errors
    ///
    /// `UnknownIndex` if there is none.
    pub fn get(&self, name: &str) -> CoreResult<&dyn Index> {
        self.indexes
            .get(name)
            .map(|index| &**index)
            .ok_or_else(|| CoreError::unknown_index(name))
    }

    /// Returns true if an index called `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    /// Returns every index declaration, in name order.
    pub fn specs(&self) -> impl Iterator<Item = &IndexSpec> {
        self.indexes.values().map(|i| i.spec())
    }

    /// Returns the persisted form of every index declaration.
    #[must_use]
    pub fn definitions(&self) -> Vec<IndexDefinition> {
        self.specs().map(IndexSpec::definition).collect()
    }

    /// Returns the objects holding `key` in `index` at `at`.
    pub fn lookup(&self, index: &str, key: &IndexKey, at: RevisionId) -> CoreResult<IdSet> {
        Ok(self.get(index)?.lookup(key, at))
    }

    /// Computes the postings changes `changes` cause when committed on top
    /// of `parent`.
    ///
    /// # Errors
    ///
    /// `IndexTypeMismatch` if a new value cannot be indexed, `Validation` if a
    /// unique index would hold a key twice.
    pub fn compute_updates(
        &self,
        graph: &ObjectGraph,
        parent: Option<RevisionId>,
        changes: &BTreeMap<ObjectId, Version>,
    ) -> CoreResult<Vec<IndexUpdate>> {
        let mut updates = Vec::new();
        for index in self.indexes.values() {
            collect_updates(index.as_ref(), graph, parent, changes, &mut updates)?;
        }
        self.check_unique(parent, &updates)?;
        Ok(updates)
    }

    fn check_unique(&self, parent: Option<RevisionId>, updates: &[IndexUpdate]) -> CoreResult<()> {
        let mut touched: BTreeMap<(&str, &IndexKey), (IdSet, IdSet)> = BTreeMap::new();
        for update in updates {
            let (index, key, id, inserted) = match update {
                IndexUpdate::Insert { index, key, id } => (index, key, id, true),
                IndexUpdate::Remove { index, key, id } => (index, key, id, false),
            };
            let unique = self.indexes.get(index).map_or(false, |i| i.spec().unique);
            if !unique {
                continue;
            }
            let entry = touched.entry((index.as_str(), key)).or_default();
            if inserted {
                entry.0.insert(*id);
            } else {
                entry.1.insert(*id);
            }
        }

        for ((index, key), (inserted, removed)) in touched {
            if inserted.is_empty() {
                continue;
            }
            let mut holders = match parent {
                Some(parent) => self.lookup(index, key, parent)?,
                None => IdSet::new(),
            };
            holders.retain(|id| !removed.contains(id));
            holders.extend(inserted);
            if holders.len() > 1 {
                return Err(CoreError::validation(format!(
                    "key {key} is held by {} objects in unique index `{index}`",
                    holders.len()
                )));
            }
        }
        Ok(())
    }

    /// Applies updates computed for revision `at`.
    pub fn apply(&mut self, at: RevisionId, updates: &[IndexUpdate]) {
        for update in updates {
            match update {
                IndexUpdate::Insert { index, key, id } => {
                    if let Some(index) = self.indexes.get_mut(index) {
                        index.insert(key, *id, at);
                    }
                }
                IndexUpdate::Remove { index, key, id } => {
                    if let Some(index) = self.indexes.get_mut(index) {
                        index.remove(key, *id, at);
                    }
                }
            }
        }
    }

    /// Reverts every index change made at `at`.
    pub fn undo(&mut self, at: RevisionId) {
        for index in self.indexes.values_mut() {
            index.undo(at);
        }
    }

    /// Drops index history older than `cutoff`.
    pub fn compact(&mut self, cutoff: RevisionId) {
        for index in self.indexes.values_mut() {
            index.compact(cutoff);
        }
    }

    /// Adds an index and fills it from `history`.
    ///
    /// # Errors
    ///
    /// `Validation` if the name is taken; any error replay raises, in which
    /// case the index is not added.
    pub fn add_index<'a>(
        &mut self,
        spec: IndexSpec,
        graph: &ObjectGraph,
        history: impl IntoIterator<Item = HistoryEntry<'a>>,
    ) -> CoreResult<()> {
        if self.indexes.contains_key(spec.name()) {
            return Err(CoreError::validation(format!(
                "index `{}` already exists",
                spec.name()
            )));
        }
        let name = spec.name().to_string();
        let mut index = self.build(spec);
        replay(index.as_mut(), graph, history)?;
        debug!(index = %name, keys = index.len(), "index built");
        self.indexes.insert(name, index);
        Ok(())
    }

    /// Removes a non-built-in index.
    pub fn drop_index(&mut self, name: &str) -> CoreResult<()> {
        let index = self.get(name)?;
        if index.spec().is_builtin() {
            return Err(CoreError::invalid_state(format!(
                "built-in index `{name}` cannot be removed"
            )));
        }
        self.indexes.remove(name);
        Ok(())
    }

    /// Clears and refills every index from `history`.
    pub fn rebuild<'a>(
        &mut self,
        graph: &ObjectGraph,
        history: impl IntoIterator<Item = HistoryEntry<'a>> + Clone,
    ) -> CoreResult<()> {
        for (name, index) in &mut self.indexes {
            index.clear();
            replay(index.as_mut(), graph, history.clone())?;
            debug!(index = %name, keys = index.len(), "index rebuilt");
        }
        Ok(())
    }
}

fn keys_of(index: &dyn Index, object: Option<&PersistentObject>) -> CoreResult<BTreeSet<IndexKey>> {
    let mut keys = BTreeSet::new();
    if let Some(object) = object {
        for value in index.spec().extract(object)? {
            keys.extend(index.keys_for(&value)?);
        }
    }
    Ok(keys)
}

fn collect_updates(
    index: &dyn Index,
    graph: &ObjectGraph,
    parent: Option<RevisionId>,
    changes: &BTreeMap<ObjectId, Version>,
    out: &mut Vec<IndexUpdate>,
) -> CoreResult<()> {
    let name = index.spec().name();
    for (id, version) in changes {
        let old = parent.and_then(|p| graph.try_resolve(p, *id));
        let old_keys = keys_of(index, old.as_deref())?;
        let new_keys = keys_of(index, version.as_deref())?;
        for key in old_keys.difference(&new_keys) {
            out.push(IndexUpdate::Remove {
                index: name.to_string(),
                key: key.clone(),
                id: *id,
            });
        }
        for key in new_keys.difference(&old_keys) {
            out.push(IndexUpdate::Insert {
                index: name.to_string(),
                key: key.clone(),
                id: *id,
            });
        }
    }
    Ok(())
}

fn replay<'a>(
    index: &mut dyn Index,
    graph: &ObjectGraph,
    history: impl IntoIterator<Item = HistoryEntry<'a>>,
) -> CoreResult<()> {
    for (at, parent, changes) in history {
        let mut updates = Vec::new();
        collect_updates(index, graph, parent, changes, &mut updates)?;
        for update in &updates {
            match update {
                IndexUpdate::Insert { key, id, .. } => index.insert(key, *id, at),
                IndexUpdate::Remove { key, id, .. } => index.remove(key, *id, at),
            }
        }
    }
    Ok(())
}
