//! Copy-on-write object graph.
//!
//! Every object id maps to its versions keyed by the revision that wrote
//! them. A `None` version is a tombstone. Resolving at revision `R` picks the
//! newest version written at or before `R`, so unchanged objects are shared
//! by every revision after the one that wrote them.

use crate::error::{CoreError, CoreResult};
use crate::index::IndexKey;
use crate::object::{ObjectId, PersistentObject};
use crate::types::RevisionId;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A recorded object version; `None` marks removal.
pub type Version = Option<Arc<PersistentObject>>;

/// Identifier-indexed table of object versions.
#[derive(Debug, Default)]
pub struct ObjectGraph {
    versions: HashMap<ObjectId, BTreeMap<RevisionId, Version>>,
}

impl ObjectGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `id` as of revision `at`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the object did not exist at `at` or was removed.
    pub fn resolve(&self, at: RevisionId, id: ObjectId) -> CoreResult<Arc<PersistentObject>> {
        self.try_resolve(at, id)
            .ok_or_else(|| CoreError::not_found(format!("object {id} at {at}")))
    }

    /// Resolves `id` as of revision `at`, if it exists there.
    #[must_use]
    pub fn try_resolve(&self, at: RevisionId, id: ObjectId) -> Option<Arc<PersistentObject>> {
        self.versions
            .get(&id)?
            .range(..=at)
            .next_back()
            .and_then(|(_, version)| version.clone())
    }

    /// Records the version of `id` written by revision `at`.
    pub fn put(&mut self, at: RevisionId, id: ObjectId, version: Version) {
        self.versions.entry(id).or_default().insert(at, version);
    }

    /// Drops the versions revision `at` wrote for `ids`.
    pub fn undo<'a>(&mut self, at: RevisionId, ids: impl IntoIterator<Item = &'a ObjectId>) {
        for id in ids {
            if let Some(history) = self.versions.get_mut(id) {
                history.remove(&at);
                if history.is_empty() {
                    self.versions.remove(id);
                }
            }
        }
    }

    /// Folds every version older than `cutoff` into `cutoff`.
    ///
    /// Objects live at `cutoff` whose newest version predates it are moved
    /// onto `cutoff` and returned, so the caller can merge them into that
    /// revision's delta. Older versions and tombstones are discarded.
    pub fn compact(&mut self, cutoff: RevisionId) -> BTreeMap<ObjectId, Arc<PersistentObject>> {
        let mut merged = BTreeMap::new();
        self.versions.retain(|id, history| {
            let retained = history.split_off(&cutoff);
            let carried = history.pop_last().map(|(_, v)| v);
            *history = retained;
            if let Some(Some(object)) = carried {
                if !history.contains_key(&cutoff) {
                    let moved = Arc::new(object.restamped(cutoff));
                    history.insert(cutoff, Some(Arc::clone(&moved)));
                    merged.insert(*id, moved);
                }
            }
            !history.is_empty()
        });
        merged
    }

    /// Returns every object live at `at`, in id order.
    #[must_use]
    pub fn live_at(&self, at: RevisionId) -> Vec<Arc<PersistentObject>> {
        let mut live: Vec<_> = self
            .versions
            .keys()
            .filter_map(|id| self.try_resolve(at, *id))
            .collect();
        live.sort_by_key(|o| o.id());
        live
    }

    /// Resolves `ids` at `at` and orders them by `order_by`.
    ///
    /// Objects without a value for the field sort last in either direction.
    /// Ties break by ascending id.
    pub fn ordered(
        &self,
        at: RevisionId,
        ids: impl IntoIterator<Item = ObjectId>,
        order_by: Option<&str>,
    ) -> Vec<Arc<PersistentObject>> {
        let mut keyed: Vec<(Option<IndexKey>, Arc<PersistentObject>)> = ids
            .into_iter()
            .filter_map(|id| self.try_resolve(at, id))
            .map(|obj| {
                let key = order_by
                    .and_then(|field| obj.get(field).ok())
                    .and_then(IndexKey::from_value);
                (key, obj)
            })
            .collect();
        keyed.sort_by(|(ka, a), (kb, b)| {
            compare_keys(ka.as_ref(), kb.as_ref(), false).then(a.id().cmp(&b.id()))
        });
        keyed.into_iter().map(|(_, obj)| obj).collect()
    }

    /// Returns the number of object ids with at least one version.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Returns true if no version was ever recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Orders optional keys with missing keys last, regardless of `reverse`.
pub(crate) fn compare_keys(a: Option<&IndexKey>, b: Option<&IndexKey>, reverse: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if reverse => b.cmp(a),
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldRef, Registry, ResolvedType, Schema, SchemaField, TypeDef};
    use crate::value::ValueKind;

    fn note_type() -> Arc<ResolvedType> {
        let mut registry = Registry::new();
        registry
            .register_schema(Schema::new("Note").field(SchemaField::new("rank", ValueKind::Integer)))
            .unwrap();
        registry.register_type("Note", TypeDef::new(["Note"])).unwrap();
        registry.initialize().unwrap();
        registry.type_def("Note").unwrap()
    }

    fn note(id: ObjectId, rank: Option<i64>) -> Version {
        let mut obj = PersistentObject::new(id, note_type());
        if let Some(rank) = rank {
            obj.set(FieldRef::new("Note", "rank"), rank.into());
        }
        Some(Arc::new(obj))
    }

    fn rev(n: u64) -> RevisionId {
        RevisionId::new(n)
    }

    #[test]
    fn resolve_picks_newest_version_at_or_before() {
        let mut graph = ObjectGraph::new();
        let id = ObjectId::new();
        graph.put(rev(1), id, note(id, Some(1)));
        graph.put(rev(3), id, note(id, Some(3)));

        assert!(graph.try_resolve(rev(0), id).is_none());
        let rank = |r| graph.resolve(rev(r), id).unwrap().get("rank").unwrap().clone();
        assert_eq!(rank(1), 1.into());
        assert_eq!(rank(2), 1.into());
        assert_eq!(rank(5), 3.into());
    }

    #[test]
    fn tombstone_hides_object() {
        let mut graph = ObjectGraph::new();
        let id = ObjectId::new();
        graph.put(rev(1), id, note(id, None));
        graph.put(rev(2), id, None);

        assert!(graph.try_resolve(rev(1), id).is_some());
        assert!(matches!(
            graph.resolve(rev(2), id),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn undo_removes_only_that_revision() {
        let mut graph = ObjectGraph::new();
        let a = ObjectId::new();
        let b = ObjectId::new();
        graph.put(rev(1), a, note(a, Some(1)));
        graph.put(rev(2), a, note(a, Some(2)));
        graph.put(rev(2), b, note(b, Some(9)));
        graph.undo(rev(2), &[a, b]);

        assert_eq!(graph.resolve(rev(2), a).unwrap().get("rank").unwrap(), &1.into());
        assert!(graph.try_resolve(rev(2), b).is_none());
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn compact_preserves_state_at_cutoff() {
        let mut graph = ObjectGraph::new();
        let kept = ObjectId::new();
        let removed = ObjectId::new();
        let rewritten = ObjectId::new();
        graph.put(rev(1), kept, note(kept, Some(1)));
        graph.put(rev(1), removed, note(removed, Some(1)));
        graph.put(rev(2), removed, None);
        graph.put(rev(1), rewritten, note(rewritten, Some(1)));
        graph.put(rev(3), rewritten, note(rewritten, Some(3)));

        let before: Vec<_> = graph.live_at(rev(3)).iter().map(|o| o.id()).collect();
        let merged = graph.compact(rev(3));

        assert_eq!(merged.keys().copied().collect::<Vec<_>>(), vec![kept]);
        assert_eq!(merged[&kept].revision(), rev(3));
        let after: Vec<_> = graph.live_at(rev(3)).iter().map(|o| o.id()).collect();
        assert_eq!(before, after);
        assert!(graph.try_resolve(rev(3), removed).is_none());
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn ordered_puts_missing_keys_last() {
        let mut graph = ObjectGraph::new();
        let ids: Vec<ObjectId> = (1..=4u8).map(|n| ObjectId::from_bytes([n; 16])).collect();
        graph.put(rev(1), ids[0], note(ids[0], Some(5)));
        graph.put(rev(1), ids[1], note(ids[1], None));
        graph.put(rev(1), ids[2], note(ids[2], Some(1)));
        graph.put(rev(1), ids[3], note(ids[3], Some(5)));

        let order: Vec<_> = graph
            .ordered(rev(1), ids.clone(), Some("rank"))
            .iter()
            .map(|o| o.id())
            .collect();
        assert_eq!(order, vec![ids[2], ids[0], ids[3], ids[1]]);
    }

    #[test]
    fn compare_keys_reverse_keeps_missing_last() {
        let one = IndexKey::Integer(1);
        let two = IndexKey::Integer(2);
        assert_eq!(compare_keys(Some(&one), Some(&two), true), Ordering::Greater);
        assert_eq!(compare_keys(None, Some(&two), true), Ordering::Greater);
    }
}
