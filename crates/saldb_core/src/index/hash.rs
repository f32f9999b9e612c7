//! Hash index implementation.

use crate::error::CoreResult;
use crate::index::key::IndexKey;
use crate::index::postings::Postings;
use crate::index::spec::IndexSpec;
use crate::index::traits::{scalar_key, IdSet, Index};
use crate::object::ObjectId;
use crate::types::RevisionId;
use crate::value::Value;
use std::collections::HashMap;

/// Hash-based index for equality lookups.
///
/// Range comparisons against a hash index fail with `TypeMismatch`. The
/// built-in `path` index and the backreference indexes are hash indexes.
pub struct HashIndex {
    spec: IndexSpec,
    entries: HashMap<IndexKey, Postings>,
}

impl HashIndex {
    /// Creates an empty hash index.
    pub fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            entries: HashMap::new(),
        }
    }
}

impl Index for HashIndex {
    fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    fn keys_for(&self, value: &Value) -> CoreResult<Vec<IndexKey>> {
        scalar_key(&self.spec, value)
    }

    fn insert(&mut self, key: &IndexKey, id: ObjectId, at: RevisionId) {
        self.entries.entry(key.clone()).or_default().open(id, at);
    }

    fn remove(&mut self, key: &IndexKey, id: ObjectId, at: RevisionId) {
        if let Some(postings) = self.entries.get_mut(key) {
            postings.close(id, at);
        }
    }

    fn lookup(&self, key: &IndexKey, at: RevisionId) -> IdSet {
        self.entries
            .get(key)
            .map(|p| p.visible(at).collect())
            .unwrap_or_default()
    }

    fn undo(&mut self, at: RevisionId) {
        self.entries.retain(|_, p| {
            p.undo(at);
            !p.is_empty()
        });
    }

    fn compact(&mut self, cutoff: RevisionId) {
        self.entries.retain(|_, p| {
            p.compact(cutoff);
            !p.is_empty()
        });
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use std::ops::Bound;

    #[test]
    fn lookup_and_no_range() {
        let mut idx = HashIndex::new(IndexSpec::builtin_path());
        let id = ObjectId::new();
        let key = IndexKey::Text("/docs/a".into());
        idx.insert(&key, id, RevisionId::new(1));

        assert!(idx.lookup(&key, RevisionId::new(1)).contains(&id));
        assert!(idx.lookup(&key, RevisionId::ROOT).is_empty());
        assert!(matches!(
            idx.range(Bound::Included(&key), Bound::Unbounded, RevisionId::new(1)),
            Err(CoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn compact_drops_closed_history() {
        let mut idx = HashIndex::new(IndexSpec::builtin_path());
        let id = ObjectId::new();
        let key = IndexKey::Text("/x".into());
        idx.insert(&key, id, RevisionId::new(1));
        idx.remove(&key, id, RevisionId::new(2));
        idx.compact(RevisionId::new(2));
        assert!(idx.is_empty());
    }
}
