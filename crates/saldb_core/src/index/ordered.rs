//! Ordered index implementation.

use crate::error::CoreResult;
use crate::index::key::IndexKey;
use crate::index::postings::Postings;
use crate::index::spec::IndexSpec;
use crate::index::traits::{scalar_key, IdSet, Index};
use crate::object::ObjectId;
use crate::types::RevisionId;
use crate::value::Value;
use std::collections::BTreeMap;
use std::ops::Bound;

/// B-tree index for equality, range comparisons and ordering.
///
/// # Example
///
/// ```rust,ignore
/// let mut index = OrderedIndex::new(IndexSpec::field("created"));
/// index.insert(&IndexKey::Integer(25), id, RevisionId::new(1));
///
/// let adults = index.range(
///     Bound::Included(&IndexKey::Integer(18)),
///     Bound::Unbounded,
///     RevisionId::new(1),
/// )?;
/// ```
pub struct OrderedIndex {
    spec: IndexSpec,
    entries: BTreeMap<IndexKey, Postings>,
}

impl OrderedIndex {
    /// Creates an empty ordered index.
    pub fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            entries: BTreeMap::new(),
        }
    }

    /// Returns the smallest key visible at `at`.
    pub fn min_key(&self, at: RevisionId) -> Option<&IndexKey> {
        self.entries
            .iter()
            .find(|(_, p)| p.visible(at).next().is_some())
            .map(|(k, _)| k)
    }

    /// Returns the largest key visible at `at`.
    pub fn max_key(&self, at: RevisionId) -> Option<&IndexKey> {
        self.entries
            .iter()
            .rev()
            .find(|(_, p)| p.visible(at).next().is_some())
            .map(|(k, _)| k)
    }
}

impl Index for OrderedIndex {
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

    fn range(
        &self,
        lower: Bound<&IndexKey>,
        upper: Bound<&IndexKey>,
        at: RevisionId,
    ) -> CoreResult<IdSet> {
        let kind = match (lower, upper) {
            (Bound::Included(k) | Bound::Excluded(k), _)
            | (_, Bound::Included(k) | Bound::Excluded(k)) => Some(k.kind()),
            _ => None,
        };
        if let (
            Bound::Included(lo) | Bound::Excluded(lo),
            Bound::Included(hi) | Bound::Excluded(hi),
        ) = (lower, upper)
        {
            let both_included = matches!((lower, upper), (Bound::Included(_), Bound::Included(_)));
            if lo > hi || (lo == hi && !both_included) {
                return Ok(IdSet::new());
            }
        }
        Ok(self
            .entries
            .range((lower, upper))
            .filter(|(key, _)| kind.map_or(true, |k| key.kind() == k))
            .flat_map(|(_, postings)| postings.visible(at))
            .collect())
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
