//! Query results.

use crate::error::CoreResult;
use crate::object::{ObjectId, PersistentObject};
use crate::store::Store;
use crate::types::RevisionId;
use std::sync::Arc;

/// Outcome of evaluating a query.
///
/// Yields matching ids once, in result order. [`QueryResult::total`] reports
/// the size of the full match set regardless of the limit.
#[derive(Debug)]
pub struct QueryResult {
    total: usize,
    ids: std::vec::IntoIter<ObjectId>,
}

impl QueryResult {
    pub(crate) fn new(total: usize, ids: Vec<ObjectId>) -> Self {
        Self {
            total,
            ids: ids.into_iter(),
        }
    }

    /// Returns the number of matches before the limit was applied.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Resolves the remaining ids against `store` at revision `at`.
    pub fn objects(self, store: &Store, at: RevisionId) -> ObjectIter<'_> {
        ObjectIter {
            store,
            at,
            ids: self.ids,
        }
    }
}

impl Iterator for QueryResult {
    type Item = ObjectId;

    fn next(&mut self) -> Option<Self::Item> {
        self.ids.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

impl ExactSizeIterator for QueryResult {}

/// Resolves query matches one at a time.
///
/// Each step takes the store's read lock only for the lookup, so a long
/// iteration never holds off a commit.
pub struct ObjectIter<'a> {
    store: &'a Store,
    at: RevisionId,
    ids: std::vec::IntoIter<ObjectId>,
}

impl Iterator for ObjectIter<'_> {
    type Item = CoreResult<Arc<PersistentObject>>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.next()?;
        Some(self.store.resolve(self.at, id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}
