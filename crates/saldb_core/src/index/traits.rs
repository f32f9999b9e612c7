//! Index trait.

use crate::error::{CoreError, CoreResult};
use crate::index::key::IndexKey;
use crate::index::spec::IndexSpec;
use crate::object::ObjectId;
use crate::types::RevisionId;
use crate::value::Value;
use std::collections::BTreeSet;
use std::ops::Bound;

/// A set of matching object ids, in id order.
pub type IdSet = BTreeSet<ObjectId>;

/// Core index trait.
///
/// Every entry carries the revisions during which it holds, so any
/// addressable revision can be read without copying index state. Writes
/// happen only inside the commit critical section.
pub trait Index: Send + Sync {
    /// Returns the index declaration.
    fn spec(&self) -> &IndexSpec;

    /// Converts an extracted value into the keys it is indexed under.
    ///
    /// # Errors
    ///
    /// `IndexTypeMismatch` if the value cannot be held by this index.
    fn keys_for(&self, value: &Value) -> CoreResult<Vec<IndexKey>>;

    /// Records that `id` holds `key` from revision `at` on.
    fn insert(&mut self, key: &IndexKey, id: ObjectId, at: RevisionId);

    /// Records that `id` stops holding `key` at revision `at`.
    fn remove(&mut self, key: &IndexKey, id: ObjectId, at: RevisionId);

    /// Returns the objects holding `key` at `at`.
    fn lookup(&self, key: &IndexKey, at: RevisionId) -> IdSet;

    /// Returns the objects whose key lies within the bounds at `at`.
    ///
    /// Only keys of the bounds' kind are considered.
    fn range(
        &self,
        lower: Bound<&IndexKey>,
        upper: Bound<&IndexKey>,
        at: RevisionId,
    ) -> CoreResult<IdSet> {
        let _ = (lower, upper, at);
        Err(CoreError::type_mismatch(format!(
            "index `{}` does not support range comparisons",
            self.spec().name()
        )))
    }

    /// Returns the objects whose text contains every token of `text`.
    fn search(&self, text: &str, at: RevisionId) -> CoreResult<IdSet> {
        let _ = (text, at);
        Err(CoreError::type_mismatch(format!(
            "index `{}` does not support containment",
            self.spec().name()
        )))
    }

    /// Reverts every change made at revision `at`.
    fn undo(&mut self, at: RevisionId);

    /// Drops history older than `cutoff`.
    fn compact(&mut self, cutoff: RevisionId);

    /// Removes every entry.
    fn clear(&mut self);

    /// Returns the number of distinct keys with any history.
    fn len(&self) -> usize;

    /// Returns true if the index holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared key conversion for scalar indexes: coerce to the declared kind,
/// then require a scalar.
pub(crate) fn scalar_key(spec: &IndexSpec, value: &Value) -> CoreResult<Vec<IndexKey>> {
    let mismatch = |v: &Value| CoreError::IndexTypeMismatch {
        index: spec.name().to_string(),
        found: v.describe(),
    };
    let coerced = match spec.declared_kind() {
        Some(kind) => value.clone().coerce(kind).map_err(|v| mismatch(&v))?,
        None => value.clone(),
    };
    IndexKey::from_value(&coerced)
        .map(|key| vec![key])
        .ok_or_else(|| mismatch(value))
}
