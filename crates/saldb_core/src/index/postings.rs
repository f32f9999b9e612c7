//! Revision-versioned posting lists.

use crate::object::ObjectId;
use crate::types::RevisionId;
use std::collections::HashMap;

/// Revisions during which an object held a key: `from` inclusive,
/// `until` exclusive, open-ended while `until` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    from: RevisionId,
    until: Option<RevisionId>,
}

impl Span {
    fn visible_at(&self, at: RevisionId) -> bool {
        self.from <= at && self.until.map_or(true, |u| at < u)
    }
}

/// The objects holding one key, across all addressable revisions.
#[derive(Debug, Clone, Default)]
pub(crate) struct Postings {
    spans: HashMap<ObjectId, Vec<Span>>,
}

impl Postings {
    /// Starts a span for `id` at `at`.
    pub fn open(&mut self, id: ObjectId, at: RevisionId) {
        self.spans
            .entry(id)
            .or_default()
            .push(Span { from: at, until: None });
    }

    /// Ends the open span of `id` at `at`.
    pub fn close(&mut self, id: ObjectId, at: RevisionId) {
        if let Some(span) = self
            .spans
            .get_mut(&id)
            .and_then(|spans| spans.iter_mut().find(|s| s.until.is_none()))
        {
            span.until = Some(at);
        }
    }

    /// Returns the objects holding the key at `at`.
    pub fn visible(&self, at: RevisionId) -> impl Iterator<Item = ObjectId> + '_ {
        self.spans
            .iter()
            .filter(move |(_, spans)| spans.iter().any(|s| s.visible_at(at)))
            .map(|(id, _)| *id)
    }

    /// Reverts every change made at `at`.
    pub fn undo(&mut self, at: RevisionId) {
        self.spans.retain(|_, spans| {
            spans.retain(|s| s.from != at);
            for span in spans.iter_mut() {
                if span.until == Some(at) {
                    span.until = None;
                }
            }
            !spans.is_empty()
        });
    }

    /// Drops spans that ended at or before `cutoff` and clamps the rest so
    /// no span starts before it.
    pub fn compact(&mut self, cutoff: RevisionId) {
        self.spans.retain(|_, spans| {
            spans.retain(|s| s.until.map_or(true, |u| u > cutoff));
            for span in spans.iter_mut() {
                span.from = span.from.max(cutoff);
            }
            !spans.is_empty()
        });
    }

    /// Returns true once no span remains.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}
