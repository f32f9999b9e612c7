//! Store statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! let store = Store::open(registry, StoreConfig::default())?;
//! // ... commits and queries ...
//! let stats = store.stats().snapshot();
//! println!("commits: {}, conflicts: {}", stats.commits, stats.conflicts);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by a store while it runs.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct StoreStats {
    /// Revisions committed.
    commits: AtomicU64,
    /// Commits rejected because their parent was not the latest revision.
    conflicts: AtomicU64,
    /// Revisions removed by rollback.
    rollbacks: AtomicU64,
    /// Revisions dropped by forget.
    forgotten: AtomicU64,
    /// Query evaluations.
    queries: AtomicU64,
    /// Query leaves answered by scanning instead of an index.
    scans: AtomicU64,
    /// Posting changes applied to indexes.
    index_updates: AtomicU64,
}

impl StoreStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_commit(&self, index_updates: usize) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        self.index_updates
            .fetch_add(index_updates as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_forget(&self, revisions: usize) {
        self.forgotten.fetch_add(revisions as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of committed revisions.
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Returns the number of rejected commits.
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Returns the number of rolled back revisions.
    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    /// Returns the number of forgotten revisions.
    pub fn forgotten(&self) -> u64 {
        self.forgotten.load(Ordering::Relaxed)
    }

    /// Returns the number of evaluated queries.
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Returns the number of scanned query leaves.
    ///
    /// A high count may indicate a missing index.
    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Returns the number of applied posting changes.
    pub fn index_updates(&self) -> u64 {
        self.index_updates.load(Ordering::Relaxed)
    }

    /// Returns a point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            commits: self.commits(),
            conflicts: self.conflicts(),
            rollbacks: self.rollbacks(),
            forgotten: self.forgotten(),
            queries: self.queries(),
            scans: self.scans(),
            index_updates: self.index_updates(),
        }
    }
}

/// A copy of [`StoreStats`] at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Committed revisions.
    pub commits: u64,
    /// Rejected commits.
    pub conflicts: u64,
    /// Rolled back revisions.
    pub rollbacks: u64,
    /// Forgotten revisions.
    pub forgotten: u64,
    /// Evaluated queries.
    pub queries: u64,
    /// Scanned query leaves.
    pub scans: u64,
    /// Applied posting changes.
    pub index_updates: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = StoreStats::new();
        stats.record_commit(3);
        stats.record_commit(2);
        stats.record_conflict();
        stats.record_rollback();
        stats.record_forget(4);
        stats.record_query();
        stats.record_scan();

        let snap = stats.snapshot();
        assert_eq!(snap.commits, 2);
        assert_eq!(snap.index_updates, 5);
        assert_eq!(snap.conflicts, 1);
        assert_eq!(snap.rollbacks, 1);
        assert_eq!(snap.forgotten, 4);
        assert_eq!(snap.queries, 1);
        assert_eq!(snap.scans, 1);
    }
}
