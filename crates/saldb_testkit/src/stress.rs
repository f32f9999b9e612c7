//! Concurrent commit drivers.
//!
//! These helpers run many sessions against one store on separate threads
//! and report how often optimistic commits collided.

use crate::fixtures::{date, new_document};
use saldb_core::{CoreError, ObjectId, RevisionId, Store};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Outcome of a concurrent commit run.
#[derive(Debug, Clone)]
pub struct ConcurrentResult {
    /// Revisions each thread committed, in commit order.
    pub revisions: Vec<Vec<RevisionId>>,
    /// Documents each thread created.
    pub objects: Vec<Vec<ObjectId>>,
    /// `Conflict` errors observed and retried.
    pub conflicts: usize,
    /// Wall time of the run.
    pub duration: Duration,
}

impl ConcurrentResult {
    /// Total number of successful commits.
    pub fn committed(&self) -> usize {
        self.revisions.iter().map(Vec::len).sum()
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Committed: {}", self.committed());
        println!("Conflicts: {}", self.conflicts);
        println!("Duration: {:?}", self.duration);
    }
}

/// Runs `threads` sessions that each commit `commits` documents.
///
/// Every commit that fails with `Conflict` is rebased and retried, so the
/// run ends with exactly `threads * commits` new revisions.
pub fn run_concurrent_commits(store: &Arc<Store>, threads: usize, commits: usize) -> ConcurrentResult {
    let start = Instant::now();
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let store = Arc::clone(store);
            thread::spawn(move || {
                let mut session = store.session();
                let mut revisions = Vec::with_capacity(commits);
                let mut objects = Vec::with_capacity(commits);
                let mut conflicts = 0;
                for i in 0..commits {
                    let title = format!("t{t}-{i}");
                    let id = new_document(&mut session, &title, date(2020, 1, 1))
                        .expect("create document");
                    objects.push(id);
                    loop {
                        match session.commit() {
                            Ok(rev) => {
                                revisions.push(rev);
                                break;
                            }
                            Err(CoreError::Conflict { .. }) => {
                                conflicts += 1;
                                session.rebase().expect("rebase");
                            }
                            Err(e) => panic!("unexpected commit error: {e}"),
                        }
                    }
                }
                (revisions, objects, conflicts)
            })
        })
        .collect();

    let mut result = ConcurrentResult {
        revisions: Vec::with_capacity(threads),
        objects: Vec::with_capacity(threads),
        conflicts: 0,
        duration: Duration::ZERO,
    };
    for handle in handles {
        let (revisions, objects, conflicts) = handle.join().expect("worker panicked");
        result.revisions.push(revisions);
        result.objects.push(objects);
        result.conflicts += conflicts;
    }
    result.duration = start.elapsed();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::document_store;

    #[test]
    fn single_thread_never_conflicts() {
        let store = document_store();
        let result = run_concurrent_commits(&store, 1, 10);
        assert_eq!(result.committed(), 10);
        assert_eq!(result.conflicts, 0);
        assert_eq!(store.current_revision(), RevisionId::new(10));
    }
}
