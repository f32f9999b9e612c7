//! Concurrent sessions against one store.

use saldb_core::{CoreError, Expr, QueryOptions, RevisionId, Value};
use saldb_testkit::prelude::*;
use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn concurrent_commits_serialize_without_gaps() {
    let store = document_store();
    let result = run_concurrent_commits(&store, 4, 25);
    result.print_summary("concurrent commits");

    assert_eq!(result.committed(), 100);
    assert_eq!(store.current_revision(), RevisionId::new(100));

    let all: BTreeSet<RevisionId> = result.revisions.iter().flatten().copied().collect();
    let expected: BTreeSet<RevisionId> = (1..=100).map(RevisionId::new).collect();
    assert_eq!(all, expected);
    for revisions in &result.revisions {
        assert!(revisions.windows(2).all(|w| w[0] < w[1]));
    }

    let total = store
        .query(store.current_revision(), &Expr::of_type("Document"), &QueryOptions::new())
        .unwrap()
        .total();
    assert_eq!(total, 100);
    assert_eq!(store.stats().conflicts() as usize, result.conflicts);
}

#[test]
fn racing_sessions_exactly_one_wins() {
    let store = document_store();
    let threads = 4;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut session = store.session();
                new_document(&mut session, &format!("racer-{i}"), date(2020, 1, 1)).unwrap();
                barrier.wait();
                session.commit()
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(CoreError::Conflict { .. })))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(conflicts, threads - 1);
    assert_eq!(store.current_revision(), RevisionId::new(1));
}

#[test]
fn readers_see_stable_revisions_during_writes() {
    let (store, archive) = scenarios::published_archive();
    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            let mut session = store.session();
            for day in 1..=20 {
                session.set(archive.a, "created", date(2019, 1, day)).unwrap();
                session.commit().unwrap();
            }
        })
    };

    let mut reader = store.session();
    reader.use_revision("published").unwrap();
    for _ in 0..50 {
        let a = reader.get(archive.a).unwrap();
        assert_eq!(a.get("created").unwrap(), &Value::Date(date(2020, 1, 1)));
    }
    writer.join().unwrap();
    assert_eq!(store.current_revision(), RevisionId::new(22));
}
