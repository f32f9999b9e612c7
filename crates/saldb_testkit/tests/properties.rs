//! Property tests over random session workloads.

use proptest::prelude::*;
use saldb_core::{Expr, ObjectId, QueryOptions, RevisionId, Session, Store, Value};
use saldb_testkit::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Replays `ops`, returning the store and the expected committed state
/// (id -> created date) after every revision.
fn replay(ops: &[SessionOp]) -> (Arc<Store>, BTreeMap<RevisionId, BTreeMap<ObjectId, Value>>) {
    let store = document_store();
    let mut session = store.session();
    let mut docs: Vec<ObjectId> = Vec::new();
    let mut staged: BTreeMap<ObjectId, Value> = BTreeMap::new();
    let mut committed: BTreeMap<ObjectId, Value> = BTreeMap::new();
    let mut history = BTreeMap::from([(RevisionId::ROOT, BTreeMap::new())]);

    for op in ops {
        match op {
            SessionOp::Create { title, created } => {
                let id = new_document(&mut session, title, *created).unwrap();
                docs.push(id);
                staged.insert(id, Value::Date(*created));
            }
            SessionOp::Update { slot, created } => {
                if let Some(id) = pick(&docs, *slot, &staged) {
                    session.set(id, "created", *created).unwrap();
                    staged.insert(id, Value::Date(*created));
                }
            }
            SessionOp::Remove { slot } => {
                if let Some(id) = pick(&docs, *slot, &staged) {
                    session.remove(id).unwrap();
                    staged.remove(&id);
                }
            }
            SessionOp::Commit => commit(&mut session, &staged, &mut committed, &mut history),
        }
    }
    commit(&mut session, &staged, &mut committed, &mut history);
    (store, history)
}

fn pick(docs: &[ObjectId], slot: usize, live: &BTreeMap<ObjectId, Value>) -> Option<ObjectId> {
    if docs.is_empty() {
        return None;
    }
    let id = docs[slot % docs.len()];
    live.contains_key(&id).then_some(id)
}

fn commit(
    session: &mut Session,
    staged: &BTreeMap<ObjectId, Value>,
    committed: &mut BTreeMap<ObjectId, Value>,
    history: &mut BTreeMap<RevisionId, BTreeMap<ObjectId, Value>>,
) {
    let before = session.base_revision();
    let rev = session.commit().unwrap();
    if rev != before {
        *committed = staged.clone();
        history.insert(rev, committed.clone());
    }
}

fn state_at(store: &Store, at: RevisionId) -> BTreeMap<ObjectId, Value> {
    store
        .query(at, &Expr::of_type("Document"), &QueryOptions::new())
        .unwrap()
        .map(|id| {
            let object = store.resolve(at, id).unwrap();
            (id, object.get("created").unwrap().clone())
        })
        .collect()
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn revision_ids_are_gap_free(ops in session_op_sequence_strategy(1, 40)) {
        let (store, history) = replay(&ops);
        let log: Vec<u64> = store.revision_log().iter().map(|m| m.id.as_u64()).collect();
        let expected: Vec<u64> = (0..=store.current_revision().as_u64()).collect();
        prop_assert_eq!(log, expected);
        prop_assert_eq!(history.len() as u64, store.current_revision().as_u64() + 1);
    }

    #[test]
    fn every_revision_reads_back_its_state(ops in session_op_sequence_strategy(1, 40)) {
        let (store, history) = replay(&ops);
        for (rev, expected) in &history {
            prop_assert_eq!(&state_at(&store, *rev), expected);
        }
    }

    #[test]
    fn and_is_intersection(
        ops in session_op_sequence_strategy(5, 40),
        low in date_strategy(),
        high in date_strategy(),
    ) {
        let (store, _) = replay(&ops);
        let at = store.current_revision();
        let opts = QueryOptions::new();
        let after: BTreeSet<_> = store.query(at, &Expr::field("created").gte(low), &opts).unwrap().collect();
        let before: BTreeSet<_> = store.query(at, &Expr::field("created").lt(high), &opts).unwrap().collect();
        let both: BTreeSet<_> = store
            .query(at, &Expr::field("created").gte(low).and(Expr::field("created").lt(high)), &opts)
            .unwrap()
            .collect();
        let either: BTreeSet<_> = store
            .query(at, &Expr::field("created").gte(low).or(Expr::field("created").lt(high)), &opts)
            .unwrap()
            .collect();
        prop_assert_eq!(both, after.intersection(&before).copied().collect::<BTreeSet<_>>());
        prop_assert_eq!(either, after.union(&before).copied().collect::<BTreeSet<_>>());
    }

    #[test]
    fn ordered_query_is_sorted(ops in session_op_sequence_strategy(5, 40)) {
        let (store, _) = replay(&ops);
        let at = store.current_revision();
        let ids: Vec<_> = store
            .query(at, &Expr::of_type("Document"), &QueryOptions::new().order_by("created"))
            .unwrap()
            .collect();
        let keys: Vec<(Value, ObjectId)> = ids
            .iter()
            .map(|id| (store.resolve(at, *id).unwrap().get("created").unwrap().clone(), *id))
            .collect();
        for pair in keys.windows(2) {
            let (Value::Date(a), Value::Date(b)) = (&pair[0].0, &pair[1].0) else {
                panic!("created is always a date");
            };
            prop_assert!(a < b || (a == b && pair[0].1 < pair[1].1));
        }
    }

    #[test]
    fn forget_preserves_retained_state(
        ops in session_op_sequence_strategy(5, 40),
        cut in any::<u64>(),
    ) {
        let (store, history) = replay(&ops);
        let cutoff = RevisionId::new(cut % (store.current_revision().as_u64() + 1));
        store.forget_revisions(cutoff).unwrap();
        prop_assert_eq!(store.oldest_revision(), cutoff);
        for (rev, expected) in history.range(cutoff..) {
            prop_assert_eq!(&state_at(&store, *rev), expected);
        }
    }
}
