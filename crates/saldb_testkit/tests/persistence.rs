//! Saving and loading state through real files.

use saldb_core::{CoreError, Expr, QueryOptions, RevisionId, Snapshot, Store, StoreConfig, Value};
use saldb_testkit::prelude::*;
use std::collections::BTreeSet;
use std::fs::File;

#[test]
fn state_survives_save_and_load() {
    let (store, archive) = scenarios::published_archive();
    let mut session = store.session();
    session.set(archive.a, "created", date(2022, 3, 1)).unwrap();
    session.set_path(archive.folder, Some("/archive")).unwrap();
    session.commit_with_note("bump").unwrap();

    let state = TempState::new();
    store.save_to_path(&state.path()).unwrap();
    let loaded = Store::load_from_path(document_registry(), StoreConfig::default(), &state.path()).unwrap();

    assert_eq!(loaded.current_revision(), RevisionId::new(3));
    assert_eq!(loaded.tags(), store.tags());
    assert_eq!(loaded.revision_log().last().unwrap().note.as_deref(), Some("bump"));
    assert_eq!(loaded.lookup_path(RevisionId::new(3), "/archive").unwrap(), archive.folder);

    let mut session = loaded.session();
    session.use_revision("published").unwrap();
    let hits: Vec<_> = session
        .query(&Expr::field("created").gt("2020-06-01"), &QueryOptions::new())
        .unwrap()
        .collect();
    assert_eq!(hits, vec![archive.b]);
    let items = session.backreferences(archive.folder, "items").unwrap();
    assert_eq!(items.len(), 2);
    let hits = session
        .query(&Expr::field(TEXT_INDEX).contains("maintenance"), &QueryOptions::new())
        .unwrap()
        .total();
    assert_eq!(hits, 1);
}

#[test]
fn loaded_store_accepts_new_commits() {
    let (store, archive) = scenarios::published_archive();
    let mut bytes = Vec::new();
    store.save(&mut bytes).unwrap();

    let loaded = Store::load(document_registry(), StoreConfig::default(), bytes.as_slice()).unwrap();
    let mut session = loaded.session();
    session.set(archive.b, "status", "final").unwrap();
    assert_eq!(session.commit().unwrap(), RevisionId::new(3));
    let b = loaded.resolve(RevisionId::new(3), archive.b).unwrap();
    assert_eq!(b.get("status").unwrap(), &Value::from("final"));
}

#[test]
fn snapshot_carries_its_registry() {
    let (store, _) = scenarios::published_archive();
    let state = TempState::new();
    store.save_to_path(&state.path()).unwrap();

    let snapshot = Snapshot::read(File::open(state.path()).unwrap()).unwrap();
    assert_eq!(snapshot.revision_count(), 3);
    let registry = snapshot.registry().unwrap();
    let loaded = Store::from_snapshot(registry, StoreConfig::default(), snapshot).unwrap();
    let names = |store: &Store| {
        store
            .index_definitions()
            .into_iter()
            .map(|d| d.name)
            .collect::<BTreeSet<_>>()
    };
    assert_eq!(names(&loaded), names(&store));
}

#[test]
fn forgotten_revisions_stay_forgotten_after_reload() {
    let (store, ids) = scenarios::populated_store(4);
    store.forget_revisions(RevisionId::new(2)).unwrap();
    let mut bytes = Vec::new();
    store.save(&mut bytes).unwrap();

    let loaded = Store::load(document_registry(), StoreConfig::default(), bytes.as_slice()).unwrap();
    assert_eq!(loaded.oldest_revision(), RevisionId::new(2));
    assert!(matches!(
        loaded.resolve(RevisionId::new(1), ids[0]),
        Err(CoreError::NotFound { .. })
    ));
    assert!(loaded.resolve(RevisionId::new(2), ids[0]).is_ok());
}
