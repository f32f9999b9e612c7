//! End-to-end scenarios across sessions, indexes, queries and tags.

use saldb_core::{CoreError, Expr, IndexSpec, QueryOptions, RevisionId, StoreConfig, Value};
use saldb_testkit::prelude::*;
use std::collections::BTreeSet;

#[test]
fn created_after_query_and_published_pin() {
    let (store, archive) = scenarios::published_archive();
    let mut session = store.session();

    let created_after = Expr::field("created").gt("2020-06-01");
    let hits: Vec<_> = session.query(&created_after, &QueryOptions::new()).unwrap().collect();
    assert_eq!(hits, vec![archive.b]);

    session.set(archive.a, "created", date(2022, 3, 1)).unwrap();
    let rev = session.commit().unwrap();
    assert_eq!(rev, RevisionId::new(3));

    let hits: BTreeSet<_> = session.query(&created_after, &QueryOptions::new()).unwrap().collect();
    assert_eq!(hits, BTreeSet::from([archive.a, archive.b]));

    session.use_revision("published").unwrap();
    assert!(!session.is_writable());
    assert_eq!(
        session.get(archive.a).unwrap().get("created").unwrap(),
        &Value::Date(date(2020, 1, 1))
    );
    let hits: Vec<_> = session.query(&created_after, &QueryOptions::new()).unwrap().collect();
    assert_eq!(hits, vec![archive.b]);
    assert!(matches!(
        session.set(archive.a, "created", date(2023, 1, 1)),
        Err(CoreError::ImmutableRevision { .. })
    ));
}

#[test]
fn ordered_results_with_limit() {
    let (store, ids) = scenarios::populated_store(8);
    let session = store.session();

    let options = QueryOptions::new().order_by("created").reverse().limit(3);
    let result = session.query(&Expr::of_type("Document"), &options).unwrap();
    assert_eq!(result.total(), 8);
    let newest: Vec<_> = result.collect();
    assert_eq!(newest, vec![ids[7], ids[6], ids[5]]);
}

#[test]
fn text_and_status_combined() {
    let (store, archive) = scenarios::published_archive();
    let mut session = store.session();
    session.set(archive.b, "status", "final").unwrap();
    session.commit().unwrap();

    let drafts_about_history = Expr::field("status")
        .eq("draft")
        .and(Expr::field(TEXT_INDEX).contains("HISTORY"));
    let hits: Vec<_> = session
        .query(&drafts_about_history, &QueryOptions::new())
        .unwrap()
        .collect();
    assert_eq!(hits, vec![archive.a]);

    let either = Expr::field("status")
        .eq("final")
        .or(Expr::field(TEXT_INDEX).contains("archive revision"));
    assert_eq!(session.query(&either, &QueryOptions::new()).unwrap().total(), 2);

    assert!(matches!(
        session.query(&Expr::field("status").gt("a"), &QueryOptions::new()),
        Err(CoreError::TypeMismatch { .. })
    ));
}

#[test]
fn backreferences_follow_removals() {
    let (store, archive) = scenarios::published_archive();
    let mut session = store.session();

    let items: Vec<_> = session
        .backreferences(archive.folder, "items")
        .unwrap()
        .iter()
        .map(|o| o.id())
        .collect();
    assert_eq!(items, vec![archive.a, archive.b]);

    session.remove(archive.a).unwrap();
    session.commit().unwrap();
    let items = session.backreferences(archive.folder, "items").unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id(), archive.b);
    assert!(matches!(
        store.resolve(store.current_revision(), archive.a),
        Err(CoreError::NotFound { .. })
    ));

    session.use_revision("published").unwrap();
    assert_eq!(session.backreferences(archive.folder, "items").unwrap().len(), 2);
}

#[test]
fn cascade_persists_referenced_folder() {
    let store = document_store();
    let mut session = store.session();
    let folder = session.create("Folder").unwrap();
    session.set(folder, "name", "inbox").unwrap();
    let doc = new_document(&mut session, "Letter", date(2024, 5, 1)).unwrap();
    session.set(doc, "folder", folder).unwrap();
    let rev = session.commit().unwrap();

    assert_eq!(store.resolve(rev, folder).unwrap().get("name").unwrap(), &Value::from("inbox"));
}

#[test]
fn required_field_blocks_commit() {
    let store = document_store();
    let mut session = store.session();
    let folder = session.create("Folder").unwrap();
    session.add(folder).unwrap();
    assert!(matches!(session.commit(), Err(CoreError::Validation { .. })));
    assert_eq!(store.current_revision(), RevisionId::ROOT);
}

#[test]
fn rollback_restores_tags_and_values() {
    let (store, archive) = scenarios::published_archive();
    let mut session = store.session();

    session.tag("published", RevisionId::new(2)).unwrap();
    assert_eq!(store.resolve_tag("published").unwrap(), RevisionId::new(2));
    session.roll_back().unwrap();
    assert_eq!(store.resolve_tag("published").unwrap(), RevisionId::new(1));

    session.set_in(archive.a, "Dublin", "title", "Renamed").unwrap();
    session.commit().unwrap();
    session.roll_back().unwrap();
    let a = store.resolve(store.current_revision(), archive.a).unwrap();
    assert_eq!(a.get_qualified("Dublin", "title").unwrap(), &Value::from("First"));
    assert_eq!(store.stats().rollbacks(), 2);
}

#[test]
fn unindexed_field_needs_full_scans() {
    let store = document_store_with(StoreConfig::new().allow_full_scans(false));
    let mut session = store.session();
    new_document(&mut session, "Solo", date(2020, 1, 1)).unwrap();
    session.commit().unwrap();

    assert!(matches!(
        session.query(&Expr::field("Dublin.title").eq("Solo"), &QueryOptions::new()),
        Err(CoreError::UnknownIndex { .. })
    ));

    let scanning = document_store();
    let mut session = scanning.session();
    let id = new_document(&mut session, "Solo", date(2020, 1, 1)).unwrap();
    session.commit().unwrap();
    let hits: Vec<_> = session
        .query(&Expr::field("Dublin.title").eq("Solo"), &QueryOptions::new())
        .unwrap()
        .collect();
    assert_eq!(hits, vec![id]);
    assert_eq!(scanning.stats().scans(), 1);
}

#[test]
fn ambiguous_or_mistyped_fields_fail_on_empty_store() {
    let store = document_store();
    let at = store.current_revision();
    let opts = QueryOptions::new();

    assert!(matches!(
        store.query(at, &Expr::field("title").eq("Solo"), &opts),
        Err(CoreError::AmbiguousField { .. })
    ));
    assert!(matches!(
        store.query(at, &Expr::field("Dublin.title").gt(5), &opts),
        Err(CoreError::TypeMismatch { .. })
    ));
    assert!(matches!(
        store.query(at, &Expr::field("Dublin.created").contains("june"), &opts),
        Err(CoreError::TypeMismatch { .. })
    ));
    assert!(matches!(
        store.add_index(IndexSpec::field("title")),
        Err(CoreError::AmbiguousField { .. })
    ));
    store.add_index(IndexSpec::field("Dublin.title")).unwrap();
    assert_eq!(store.stats().scans(), 0);
}

#[test]
fn forget_keeps_retained_state() {
    let (store, ids) = scenarios::populated_store(6);
    let before: Vec<_> = (3..=6)
        .map(|r| {
            store
                .query(RevisionId::new(r), &Expr::of_type("Document"), &QueryOptions::new())
                .unwrap()
                .total()
        })
        .collect();

    let dropped = store.forget_revisions(RevisionId::new(3)).unwrap();
    assert_eq!(dropped, 3);
    assert_eq!(store.oldest_revision(), RevisionId::new(3));
    assert!(store.resolve(RevisionId::new(2), ids[0]).is_err());

    let after: Vec<_> = (3..=6)
        .map(|r| {
            store
                .query(RevisionId::new(r), &Expr::of_type("Document"), &QueryOptions::new())
                .unwrap()
                .total()
        })
        .collect();
    assert_eq!(before, after);
    assert!(store.resolve(RevisionId::new(3), ids[0]).is_ok());
}
