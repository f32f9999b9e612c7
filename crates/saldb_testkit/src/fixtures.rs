//! Test fixtures and store helpers.
//!
//! Provides a small document model shared by the integration tests:
//!
//! ```text
//! Document = Dublin + Body        Folder = Folder
//!   Dublin.title   text             name   text, required
//!   Dublin.created date
//!   Dublin.status  text = "draft"
//!   Body.title     text
//!   Body.text      text
//!   Body.folder    -> Folder  (backref "items", ordered by created)
//! ```
//!
//! Indexes: `created` (ordered), `status` (hash), `Body.text` (text).

use chrono::NaiveDate;
use saldb_core::{
    CoreResult, IndexKind, IndexSpec, ObjectId, Registry, Schema, SchemaField, Session, Store,
    StoreConfig, TypeDef, ValueKind,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Name of the text index over `Body.text`.
pub const TEXT_INDEX: &str = "Body.text";

/// Builds the reference registry with its indexes declared.
pub fn document_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register_schema(
            Schema::new("Dublin")
                .field(SchemaField::new("title", ValueKind::Text))
                .field(SchemaField::new("created", ValueKind::Date))
                .field(SchemaField::new("status", ValueKind::Text).default_value("draft")),
        )
        .expect("Dublin schema");
    registry
        .register_schema(
            Schema::new("Body")
                .field(SchemaField::new("title", ValueKind::Text))
                .field(SchemaField::new("text", ValueKind::Text))
                .field(
                    SchemaField::reference("folder", "Folder")
                        .backref("items")
                        .order_by("created"),
                ),
        )
        .expect("Body schema");
    registry
        .register_schema(
            Schema::new("Folder").field(SchemaField::new("name", ValueKind::Text).required()),
        )
        .expect("Folder schema");
    registry
        .register_type("Document", TypeDef::new(["Dublin", "Body"]))
        .expect("Document type");
    registry
        .register_type("Folder", TypeDef::new(["Folder"]))
        .expect("Folder type");
    registry
        .register_index(IndexSpec::field("created"))
        .expect("created index");
    registry
        .register_index(IndexSpec::field("status").kind(IndexKind::Hash))
        .expect("status index");
    registry
        .register_index(IndexSpec::field(TEXT_INDEX).kind(IndexKind::Text))
        .expect("text index");
    registry
}

/// Opens an empty store over the reference registry.
pub fn document_store() -> Arc<Store> {
    document_store_with(StoreConfig::default())
}

/// Opens an empty store over the reference registry with `config`.
pub fn document_store_with(config: StoreConfig) -> Arc<Store> {
    Store::open(document_registry(), config).expect("Failed to open store")
}

/// Shorthand for a calendar date.
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

/// Creates, fills and attaches a document.
pub fn new_document(
    session: &mut Session,
    title: &str,
    created: NaiveDate,
) -> CoreResult<ObjectId> {
    let id = session.create("Document")?;
    session.set_in(id, "Dublin", "title", title)?;
    session.set(id, "created", created)?;
    session.add(id)?;
    Ok(id)
}

/// Creates and attaches a folder.
pub fn new_folder(session: &mut Session, name: &str) -> CoreResult<ObjectId> {
    let id = session.create("Folder")?;
    session.set(id, "name", name)?;
    session.add(id)?;
    Ok(id)
}

/// A temporary directory holding a state file.
pub struct TempState {
    dir: TempDir,
}

impl TempState {
    /// Creates an empty temporary directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Path of the state file inside the directory.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("state.saldb")
    }
}

impl Default for TempState {
    fn default() -> Self {
        Self::new()
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Handles to the objects of [`published_archive`].
    #[derive(Debug, Clone, Copy)]
    pub struct Archive {
        /// Created 2020-01-01.
        pub a: ObjectId,
        /// Created 2021-01-01.
        pub b: ObjectId,
        /// Folder holding both documents.
        pub folder: ObjectId,
    }

    /// Builds a store with two documents in one folder, committed as
    /// revision 1 and tagged `published` by revision 2.
    pub fn published_archive() -> (Arc<Store>, Archive) {
        let store = document_store();
        let mut session = store.session();
        let folder = new_folder(&mut session, "archive").expect("folder");
        let a = new_document(&mut session, "First", date(2020, 1, 1)).expect("a");
        let b = new_document(&mut session, "Second", date(2021, 1, 1)).expect("b");
        session.set(a, "folder", folder).expect("link a");
        session.set(b, "folder", folder).expect("link b");
        session.set(a, "text", "Revision history of the archive").expect("text a");
        session.set(b, "text", "Index maintenance notes").expect("text b");
        let first = session.commit().expect("commit");
        session.tag("published", first).expect("tag");
        (store, Archive { a, b, folder })
    }

    /// Builds a store holding `count` documents, one per commit.
    pub fn populated_store(count: usize) -> (Arc<Store>, Vec<ObjectId>) {
        let store = document_store();
        let mut session = store.session();
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let created = date(2000, 1, 1) + chrono::Days::new(i as u64);
            let id = new_document(&mut session, &format!("doc-{i}"), created).expect("document");
            session.commit().expect("commit");
            ids.push(id);
        }
        (store, ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saldb_core::{RevisionId, Value};

    #[test]
    fn registry_initializes() {
        let store = document_store();
        let names: Vec<String> = store
            .index_definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        for name in ["created", "status", TEXT_INDEX] {
            assert!(names.iter().any(|n| n == name), "missing {name}");
        }
    }

    #[test]
    fn archive_scenario_layout() {
        let (store, archive) = scenarios::published_archive();
        assert_eq!(store.current_revision(), RevisionId::new(2));
        assert_eq!(store.resolve_tag("published").unwrap(), RevisionId::new(1));
        let a = store.resolve(RevisionId::new(1), archive.a).unwrap();
        assert_eq!(a.get("status").unwrap(), &Value::from("draft"));
    }

    #[test]
    fn populated_store_commits_each_document() {
        let (store, ids) = scenarios::populated_store(5);
        assert_eq!(ids.len(), 5);
        assert_eq!(store.current_revision(), RevisionId::new(5));
    }
}
