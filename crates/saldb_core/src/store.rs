//! Store facade: shared revision, object and index state.

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexDefinition, IndexKey, IndexManager, IndexSpec, BACKREF_PREFIX, PATH_INDEX};
use crate::object::{ObjectGraph, ObjectId, PersistentObject, Version};
use crate::query::{Expr, QueryEngine, QueryOptions, QueryResult};
use crate::revision::{Delta, RevisionMeta, RevisionStore};
use crate::schema::Registry;
use crate::stats::StoreStats;
use crate::transaction::Session;
use crate::types::{RevisionId, RevisionRef};
use crate::value::Value;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Everything a commit changes, guarded by one lock.
#[derive(Debug)]
pub(crate) struct StoreState {
    pub(crate) revisions: RevisionStore,
    pub(crate) graph: ObjectGraph,
    pub(crate) indexes: IndexManager,
}

/// A staged transaction handed to [`Store::commit`].
#[derive(Debug, Default)]
pub(crate) struct CommitRequest {
    pub parent: RevisionId,
    pub objects: BTreeMap<ObjectId, Option<PersistentObject>>,
    pub tags: Vec<(String, Option<RevisionId>)>,
    pub user: Option<String>,
    pub note: Option<String>,
}

/// The revisioned object store.
///
/// `Store` owns the revision table, the copy-on-write object graph and every
/// index. It is shared between threads behind an `Arc`; each thread works
/// through its own [`Session`].
///
/// # Concurrency
///
/// Commits, rollbacks, forgets and index changes are serialized by a commit
/// mutex. A commit validates its changes under the shared read lock and
/// publishes them under a brief write lock, so readers of any revision are
/// held off only while a finished commit is installed.
///
/// # Example
///
/// ```rust,ignore
/// let store = Store::open(registry, StoreConfig::default())?;
/// let mut session = store.session();
/// let doc = session.create("Document")?;
/// session.set(doc, "title", "Hello")?;
/// session.add(doc)?;
/// let rev = session.commit()?;
/// ```
pub struct Store {
    registry: Arc<Registry>,
    config: StoreConfig,
    state: RwLock<StoreState>,
    commit_lock: Mutex<()>,
    stats: StoreStats,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("latest", &self.current_revision())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Opens an empty store holding only revision 0.
    ///
    /// The registry is initialized if it was not already.
    ///
    /// # Errors
    ///
    /// Any error registry initialization raises.
    pub fn open(mut registry: Registry, config: StoreConfig) -> CoreResult<Arc<Self>> {
        registry.initialize()?;
        let indexes = IndexManager::new(registry.index_specs()?, config.tokenizer.clone());
        let state = StoreState {
            revisions: RevisionStore::new(),
            graph: ObjectGraph::new(),
            indexes,
        };
        Ok(Arc::new(Self::from_state(Arc::new(registry), config, state)))
    }

    pub(crate) fn from_state(registry: Arc<Registry>, config: StoreConfig, state: StoreState) -> Self {
        Self {
            registry,
            config,
            state: RwLock::new(state),
            commit_lock: Mutex::new(()),
            stats: StoreStats::new(),
        }
    }

    /// Opens a new session based on the latest revision.
    pub fn session(self: &Arc<Self>) -> Session {
        Session::new(Arc::clone(self))
    }

    /// Returns the schema registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the store statistics.
    #[must_use]
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    pub(crate) fn read_state(&self) -> parking_lot::RwLockReadGuard<'_, StoreState> {
        self.state.read()
    }

    // ========================================================================
    // Revisions and tags
    // ========================================================================

    /// Returns the latest committed revision id.
    #[must_use]
    pub fn current_revision(&self) -> RevisionId {
        self.state.read().revisions.latest()
    }

    /// Returns the oldest addressable revision id.
    #[must_use]
    pub fn oldest_revision(&self) -> RevisionId {
        self.state.read().revisions.floor()
    }

    /// Resolves a revision id or tag to an addressable revision.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown tags and forgotten or future revision ids.
    pub fn resolve_revision(&self, target: &RevisionRef) -> CoreResult<RevisionId> {
        self.state.read().revisions.resolve(target)
    }

    /// Resolves a tag to its revision id.
    pub fn resolve_tag(&self, name: &str) -> CoreResult<RevisionId> {
        self.state.read().revisions.resolve_tag(name)
    }

    /// Returns the tag table.
    #[must_use]
    pub fn tags(&self) -> BTreeMap<String, RevisionId> {
        self.state.read().revisions.tags().clone()
    }

    /// Returns the metadata of every addressable revision, oldest first.
    #[must_use]
    pub fn revision_log(&self) -> Vec<RevisionMeta> {
        self.state.read().revisions.log()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Resolves object `id` as of revision `at`.
    ///
    /// # Errors
    ///
    /// `NotFound` if `at` is not addressable or the object is absent there.
    pub fn resolve(&self, at: RevisionId, id: ObjectId) -> CoreResult<Arc<PersistentObject>> {
        let state = self.state.read();
        state.revisions.get(at)?;
        state.graph.resolve(at, id)
    }

    /// Returns the objects that reference `id` through fields declaring
    /// backreference `name`, as of revision `at`.
    ///
    /// Results are sorted by the backreference's ordering field, objects
    /// without a value last, ties by id.
    pub fn backreferences(
        &self,
        at: RevisionId,
        id: ObjectId,
        name: &str,
    ) -> CoreResult<Vec<Arc<PersistentObject>>> {
        let order_by = self.registry.backref_order(name)?;
        let state = self.state.read();
        state.revisions.get(at)?;
        let ids = state.indexes.lookup(
            &format!("{BACKREF_PREFIX}{name}"),
            &IndexKey::Reference(id),
            at,
        )?;
        Ok(state.graph.ordered(at, ids, order_by))
    }

    /// Returns the object at traversal path `path` as of revision `at`.
    ///
    /// # Errors
    ///
    /// `NotFound` if no object holds the path.
    pub fn lookup_path(&self, at: RevisionId, path: &str) -> CoreResult<ObjectId> {
        let state = self.state.read();
        state.revisions.get(at)?;
        state
            .indexes
            .lookup(PATH_INDEX, &IndexKey::Text(path.to_string()), at)?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::not_found(format!("path `{path}` at {at}")))
    }

    /// Evaluates `expr` against revision `at`.
    pub fn query(
        &self,
        at: RevisionId,
        expr: &Expr,
        options: &QueryOptions,
    ) -> CoreResult<QueryResult> {
        let state = self.state.read();
        state.revisions.get(at)?;
        let engine = QueryEngine::new(
            &self.registry,
            &state.indexes,
            &state.graph,
            &self.config.tokenizer,
            at,
        )
        .allow_full_scans(self.config.allow_full_scans);
        self.stats.record_query();
        let result = engine.evaluate(expr, options);
        for _ in 0..engine.scans() {
            self.stats.record_scan();
        }
        result
    }

    // ========================================================================
    // Indexes
    // ========================================================================

    /// Returns the definition of every index, internal ones excluded.
    #[must_use]
    pub fn index_definitions(&self) -> Vec<IndexDefinition> {
        self.state
            .read()
            .indexes
            .specs()
            .filter(|spec| !spec.is_internal())
            .map(IndexSpec::definition)
            .collect()
    }

    /// Adds an index and fills it from the retained history.
    ///
    /// # Errors
    ///
    /// `Validation` for a taken or reserved name or an unknown field;
    /// `AmbiguousField` for an unqualified field two constituents declare;
    /// `IndexTypeMismatch` if a stored value cannot be indexed.
    pub fn add_index(&self, spec: IndexSpec) -> CoreResult<()> {
        let spec = self.registry.prepare_index(spec)?;
        let _commit = self.commit_lock.lock();
        let mut guard = self.state.write();
        let state = &mut *guard;
        let name = spec.name().to_string();
        state
            .indexes
            .add_index(spec, &state.graph, state.revisions.history())?;
        info!(index = %name, "index added");
        Ok(())
    }

    /// Removes an index.
    ///
    /// # Errors
    ///
    /// `UnknownIndex` if absent, `InvalidState` for built-in indexes.
    pub fn drop_index(&self, name: &str) -> CoreResult<()> {
        let _commit = self.commit_lock.lock();
        self.state.write().indexes.drop_index(name)?;
        info!(index = %name, "index dropped");
        Ok(())
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Validates and publishes a staged transaction as the next revision.
    pub(crate) fn commit(&self, request: CommitRequest) -> CoreResult<RevisionId> {
        let _commit = self.commit_lock.lock();

        let (next, changes, updates, delta) = {
            let state = self.state.read();
            if let Err(err) = state.revisions.check_parent(request.parent) {
                self.stats.record_conflict();
                return Err(err);
            }
            let next = request.parent.next();

            let mut changes: BTreeMap<ObjectId, Version> = BTreeMap::new();
            for (id, object) in request.objects {
                let version = object.map(|mut object| {
                    object.stamp(next);
                    Arc::new(object)
                });
                changes.insert(id, version);
            }
            self.check_objects(&state, request.parent, &changes)?;
            let updates = state
                .indexes
                .compute_updates(&state.graph, Some(request.parent), &changes)?;

            let mut delta = Delta::new();
            for (name, target) in request.tags {
                let change = state.revisions.tag_change(&name, target)?;
                delta.tags.insert(name, change);
            }
            delta.objects.clone_from(&changes);
            (next, changes, updates, delta)
        };

        let mut state = self.state.write();
        for (id, version) in changes {
            state.graph.put(next, id, version);
        }
        state.indexes.apply(next, &updates);
        let objects = delta.objects.len();
        let tags = delta.tags.len();
        let user = request.user.or_else(|| self.config.default_user.clone());
        let id = state
            .revisions
            .commit(request.parent, delta, user, request.note)?;
        drop(state);

        self.stats.record_commit(updates.len());
        debug!(
            revision = id.as_u64(),
            objects,
            tags,
            index_updates = updates.len(),
            "revision committed"
        );
        Ok(id)
    }

    /// Checks required fields and reference targets of every new version.
    fn check_objects(
        &self,
        state: &StoreState,
        parent: RevisionId,
        changes: &BTreeMap<ObjectId, Version>,
    ) -> CoreResult<()> {
        let live = |id: ObjectId| -> Option<Arc<PersistentObject>> {
            match changes.get(&id) {
                Some(version) => version.clone(),
                None => state.graph.try_resolve(parent, id),
            }
        };

        for object in changes.values().flatten() {
            let ty = object.resolved_type();
            for slot in ty.slots().iter().filter(|s| s.field.required) {
                if object.value(&slot.field_ref()).map_or(true, Value::is_null) {
                    return Err(CoreError::validation(format!(
                        "object {} lacks required field `{}`",
                        object.id(),
                        slot.field_ref()
                    )));
                }
            }

            for (key, value) in object.values() {
                let mut targets = Vec::new();
                value.references(&mut targets);
                let relationship = ty.slot(key).and_then(|s| s.field.relationship.as_ref());
                for target in targets {
                    let Some(referenced) = live(target) else {
                        return Err(CoreError::validation(format!(
                            "object {} references missing object {target} through `{key}`",
                            object.id()
                        )));
                    };
                    if let Some(rel) = relationship {
                        if referenced.type_name() != rel.target && !referenced.implements(&rel.target)
                        {
                            return Err(CoreError::validation(format!(
                                "`{key}` must reference a {}, not a {}",
                                rel.target,
                                referenced.type_name()
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Removes the latest revision, returning the new latest id.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the latest revision has no parent.
    pub fn roll_back(&self) -> CoreResult<RevisionId> {
        let _commit = self.commit_lock.lock();
        let mut state = self.state.write();
        let revision = state.revisions.roll_back()?;
        let removed = revision.id();
        state.graph.undo(removed, revision.delta.objects.keys());
        state.indexes.undo(removed);
        let latest = state.revisions.latest();
        drop(state);

        self.stats.record_rollback();
        debug!(
            removed = removed.as_u64(),
            latest = latest.as_u64(),
            "revision rolled back"
        );
        Ok(latest)
    }

    /// Forgets every revision older than `cutoff`.
    ///
    /// The state of every retained revision is unchanged; forgotten ids
    /// resolve `NotFound` afterwards. Returns the number of revisions
    /// dropped.
    ///
    /// # Errors
    ///
    /// `InvalidState` if `cutoff` is past the latest revision or a tag
    /// targets a revision that would be forgotten.
    pub fn forget_revisions(&self, cutoff: RevisionId) -> CoreResult<usize> {
        let _commit = self.commit_lock.lock();
        let mut state = self.state.write();
        state.revisions.check_forget(cutoff)?;
        if cutoff <= state.revisions.floor() {
            return Ok(0);
        }
        let carried = state.graph.compact(cutoff);
        state.indexes.compact(cutoff);
        let carried_objects = carried.len();
        let dropped = state.revisions.forget(cutoff, carried)?;
        drop(state);

        self.stats.record_forget(dropped);
        info!(
            cutoff = cutoff.as_u64(),
            dropped,
            carried = carried_objects,
            "revisions forgotten"
        );
        Ok(dropped)
    }

    /// Returns the ids live at `at` among `ids`.
    pub(crate) fn live_among(
        &self,
        at: RevisionId,
        ids: impl IntoIterator<Item = ObjectId>,
    ) -> BTreeSet<ObjectId> {
        let state = self.state.read();
        ids.into_iter()
            .filter(|id| state.graph.try_resolve(at, *id).is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexKind;
    use crate::schema::{Schema, SchemaField, TypeDef};
    use crate::value::ValueKind;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register_schema(
                Schema::new("Note")
                    .field(SchemaField::new("title", ValueKind::Text).required())
                    .field(SchemaField::new("rank", ValueKind::Integer))
                    .field(SchemaField::reference("parent", "Folder").backref("notes").order_by("rank")),
            )
            .unwrap();
        registry
            .register_schema(Schema::new("Folder").field(SchemaField::new("name", ValueKind::Text)))
            .unwrap();
        registry.register_type("Note", TypeDef::new(["Note"])).unwrap();
        registry.register_type("Folder", TypeDef::new(["Folder"])).unwrap();
        registry.register_index(IndexSpec::field("rank")).unwrap();
        registry
    }

    fn object(store: &Store, ty: &str, fields: &[(&str, Value)]) -> PersistentObject {
        let ty = store.registry().type_def(ty).unwrap();
        let mut object = PersistentObject::new(ObjectId::new(), Arc::clone(&ty));
        for (name, value) in fields {
            let slot = ty.resolve_field(name).unwrap();
            object.set(slot.field_ref(), value.clone());
        }
        object
    }

    fn commit(store: &Store, objects: Vec<PersistentObject>) -> CoreResult<RevisionId> {
        store.commit(CommitRequest {
            parent: store.current_revision(),
            objects: objects.into_iter().map(|o| (o.id(), Some(o))).collect(),
            ..CommitRequest::default()
        })
    }

    #[test]
    fn commit_assigns_serial_ids() {
        let store = Store::open(registry(), StoreConfig::default()).unwrap();
        for n in 1..=3 {
            let note = object(&store, "Note", &[("title", "n".into())]);
            assert_eq!(commit(&store, vec![note]).unwrap(), RevisionId::new(n));
        }
        assert_eq!(store.stats().commits(), 3);
        assert_eq!(store.revision_log().len(), 4);
    }

    #[test]
    fn stale_parent_conflicts() {
        let store = Store::open(registry(), StoreConfig::default()).unwrap();
        let note = object(&store, "Note", &[("title", "a".into())]);
        commit(&store, vec![note]).unwrap();

        let err = store
            .commit(CommitRequest {
                parent: RevisionId::ROOT,
                ..CommitRequest::default()
            })
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.stats().conflicts(), 1);
        assert_eq!(store.current_revision(), RevisionId::new(1));
    }

    #[test]
    fn required_field_is_enforced() {
        let store = Store::open(registry(), StoreConfig::default()).unwrap();
        let note = object(&store, "Note", &[("rank", 1.into())]);
        assert!(matches!(
            commit(&store, vec![note]),
            Err(CoreError::Validation { .. })
        ));
        assert_eq!(store.current_revision(), RevisionId::ROOT);
    }

    #[test]
    fn references_must_hit_live_objects_of_the_target_type() {
        let store = Store::open(registry(), StoreConfig::default()).unwrap();
        let other = object(&store, "Note", &[("title", "x".into())]);
        let dangling = object(
            &store,
            "Note",
            &[("title", "a".into()), ("parent", ObjectId::new().into())],
        );
        assert!(matches!(
            commit(&store, vec![dangling]),
            Err(CoreError::Validation { .. })
        ));

        let wrong = object(
            &store,
            "Note",
            &[("title", "a".into()), ("parent", other.id().into())],
        );
        assert!(matches!(
            commit(&store, vec![other, wrong]),
            Err(CoreError::Validation { .. })
        ));
    }

    #[test]
    fn backreferences_follow_forward_links() {
        let store = Store::open(registry(), StoreConfig::default()).unwrap();
        let folder = object(&store, "Folder", &[("name", "inbox".into())]);
        let fid = folder.id();
        let b = object(
            &store,
            "Note",
            &[("title", "b".into()), ("rank", 2.into()), ("parent", fid.into())],
        );
        let a = object(
            &store,
            "Note",
            &[("title", "a".into()), ("rank", 1.into()), ("parent", fid.into())],
        );
        let (aid, bid) = (a.id(), b.id());
        let rev = commit(&store, vec![folder, b, a]).unwrap();

        let notes: Vec<ObjectId> = store
            .backreferences(rev, fid, "notes")
            .unwrap()
            .iter()
            .map(|o| o.id())
            .collect();
        assert_eq!(notes, vec![aid, bid]);

        let removed = store
            .commit(CommitRequest {
                parent: rev,
                objects: BTreeMap::from([(aid, None)]),
                ..CommitRequest::default()
            })
            .unwrap();
        assert_eq!(store.backreferences(removed, fid, "notes").unwrap().len(), 1);
        assert_eq!(store.backreferences(rev, fid, "notes").unwrap().len(), 2);
        assert!(matches!(
            store.backreferences(rev, fid, "unknown"),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn roll_back_restores_previous_state() {
        let store = Store::open(registry(), StoreConfig::default()).unwrap();
        let note = object(&store, "Note", &[("title", "a".into()), ("rank", 1.into())]);
        let id = note.id();
        let first = commit(&store, vec![note]).unwrap();

        let mut changed = (*store.resolve(first, id).unwrap()).clone();
        changed.set(crate::schema::FieldRef::new("Note", "rank"), 9.into());
        commit(&store, vec![changed]).unwrap();

        assert_eq!(store.roll_back().unwrap(), first);
        assert_eq!(store.current_revision(), first);
        assert_eq!(store.revision_log().len(), 2);
        let hits = store
            .query(first, &Expr::field("rank").eq(1), &QueryOptions::new())
            .unwrap();
        assert_eq!(hits.total(), 1);

        store.roll_back().unwrap();
        assert!(matches!(store.roll_back(), Err(CoreError::InvalidState { .. })));
    }

    #[test]
    fn forget_keeps_retained_state() {
        let store = Store::open(registry(), StoreConfig::default()).unwrap();
        let note = object(&store, "Note", &[("title", "a".into()), ("rank", 1.into())]);
        let id = note.id();
        commit(&store, vec![note]).unwrap();
        let other = object(&store, "Note", &[("title", "b".into()), ("rank", 5.into())]);
        commit(&store, vec![other]).unwrap();
        let latest = store.current_revision();

        let expr = Expr::field("rank").gte(0);
        let before: Vec<_> = store.query(latest, &expr, &QueryOptions::new()).unwrap().collect();
        assert_eq!(store.forget_revisions(latest).unwrap(), 2);
        let after: Vec<_> = store.query(latest, &expr, &QueryOptions::new()).unwrap().collect();
        assert_eq!(before, after);

        assert_eq!(store.resolve(latest, id).unwrap().revision(), latest);
        assert!(matches!(
            store.resolve(RevisionId::new(1), id),
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(store.roll_back(), Err(CoreError::InvalidState { .. })));
    }

    #[test]
    fn add_and_drop_index() {
        let store = Store::open(registry(), StoreConfig::default()).unwrap();
        let note = object(&store, "Note", &[("title", "Red fox".into())]);
        commit(&store, vec![note]).unwrap();

        store
            .add_index(IndexSpec::field("title").kind(IndexKind::Text))
            .unwrap();
        let hits = store
            .query(
                store.current_revision(),
                &Expr::field("title").contains("fox"),
                &QueryOptions::new(),
            )
            .unwrap();
        assert_eq!(hits.total(), 1);
        assert!(store.index_definitions().iter().any(|d| d.name == "title"));

        store.drop_index("title").unwrap();
        assert!(matches!(store.drop_index("type"), Err(CoreError::InvalidState { .. })));
    }

    #[test]
    fn lookup_path_finds_unique_holder() {
        let store = Store::open(registry(), StoreConfig::default()).unwrap();
        let mut folder = object(&store, "Folder", &[("name", "root".into())]);
        folder.set_path(Some("/root".into()));
        let fid = folder.id();
        let rev = commit(&store, vec![folder]).unwrap();
        assert_eq!(store.lookup_path(rev, "/root").unwrap(), fid);
        assert!(matches!(
            store.lookup_path(RevisionId::ROOT, "/root"),
            Err(CoreError::NotFound { .. })
        ));
    }
}
