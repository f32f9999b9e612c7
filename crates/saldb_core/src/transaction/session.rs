//! Sessions: staged mutations against a pinned base revision.

use crate::config::ImmutabilityCheck;
use crate::error::{CoreError, CoreResult};
use crate::object::{ObjectId, PersistentObject};
use crate::query::{Expr, ObjectIter, QueryOptions, QueryResult};
use crate::revision::RevisionMeta;
use crate::store::{CommitRequest, Store};
use crate::transaction::change_set::{ChangeSet, Staged};
use crate::types::{RevisionId, RevisionRef};
use crate::value::Value;
use std::sync::Arc;
use tracing::debug;

/// A unit of work against a [`Store`].
///
/// A session is pinned to a base revision. While the base is the latest
/// revision the session is writable: mutations stage in a private working
/// set and [`Session::commit`] publishes them atomically as the next
/// revision. Pinning an older revision or a tag makes the session
/// read-only.
///
/// Sessions are single-threaded; concurrent work uses one session per
/// thread.
///
/// # Example
///
/// ```rust,ignore
/// let mut session = store.session();
/// let a = session.create("Document")?;
/// session.set(a, "created", date(2020, 1, 1))?;
/// session.add(a)?;
/// session.commit()?;
///
/// session.tag("published", session.base_revision())?;
/// session.use_revision("published")?;
/// assert!(!session.is_writable());
/// ```
#[derive(Debug)]
pub struct Session {
    store: Arc<Store>,
    base: RevisionId,
    writable: bool,
    changes: ChangeSet,
    user: Option<String>,
}

impl Session {
    pub(crate) fn new(store: Arc<Store>) -> Self {
        let base = store.current_revision();
        Self {
            store,
            base,
            writable: true,
            changes: ChangeSet::new(),
            user: None,
        }
    }

    /// Returns the store this session works on.
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    // ========================================================================
    // Pinning
    // ========================================================================

    /// Pins the session to a revision id or tag.
    ///
    /// The session is writable afterwards only if the target is the latest
    /// revision.
    ///
    /// # Errors
    ///
    /// `InvalidState` while changes are staged, `NotFound` for unknown or
    /// forgotten targets.
    pub fn use_revision(&mut self, target: impl Into<RevisionRef>) -> CoreResult<RevisionId> {
        if self.has_pending_changes() {
            return Err(CoreError::invalid_state(
                "cannot switch revisions while changes are staged",
            ));
        }
        let id = self.store.resolve_revision(&target.into())?;
        self.writable = id == self.store.current_revision();
        self.base = id;
        Ok(id)
    }

    /// Returns the latest revision of the store, wherever the session is
    /// pinned.
    #[must_use]
    pub fn current_revision(&self) -> RevisionId {
        self.store.current_revision()
    }

    /// Returns the revision the session reads from.
    #[must_use]
    pub fn base_revision(&self) -> RevisionId {
        self.base
    }

    /// Returns true if the session may stage and commit changes.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Returns true if changes are staged.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Sets the user recorded on this session's commits.
    pub fn set_user(&mut self, user: impl Into<String>) {
        self.user = Some(user.into());
    }

    /// Returns the user recorded on this session's commits.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    fn ensure_mutable(&self) -> CoreResult<()> {
        if !self.writable && self.store.config().immutability == ImmutabilityCheck::Eager {
            return Err(CoreError::ImmutableRevision {
                revision: self.base,
            });
        }
        Ok(())
    }

    fn ensure_writable(&self) -> CoreResult<()> {
        if !self.writable {
            return Err(CoreError::ImmutableRevision {
                revision: self.base,
            });
        }
        Ok(())
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Creates a detached object of type `type_name` with its defaults set.
    ///
    /// The object is persisted once passed to [`Session::add`] or reached
    /// through a reference from an added object; otherwise commit leaves it
    /// staged.
    pub fn create(&mut self, type_name: &str) -> CoreResult<ObjectId> {
        self.ensure_mutable()?;
        let registry = self.store.registry();
        let ty = registry.type_def(type_name)?;
        let mut object = PersistentObject::new(ObjectId::new(), Arc::clone(&ty));
        for slot in ty.slots() {
            if let Some(default) = &slot.field.default {
                let value = registry.validate_value(&slot.field, default.clone())?;
                object.set(slot.field_ref(), value);
            }
        }
        object.stamp(self.base);
        let id = object.id();
        self.changes.create(object);
        Ok(id)
    }

    /// Marks a created object, and every created object it references, for
    /// persistence.
    ///
    /// Adding an already persisted object is a no-op.
    pub fn add(&mut self, id: ObjectId) -> CoreResult<()> {
        self.ensure_mutable()?;
        match self.changes.get(&id) {
            Some(Staged::Put(_)) => {
                self.changes.attach(id);
                Ok(())
            }
            Some(Staged::Remove) => Err(CoreError::not_found(format!("object {id}"))),
            None => self.store.resolve(self.base, id).map(|_| ()),
        }
    }

    /// Sets an unqualified field.
    ///
    /// # Errors
    ///
    /// `AmbiguousField` if several constituent schemas declare `field`,
    /// `UnknownField` if none does, `Validation` if the value does not fit.
    pub fn set(&mut self, id: ObjectId, field: &str, value: impl Into<Value>) -> CoreResult<()> {
        self.assign(id, None, field, value.into())
    }

    /// Sets `field` as declared by `schema`.
    pub fn set_in(
        &mut self,
        id: ObjectId,
        schema: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> CoreResult<()> {
        self.assign(id, Some(schema), field, value.into())
    }

    fn assign(
        &mut self,
        id: ObjectId,
        schema: Option<&str>,
        field: &str,
        value: Value,
    ) -> CoreResult<()> {
        self.ensure_mutable()?;
        let current = self.get(id)?;
        let ty = current.resolved_type();
        let slot = match schema {
            Some(schema) => ty.resolve_qualified(schema, field)?,
            None => ty.resolve_field(field)?,
        };
        let value = self.store.registry().validate_value(&slot.field, value)?;
        let key = slot.field_ref();
        self.staged_mut(id)?.set(key, value);
        Ok(())
    }

    /// Assigns or clears the traversal path of an object.
    pub fn set_path(&mut self, id: ObjectId, path: Option<&str>) -> CoreResult<()> {
        self.ensure_mutable()?;
        if path.map_or(false, str::is_empty) {
            return Err(CoreError::validation("path is empty"));
        }
        self.staged_mut(id)?.set_path(path.map(str::to_string));
        Ok(())
    }

    /// Stages removal of an object.
    ///
    /// Removing a created object that was never committed simply unstages
    /// it.
    pub fn remove(&mut self, id: ObjectId) -> CoreResult<()> {
        self.ensure_mutable()?;
        let persisted = self.store.resolve(self.base, id).is_ok();
        match self.changes.get(&id) {
            Some(Staged::Remove) => {}
            Some(Staged::Put(_)) if !persisted => self.changes.unstage(&id),
            None if !persisted => return Err(CoreError::not_found(format!("object {id}"))),
            _ => self.changes.remove(id),
        }
        Ok(())
    }

    fn staged_mut(&mut self, id: ObjectId) -> CoreResult<&mut PersistentObject> {
        if self.changes.get(&id).is_none() {
            let committed = self.store.resolve(self.base, id)?;
            self.changes.put(committed);
        }
        self.changes
            .object_mut(&id)
            .ok_or_else(|| CoreError::not_found(format!("object {id}")))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Returns an object as this session sees it: staged version first,
    /// then the base revision.
    pub fn get(&self, id: ObjectId) -> CoreResult<Arc<PersistentObject>> {
        match self.changes.get(&id) {
            Some(Staged::Put(object)) => Ok(Arc::clone(object)),
            Some(Staged::Remove) => Err(CoreError::not_found(format!("object {id}"))),
            None => self.store.resolve(self.base, id),
        }
    }

    /// Returns the committed objects referencing `id` through backreference
    /// `name` at the base revision.
    pub fn backreferences(&self, id: ObjectId, name: &str) -> CoreResult<Vec<Arc<PersistentObject>>> {
        self.store.backreferences(self.base, id, name)
    }

    /// Evaluates `expr` against the base revision. Staged changes are not
    /// visible to queries.
    pub fn query(&self, expr: &Expr, options: &QueryOptions) -> CoreResult<QueryResult> {
        self.store.query(self.base, expr, options)
    }

    /// Evaluates `expr` and resolves matches lazily.
    pub fn query_objects(&self, expr: &Expr, options: &QueryOptions) -> CoreResult<ObjectIter<'_>> {
        Ok(self.query(expr, options)?.objects(&self.store, self.base))
    }

    /// Returns the object at traversal path `path` in the base revision.
    pub fn lookup_path(&self, path: &str) -> CoreResult<ObjectId> {
        self.store.lookup_path(self.base, path)
    }

    /// Returns the revision log of the store.
    #[must_use]
    pub fn revision_log(&self) -> Vec<RevisionMeta> {
        self.store.revision_log()
    }

    // ========================================================================
    // Commit and history
    // ========================================================================

    /// Commits staged changes as the next revision.
    ///
    /// With nothing to persist this returns the base revision unchanged.
    ///
    /// # Errors
    ///
    /// `Conflict` if another commit landed since the base revision; staged
    /// changes are kept so the caller can [`rebase`](Session::rebase) and
    /// retry. `ImmutableRevision` if the session is pinned to an older
    /// revision.
    pub fn commit(&mut self) -> CoreResult<RevisionId> {
        self.commit_inner(None)
    }

    /// Commits staged changes with a note.
    pub fn commit_with_note(&mut self, note: impl Into<String>) -> CoreResult<RevisionId> {
        self.commit_inner(Some(note.into()))
    }

    fn commit_inner(&mut self, note: Option<String>) -> CoreResult<RevisionId> {
        if self.changes.is_empty() {
            return Ok(self.base);
        }
        self.ensure_writable()?;
        let objects = self.changes.resolve_for_commit();
        if objects.is_empty() {
            return Ok(self.base);
        }
        let committed: Vec<ObjectId> = objects.keys().copied().collect();
        let id = self.store.commit(CommitRequest {
            parent: self.base,
            objects,
            tags: Vec::new(),
            user: self.user.clone(),
            note,
        })?;
        debug!(revision = id.as_u64(), objects = committed.len(), "session committed");
        self.changes.mark_committed(committed);
        self.base = id;
        Ok(id)
    }

    /// Re-pins a writable session to the latest revision, keeping staged
    /// changes.
    ///
    /// # Errors
    ///
    /// `InvalidState` for read-only sessions; `NotFound` if a staged change
    /// targets an object removed since the old base.
    pub fn rebase(&mut self) -> CoreResult<RevisionId> {
        if !self.writable {
            return Err(CoreError::invalid_state(
                "read-only session cannot rebase; use use_revision",
            ));
        }
        let latest = self.store.current_revision();
        if latest == self.base {
            return Ok(latest);
        }
        let touched: Vec<ObjectId> = self.changes.attached_ids().collect();
        let before = self.store.live_among(self.base, touched.iter().copied());
        let after = self.store.live_among(latest, touched);
        if let Some(gone) = before.difference(&after).next() {
            return Err(CoreError::not_found(format!(
                "object {gone} was removed at or before {latest}"
            )));
        }
        self.base = latest;
        Ok(latest)
    }

    /// Discards every staged change.
    pub fn discard(&mut self) {
        self.changes.clear();
    }

    /// Discards staged changes and removes the latest revision.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the session is read-only or the latest revision
    /// has no parent.
    pub fn roll_back(&mut self) -> CoreResult<RevisionId> {
        if !self.writable {
            return Err(CoreError::invalid_state(
                "roll back requires a session on the latest revision",
            ));
        }
        self.changes.clear();
        let latest = self.store.roll_back()?;
        self.base = latest;
        Ok(latest)
    }

    /// Points tag `name` at `target` in a new revision.
    pub fn tag(&mut self, name: &str, target: impl Into<RevisionRef>) -> CoreResult<RevisionId> {
        let target = self.store.resolve_revision(&target.into())?;
        let id = self.commit_tag(name, Some(target))?;
        debug!(tag = name, target = target.as_u64(), revision = id.as_u64(), "tag set");
        Ok(id)
    }

    /// Removes tag `name` in a new revision.
    pub fn remove_tag(&mut self, name: &str) -> CoreResult<RevisionId> {
        let id = self.commit_tag(name, None)?;
        debug!(tag = name, revision = id.as_u64(), "tag removed");
        Ok(id)
    }

    fn commit_tag(&mut self, name: &str, target: Option<RevisionId>) -> CoreResult<RevisionId> {
        self.ensure_writable()?;
        if self.has_pending_changes() {
            return Err(CoreError::invalid_state(
                "commit or discard staged changes before changing tags",
            ));
        }
        let id = self.store.commit(CommitRequest {
            parent: self.base,
            tags: vec![(name.to_string(), target)],
            user: self.user.clone(),
            ..CommitRequest::default()
        })?;
        self.base = id;
        Ok(id)
    }
}
