//! Staged changes of a session.

use crate::object::{ObjectId, PersistentObject};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A staged change to one object.
#[derive(Debug, Clone)]
pub(crate) enum Staged {
    /// Insert or update.
    Put(Arc<PersistentObject>),
    /// Remove.
    Remove,
}

/// Working set of a session, keyed by object id.
///
/// Objects created by a session start out detached: they are staged but
/// only persisted once added explicitly or reached through a reference from
/// an attached object.
#[derive(Debug, Default)]
pub(crate) struct ChangeSet {
    staged: BTreeMap<ObjectId, Staged>,
    detached: BTreeSet<ObjectId>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn get(&self, id: &ObjectId) -> Option<&Staged> {
        self.staged.get(id)
    }

    pub fn is_detached(&self, id: &ObjectId) -> bool {
        self.detached.contains(id)
    }

    /// Stages a new, detached object.
    pub fn create(&mut self, object: PersistentObject) {
        let id = object.id();
        self.staged.insert(id, Staged::Put(Arc::new(object)));
        self.detached.insert(id);
    }

    /// Stages a new version of an already persisted object.
    pub fn put(&mut self, object: Arc<PersistentObject>) {
        self.staged.insert(object.id(), Staged::Put(object));
    }

    /// Returns a mutable staged object, cloning it out of shared storage if
    /// needed.
    pub fn object_mut(&mut self, id: &ObjectId) -> Option<&mut PersistentObject> {
        match self.staged.get_mut(id) {
            Some(Staged::Put(object)) => Some(Arc::make_mut(object)),
            _ => None,
        }
    }

    /// Stages removal of a persisted object.
    pub fn remove(&mut self, id: ObjectId) {
        self.detached.remove(&id);
        self.staged.insert(id, Staged::Remove);
    }

    /// Forgets whatever is staged for `id`.
    pub fn unstage(&mut self, id: &ObjectId) {
        self.staged.remove(id);
        self.detached.remove(id);
    }

    /// Attaches `id` and every detached object reachable from it.
    pub fn attach(&mut self, id: ObjectId) {
        self.detached.remove(&id);
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(Staged::Put(object)) = self.staged.get(&next) {
                for target in object.references() {
                    if self.detached.remove(&target) {
                        pending.push(target);
                    }
                }
            }
        }
    }

    /// Returns the changes to commit: every attached change plus every
    /// detached object reachable from an attached one. Unreached detached
    /// objects are left out.
    pub fn resolve_for_commit(&self) -> BTreeMap<ObjectId, Option<PersistentObject>> {
        let mut reached: BTreeSet<ObjectId> = BTreeSet::new();
        let mut pending: Vec<ObjectId> = self
            .staged
            .keys()
            .filter(|id| !self.detached.contains(id))
            .copied()
            .collect();
        while let Some(id) = pending.pop() {
            if let Some(Staged::Put(object)) = self.staged.get(&id) {
                for target in object.references() {
                    if self.detached.contains(&target) && reached.insert(target) {
                        pending.push(target);
                    }
                }
            }
        }

        self.staged
            .iter()
            .filter(|(id, _)| !self.detached.contains(id) || reached.contains(id))
            .map(|(id, staged)| {
                let version = match staged {
                    Staged::Put(object) => Some(PersistentObject::clone(object)),
                    Staged::Remove => None,
                };
                (*id, version)
            })
            .collect()
    }

    /// Returns the ids of staged, attached changes.
    pub fn attached_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.staged
            .keys()
            .filter(|id| !self.detached.contains(id))
            .copied()
    }

    /// Unstages the committed `ids`, keeping unreached detached objects.
    pub fn mark_committed(&mut self, ids: impl IntoIterator<Item = ObjectId>) {
        for id in ids {
            self.unstage(&id);
        }
    }

    pub fn clear(&mut self) {
        self.staged.clear();
        self.detached.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldRef, Registry, ResolvedType, Schema, SchemaField, TypeDef};

    fn node_type() -> Arc<ResolvedType> {
        let mut registry = Registry::new();
        registry
            .register_schema(Schema::new("Node").field(SchemaField::reference("next", "Node")))
            .unwrap();
        registry.register_type("Node", TypeDef::new(["Node"])).unwrap();
        registry.initialize().unwrap();
        registry.type_def("Node").unwrap()
    }

    fn node(ty: &Arc<ResolvedType>, next: Option<ObjectId>) -> PersistentObject {
        let mut object = PersistentObject::new(ObjectId::new(), Arc::clone(ty));
        object.set(FieldRef::new("Node", "next"), next.into());
        object
    }

    #[test]
    fn attach_cascades_through_references() {
        let ty = node_type();
        let c = node(&ty, None);
        let b = node(&ty, Some(c.id()));
        let a = node(&ty, Some(b.id()));
        let stray = node(&ty, None);
        let (aid, bid, cid, sid) = (a.id(), b.id(), c.id(), stray.id());

        let mut changes = ChangeSet::new();
        for object in [a, b, c, stray] {
            changes.create(object);
        }
        changes.attach(aid);
        assert!(!changes.is_detached(&aid));
        assert!(!changes.is_detached(&bid));
        assert!(!changes.is_detached(&cid));
        assert!(changes.is_detached(&sid));

        let commit = changes.resolve_for_commit();
        assert_eq!(commit.len(), 3);
        assert!(!commit.contains_key(&sid));
    }

    #[test]
    fn late_references_are_reached_at_commit() {
        let ty = node_type();
        let a = node(&ty, None);
        let b = node(&ty, None);
        let (aid, bid) = (a.id(), b.id());

        let mut changes = ChangeSet::new();
        changes.create(a);
        changes.create(b);
        changes.attach(aid);
        changes
            .object_mut(&aid)
            .unwrap()
            .set(FieldRef::new("Node", "next"), bid.into());

        let commit = changes.resolve_for_commit();
        assert!(commit.contains_key(&bid));
    }

    #[test]
    fn unstage_and_remove() {
        let ty = node_type();
        let a = node(&ty, None);
        let aid = a.id();
        let mut changes = ChangeSet::new();
        changes.create(a);
        changes.unstage(&aid);
        assert!(changes.is_empty());
        assert!(!changes.is_detached(&aid));

        let persisted = ObjectId::new();
        changes.remove(persisted);
        assert!(matches!(changes.get(&persisted), Some(Staged::Remove)));
        assert!(changes.resolve_for_commit()[&persisted].is_none());
    }

    #[test]
    fn committing_keeps_unreached_detached_objects() {
        let ty = node_type();
        let a = node(&ty, None);
        let stray = node(&ty, None);
        let (aid, sid) = (a.id(), stray.id());

        let mut changes = ChangeSet::new();
        changes.create(a);
        changes.create(stray);
        changes.attach(aid);
        let commit = changes.resolve_for_commit();
        changes.mark_committed(commit.into_keys());

        assert!(changes.get(&aid).is_none());
        assert!(matches!(changes.get(&sid), Some(Staged::Put(_))));
        assert!(changes.is_detached(&sid));
    }
}
