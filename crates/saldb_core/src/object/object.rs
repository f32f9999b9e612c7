//! Persistent object representation.

use crate::error::{CoreError, CoreResult};
use crate::object::view::SchemaView;
use crate::object::ObjectId;
use crate::schema::{FieldRef, ResolvedType};
use crate::types::RevisionId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

static NULL: Value = Value::Null;

/// A schema-typed object as of one revision.
///
/// Values are keyed by [`FieldRef`] so that same-named fields of different
/// constituent schemas never collide. Unqualified access through
/// [`PersistentObject::get`] fails with `AmbiguousField` when a name exists
/// in more than one constituent; use [`PersistentObject::adapt`] or
/// [`PersistentObject::get_qualified`] instead.
///
/// Objects handed out by the store are shared, immutable versions. Changes
/// go through a [`Session`](crate::Session).
#[derive(Debug, Clone)]
pub struct PersistentObject {
    id: ObjectId,
    ty: Arc<ResolvedType>,
    values: BTreeMap<FieldRef, Value>,
    path: Option<String>,
    revision: RevisionId,
}

impl PersistentObject {
    pub(crate) fn new(id: ObjectId, ty: Arc<ResolvedType>) -> Self {
        Self {
            id,
            ty,
            values: BTreeMap::new(),
            path: None,
            revision: RevisionId::ROOT,
        }
    }

    /// Returns the object id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Returns the name of the object's type.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.ty.name()
    }

    /// Returns the resolved type.
    #[must_use]
    pub fn resolved_type(&self) -> &Arc<ResolvedType> {
        &self.ty
    }

    /// Returns the revision that last changed this object.
    ///
    /// Staged objects report the revision their session is based on.
    #[must_use]
    pub fn revision(&self) -> RevisionId {
        self.revision
    }

    /// Returns the traversal path, if one is assigned.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Returns true if the object's type implements `schema`.
    #[must_use]
    pub fn implements(&self, schema: &str) -> bool {
        self.ty.implements(schema)
    }

    /// Reads an unqualified field. Unset fields read as `Null`.
    pub fn get(&self, field: &str) -> CoreResult<&Value> {
        let slot = self.ty.resolve_field(field)?;
        Ok(self.values.get(&slot.field_ref()).unwrap_or(&NULL))
    }

    /// Reads `field` as declared by `schema`.
    pub fn get_qualified(&self, schema: &str, field: &str) -> CoreResult<&Value> {
        let slot = self.ty.resolve_qualified(schema, field)?;
        Ok(self.values.get(&slot.field_ref()).unwrap_or(&NULL))
    }

    /// Narrows the object to the fields of one implemented schema.
    ///
    /// # Errors
    ///
    /// `Validation` if the type does not implement `schema`.
    pub fn adapt<'a>(&'a self, schema: &'a str) -> CoreResult<SchemaView<'a>> {
        if !self.implements(schema) {
            return Err(CoreError::validation(format!(
                "type `{}` does not implement `{schema}`",
                self.type_name()
            )));
        }
        Ok(SchemaView::new(self, schema))
    }

    /// Returns the value stored under an exact slot key.
    #[must_use]
    pub fn value(&self, key: &FieldRef) -> Option<&Value> {
        self.values.get(key)
    }

    /// Iterates over set values in slot order.
    pub fn values(&self) -> impl Iterator<Item = (&FieldRef, &Value)> {
        self.values.iter()
    }

    /// Returns every object id this object references.
    #[must_use]
    pub fn references(&self) -> Vec<ObjectId> {
        let mut out = Vec::new();
        for value in self.values.values() {
            value.references(&mut out);
        }
        out
    }

    pub(crate) fn set(&mut self, key: FieldRef, value: Value) {
        if value.is_null() {
            self.values.remove(&key);
        } else {
            self.values.insert(key, value);
        }
    }

    pub(crate) fn set_path(&mut self, path: Option<String>) {
        self.path = path;
    }

    pub(crate) fn stamp(&mut self, revision: RevisionId) {
        self.revision = revision;
    }

    #[must_use]
    pub(crate) fn restamped(&self, revision: RevisionId) -> Self {
        let mut copy = self.clone();
        copy.revision = revision;
        copy
    }

    pub(crate) fn to_stored(&self) -> StoredObject {
        StoredObject {
            id: self.id,
            type_name: self.type_name().to_string(),
            values: self
                .values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            path: self.path.clone(),
            revision: self.revision,
        }
    }

    pub(crate) fn from_stored(stored: StoredObject, ty: Arc<ResolvedType>) -> CoreResult<Self> {
        let mut object = Self::new(stored.id, ty);
        for (key, value) in stored.values {
            if object.ty.slot(&key).is_none() {
                return Err(CoreError::codec(format!(
                    "object {} carries undeclared field `{key}`",
                    stored.id
                )));
            }
            object.set(key, value);
        }
        object.path = stored.path;
        object.revision = stored.revision;
        Ok(object)
    }
}

/// Serialized form of a [`PersistentObject`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoredObject {
    pub id: ObjectId,
    pub type_name: String,
    pub values: Vec<(FieldRef, Value)>,
    pub path: Option<String>,
    pub revision: RevisionId,
}
