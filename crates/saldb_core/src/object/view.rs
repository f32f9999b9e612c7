//! Schema-narrowed object views.

use crate::error::CoreResult;
use crate::object::PersistentObject;
use crate::value::Value;

/// A persistent object seen through one of the schemas it implements.
///
/// Field names resolve only against that schema, so fields that are
/// ambiguous on the object are unambiguous here.
#[derive(Debug, Clone, Copy)]
pub struct SchemaView<'a> {
    object: &'a PersistentObject,
    schema: &'a str,
}

impl<'a> SchemaView<'a> {
    pub(crate) fn new(object: &'a PersistentObject, schema: &'a str) -> Self {
        Self { object, schema }
    }

    /// Returns the schema this view narrows to.
    #[must_use]
    pub fn schema(&self) -> &str {
        self.schema
    }

    /// Returns the underlying object.
    #[must_use]
    pub fn object(&self) -> &'a PersistentObject {
        self.object
    }

    /// Reads a field of the schema.
    pub fn get(&self, field: &str) -> CoreResult<&'a Value> {
        self.object.get_qualified(self.schema, field)
    }

    /// Lists the field names visible through this view.
    #[must_use]
    pub fn field_names(&self) -> Vec<&'a str> {
        let ty = self.object.resolved_type();
        let Some(constituent) = ty.constituent_of(self.schema) else {
            return Vec::new();
        };
        ty.slots()
            .iter()
            .filter(|s| s.schema == constituent)
            .map(|s| s.field.name.as_str())
            .collect()
    }
}
