//! Schema and type declarations.

use crate::schema::field::SchemaField;
use serde::{Deserialize, Serialize};

/// A named, composable set of typed fields.
///
/// A schema may extend another, inheriting its fields. Redeclaring an
/// inherited field is an override and must keep the inherited kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    name: String,
    extends: Option<String>,
    fields: Vec<SchemaField>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extends: None,
            fields: Vec::new(),
        }
    }

    /// Declares the parent schema.
    #[must_use]
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    /// Appends a field declaration.
    #[must_use]
    pub fn field(mut self, field: SchemaField) -> Self {
        self.fields.push(field);
        self
    }

    /// Returns the schema name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parent schema name, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.extends.as_deref()
    }

    /// Returns the fields declared directly on this schema, in order.
    #[must_use]
    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }
}

/// A named aggregate of schemas usable as an object's concrete kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    schemas: Vec<String>,
    class_hint: Option<String>,
}

impl TypeDef {
    /// Creates a type aggregating `schemas`, in declaration order.
    pub fn new<I, S>(schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schemas: schemas.into_iter().map(Into::into).collect(),
            class_hint: None,
        }
    }

    /// Records an instantiation hint for application code.
    #[must_use]
    pub fn class_hint(mut self, hint: impl Into<String>) -> Self {
        self.class_hint = Some(hint.into());
        self
    }

    /// Returns the constituent schema names.
    #[must_use]
    pub fn schemas(&self) -> &[String] {
        &self.schemas
    }

    /// Returns the instantiation hint, if any.
    #[must_use]
    pub fn hint(&self) -> Option<&str> {
        self.class_hint.as_deref()
    }
}
