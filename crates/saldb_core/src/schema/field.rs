//! Schema field declarations.

use crate::value::{Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference relationship carried by a reference field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Name of the referenced type.
    pub target: String,
    /// Name under which referencing objects appear on the target.
    pub backref: Option<String>,
    /// Field of the referencing object that orders the backreference set.
    pub order_by: Option<String>,
}

impl Relationship {
    /// Creates a relationship to `target` with no backreference.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            backref: None,
            order_by: None,
        }
    }
}

/// A typed field of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Field name, unique within its schema.
    pub name: String,
    /// Declared value kind.
    pub kind: ValueKind,
    /// Relationship descriptor for reference fields.
    pub relationship: Option<Relationship>,
    /// Schema of the values held by a nested field.
    pub nested: Option<String>,
    /// Whether a committed object must carry a non-null value.
    pub required: bool,
    /// Value assigned when an object is created.
    pub default: Option<Value>,
}

impl SchemaField {
    /// Creates a plain field of the given kind.
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            relationship: None,
            nested: None,
            required: false,
            default: None,
        }
    }

    /// Creates a reference field pointing at objects of `target` type.
    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            relationship: Some(Relationship::new(target)),
            ..Self::new(name, ValueKind::Reference)
        }
    }

    /// Creates a field holding values of the `schema` schema.
    pub fn nested(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            nested: Some(schema.into()),
            ..Self::new(name, ValueKind::Nested)
        }
    }

    /// Marks the field as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the value assigned on creation.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Exposes referencing objects on the target under `name`.
    ///
    /// Has no effect on non-reference fields.
    #[must_use]
    pub fn backref(mut self, name: impl Into<String>) -> Self {
        if let Some(rel) = self.relationship.as_mut() {
            rel.backref = Some(name.into());
        }
        self
    }

    /// Orders the backreference set by `field` of the referencing object.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        if let Some(rel) = self.relationship.as_mut() {
            rel.order_by = Some(field.into());
        }
        self
    }
}

/// Schema-qualified field address, the key of an object's value map.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    /// Constituent schema of the object's type.
    pub schema: String,
    /// Field name within that schema.
    pub field: String,
}

impl FieldRef {
    /// Creates a field reference.
    pub fn new(schema: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.field)
    }
}

/// A field name as written by a caller: `field` or `Schema.field`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldSelector {
    /// Optional schema qualifier.
    pub schema: Option<String>,
    /// Field name.
    pub field: String,
}

impl FieldSelector {
    /// Parses `field` or `Schema.field`.
    pub fn parse(s: &str) -> Self {
        match s.split_once('.') {
            Some((schema, field)) => Self {
                schema: Some(schema.to_string()),
                field: field.to_string(),
            },
            None => Self {
                schema: None,
                field: s.to_string(),
            },
        }
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.field),
            None => f.write_str(&self.field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_builder() {
        let field = SchemaField::reference("folder", "Folder")
            .backref("documents")
            .order_by("title")
            .required();

        assert_eq!(field.kind, ValueKind::Reference);
        assert!(field.required);
        let rel = field.relationship.unwrap();
        assert_eq!(rel.target, "Folder");
        assert_eq!(rel.backref.as_deref(), Some("documents"));
        assert_eq!(rel.order_by.as_deref(), Some("title"));
    }

    #[test]
    fn backref_ignored_on_plain_field() {
        let field = SchemaField::new("title", ValueKind::Text).backref("x");
        assert!(field.relationship.is_none());
    }

    #[test]
    fn selector_parsing() {
        assert_eq!(
            FieldSelector::parse("Dublin.title"),
            FieldSelector {
                schema: Some("Dublin".into()),
                field: "title".into()
            }
        );
        assert_eq!(FieldSelector::parse("created").schema, None);
        assert_eq!(FieldSelector::parse("Dublin.title").to_string(), "Dublin.title");
    }

    #[test]
    fn field_ref_display() {
        assert_eq!(FieldRef::new("Dublin", "title").to_string(), "Dublin.title");
    }
}
