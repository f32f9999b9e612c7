//! Index declarations.

use crate::error::{CoreError, CoreResult};
use crate::object::PersistentObject;
use crate::schema::FieldSelector;
use crate::value::{Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Name of the built-in index keyed by type name.
pub const TYPE_INDEX: &str = "type";

/// Name of the built-in index keyed by traversal path.
pub const PATH_INDEX: &str = "path";

/// Prefix of the internal indexes that back relationship backreferences.
pub(crate) const BACKREF_PREFIX: &str = "~backref:";

/// Maps an object to the value it is indexed under.
pub type Discriminator = Arc<dyn Fn(&PersistentObject) -> Value + Send + Sync>;

/// Storage structure of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// B-tree: equality, range comparisons and ordering.
    Ordered,
    /// Hash table: equality only.
    Hash,
    /// Inverted token index: `Contains` searches.
    Text,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ordered => "ordered",
            Self::Hash => "hash",
            Self::Text => "text",
        };
        f.write_str(name)
    }
}

/// Where an index takes its values from.
#[derive(Clone)]
pub enum IndexSource {
    /// A schema field, optionally schema-qualified.
    Field(FieldSelector),
    /// An arbitrary function of the object.
    Discriminator(Discriminator),
    /// The object's type name.
    TypeName,
    /// The object's traversal path.
    Path,
    /// Reference fields declaring the given backreference name.
    Backref(String),
}

impl fmt::Debug for IndexSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(sel) => write!(f, "Field({sel})"),
            Self::Discriminator(_) => f.write_str("Discriminator(..)"),
            Self::TypeName => f.write_str("TypeName"),
            Self::Path => f.write_str("Path"),
            Self::Backref(name) => write!(f, "Backref({name})"),
        }
    }
}

/// Declaration of a named index.
///
/// # Example
///
/// ```rust,ignore
/// registry.register_index(IndexSpec::field("created"))?;
/// registry.register_index(IndexSpec::field("Dublin.title").kind(IndexKind::Text))?;
/// registry.register_index(
///     IndexSpec::named("year", |obj| match obj.get("created") {
///         Ok(Value::Date(d)) => Value::Integer(d.year().into()),
///         _ => Value::Null,
///     })
///     .value_kind(ValueKind::Integer),
/// )?;
/// ```
#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub(crate) name: String,
    pub(crate) kind: IndexKind,
    pub(crate) source: IndexSource,
    pub(crate) value_kind: Option<ValueKind>,
    pub(crate) omit: Value,
    pub(crate) unique: bool,
    pub(crate) builtin: bool,
}

impl IndexSpec {
    /// Declares an ordered index on `field` (`field` or `Schema.field`).
    ///
    /// The index is named after the field as written.
    pub fn field(field: &str) -> Self {
        Self::new(field, IndexSource::Field(FieldSelector::parse(field)))
    }

    /// Declares an ordered index computed by `discriminator`.
    ///
    /// Objects for which the discriminator returns the omit value (`Null`
    /// unless changed with [`IndexSpec::omit`]) are left out of the index.
    pub fn named<F>(name: impl Into<String>, discriminator: F) -> Self
    where
        F: Fn(&PersistentObject) -> Value + Send + Sync + 'static,
    {
        Self::new(name, IndexSource::Discriminator(Arc::new(discriminator)))
    }

    fn new(name: impl Into<String>, source: IndexSource) -> Self {
        Self {
            name: name.into(),
            kind: IndexKind::Ordered,
            source,
            value_kind: None,
            omit: Value::Null,
            unique: false,
            builtin: false,
        }
    }

    pub(crate) fn builtin_type() -> Self {
        Self {
            builtin: true,
            ..Self::new(TYPE_INDEX, IndexSource::TypeName)
        }
    }

    pub(crate) fn builtin_path() -> Self {
        Self {
            kind: IndexKind::Hash,
            value_kind: Some(ValueKind::Text),
            unique: true,
            builtin: true,
            ..Self::new(PATH_INDEX, IndexSource::Path)
        }
    }

    pub(crate) fn backref(name: &str) -> Self {
        Self {
            kind: IndexKind::Hash,
            value_kind: Some(ValueKind::Reference),
            builtin: true,
            ..Self::new(
                format!("{BACKREF_PREFIX}{name}"),
                IndexSource::Backref(name.to_string()),
            )
        }
    }

    /// Rebuilds a field index from its persisted description.
    ///
    /// Returns `None` for built-in and computed indexes, which cannot be
    /// restored from a definition alone.
    #[must_use]
    pub fn from_definition(def: &IndexDefinition) -> Option<Self> {
        if def.builtin {
            return None;
        }
        let field = def.field.as_deref()?;
        Some(Self {
            kind: def.kind,
            value_kind: def.value_kind,
            unique: def.unique,
            ..Self::new(def.name.clone(), IndexSource::Field(FieldSelector::parse(field)))
        })
    }

    /// Sets the index structure.
    #[must_use]
    pub fn kind(mut self, kind: IndexKind) -> Self {
        self.kind = kind;
        self
    }

    /// Declares the kind of value the index holds.
    ///
    /// Values are coerced to this kind on commit; values that cannot be
    /// are rejected with `IndexTypeMismatch`.
    #[must_use]
    pub fn value_kind(mut self, kind: ValueKind) -> Self {
        self.value_kind = Some(kind);
        self
    }

    /// Sets the sentinel value meaning "leave this object out".
    #[must_use]
    pub fn omit(mut self, value: impl Into<Value>) -> Self {
        self.omit = value.into();
        self
    }

    /// Rejects commits in which two live objects share a key.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Returns the index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the index structure.
    #[must_use]
    pub fn index_kind(&self) -> IndexKind {
        self.kind
    }

    /// Returns the declared or derived value kind.
    #[must_use]
    pub fn declared_kind(&self) -> Option<ValueKind> {
        self.value_kind
    }

    /// Returns the value source.
    #[must_use]
    pub fn source(&self) -> &IndexSource {
        &self.source
    }

    /// Returns true for the indexes that always exist.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.builtin
    }

    /// Returns true for internal indexes hidden from listings.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.name.starts_with(BACKREF_PREFIX)
    }

    /// Computes the values `object` is indexed under, omit values removed.
    pub(crate) fn extract(&self, object: &PersistentObject) -> CoreResult<Vec<Value>> {
        let values = match &self.source {
            IndexSource::Field(sel) => {
                let found = match &sel.schema {
                    Some(schema) => object.get_qualified(schema, &sel.field),
                    None => object.get(&sel.field),
                };
                match found {
                    Ok(value) => vec![value.clone()],
                    Err(CoreError::UnknownField { .. }) => Vec::new(),
                    Err(err) => return Err(err),
                }
            }
            IndexSource::Discriminator(f) => vec![f(object)],
            IndexSource::TypeName => vec![Value::Text(object.type_name().to_string())],
            IndexSource::Path => object
                .path()
                .map(|p| vec![Value::Text(p.to_string())])
                .unwrap_or_default(),
            IndexSource::Backref(name) => object
                .resolved_type()
                .backref_slots(name)
                .filter_map(|slot| object.value(&slot.field_ref()).cloned())
                .collect(),
        };
        Ok(values
            .into_iter()
            .filter(|v| !v.is_null() && *v != self.omit)
            .collect())
    }

    /// Returns the persisted description of this index.
    #[must_use]
    pub fn definition(&self) -> IndexDefinition {
        IndexDefinition {
            name: self.name.clone(),
            field: match &self.source {
                IndexSource::Field(sel) => Some(sel.to_string()),
                _ => None,
            },
            kind: self.kind,
            value_kind: self.value_kind,
            unique: self.unique,
            builtin: self.builtin,
        }
    }
}

/// Persisted description of an index.
///
/// Discriminators are code and are not persisted; index contents are
/// rebuilt from the revision table when state is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Index name.
    pub name: String,
    /// Source field (`field` or `Schema.field`); `None` for computed and
    /// built-in indexes.
    pub field: Option<String>,
    /// Index structure.
    pub kind: IndexKind,
    /// Value kind, if declared or derived.
    pub value_kind: Option<ValueKind>,
    /// Whether keys are unique.
    pub unique: bool,
    /// Whether the index is built in.
    pub builtin: bool,
}
