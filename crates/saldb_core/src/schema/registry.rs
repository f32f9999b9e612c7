//! Schema, type and index registry.
//!
//! The registry is filled once at startup and then initialized. Initialization
//! flattens schema extension chains, checks every cross reference and derives
//! the built-in indexes. After that the registry is read-only and is shared by
//! the store behind an `Arc`.

use crate::error::{CoreError, CoreResult};
use crate::index::{IndexKind, IndexSource, IndexSpec, PATH_INDEX, TYPE_INDEX};
use crate::schema::definition::{Schema, TypeDef};
use crate::schema::field::{FieldRef, FieldSelector, SchemaField};
use crate::value::{Value, ValueKind};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A field as stored on objects of one type: the constituent schema that
/// owns the slot plus the effective declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSlot {
    /// Constituent schema of the type.
    pub schema: String,
    /// Effective field declaration after extension.
    pub field: SchemaField,
}

impl FieldSlot {
    /// Returns the value-map key of this slot.
    #[must_use]
    pub fn field_ref(&self) -> FieldRef {
        FieldRef::new(&self.schema, &self.field.name)
    }
}

/// A type with its schemas flattened into field slots.
#[derive(Debug)]
pub struct ResolvedType {
    name: String,
    class_hint: Option<String>,
    constituents: Vec<String>,
    /// Every implemented schema mapped to the constituent that implements it.
    implements: BTreeMap<String, String>,
    slots: Vec<FieldSlot>,
}

impl ResolvedType {
    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the instantiation hint.
    #[must_use]
    pub fn class_hint(&self) -> Option<&str> {
        self.class_hint.as_deref()
    }

    /// Returns the constituent schemas in declaration order.
    #[must_use]
    pub fn constituents(&self) -> &[String] {
        &self.constituents
    }

    /// Returns true if the type implements `schema`, directly or through
    /// extension.
    #[must_use]
    pub fn implements(&self, schema: &str) -> bool {
        self.implements.contains_key(schema)
    }

    /// Returns the constituent through which the type implements `schema`.
    #[must_use]
    pub fn constituent_of(&self, schema: &str) -> Option<&str> {
        self.implements.get(schema).map(String::as_str)
    }

    /// Returns every field slot of the type.
    #[must_use]
    pub fn slots(&self) -> &[FieldSlot] {
        &self.slots
    }

    /// Returns the slot stored under `key`.
    #[must_use]
    pub fn slot(&self, key: &FieldRef) -> Option<&FieldSlot> {
        self.slots
            .iter()
            .find(|s| s.schema == key.schema && s.field.name == key.field)
    }

    /// Resolves an unqualified field name.
    ///
    /// # Errors
    ///
    /// `UnknownField` if no constituent declares the name, `AmbiguousField`
    /// if more than one does.
    pub fn resolve_field(&self, field: &str) -> CoreResult<&FieldSlot> {
        let mut matches = self.slots.iter().filter(|s| s.field.name == field);
        let first = matches.next().ok_or_else(|| self.unknown(field))?;
        let rest: Vec<&FieldSlot> = matches.collect();
        if rest.is_empty() {
            return Ok(first);
        }
        Err(CoreError::AmbiguousField {
            field: field.to_string(),
            schemas: std::iter::once(first)
                .chain(rest)
                .map(|s| s.schema.clone())
                .collect(),
        })
    }

    /// Resolves `field` as seen through `schema`.
    ///
    /// `schema` may be a constituent or any schema a constituent extends.
    pub fn resolve_qualified(&self, schema: &str, field: &str) -> CoreResult<&FieldSlot> {
        let constituent = self
            .implements
            .get(schema)
            .ok_or_else(|| self.unknown(&format!("{schema}.{field}")))?;
        self.slots
            .iter()
            .find(|s| &s.schema == constituent && s.field.name == field)
            .ok_or_else(|| self.unknown(&format!("{schema}.{field}")))
    }

    /// Returns the reference slots that expose backreference `name`.
    pub fn backref_slots<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FieldSlot> {
        self.slots.iter().filter(move |s| {
            s.field
                .relationship
                .as_ref()
                .and_then(|r| r.backref.as_deref())
                == Some(name)
        })
    }

    fn unknown(&self, field: &str) -> CoreError {
        CoreError::UnknownField {
            type_name: self.name.clone(),
            field: field.to_string(),
        }
    }
}

/// Result of a successful initialization.
#[derive(Debug)]
struct Resolved {
    schema_fields: BTreeMap<String, Vec<SchemaField>>,
    types: BTreeMap<String, Arc<ResolvedType>>,
    indexes: Vec<IndexSpec>,
    /// Backreference name mapped to its ordering field.
    backrefs: BTreeMap<String, Option<String>>,
}

/// Registry of schemas, types and index declarations.
///
/// # Example
///
/// ```rust,ignore
/// let mut registry = Registry::new();
/// registry.register_schema(
///     Schema::new("Dublin")
///         .field(SchemaField::new("title", ValueKind::Text))
///         .field(SchemaField::new("created", ValueKind::Date)),
/// )?;
/// registry.register_type("Document", TypeDef::new(["Dublin"]))?;
/// registry.register_index(IndexSpec::field("created"))?;
/// registry.initialize()?;
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    schemas: BTreeMap<String, Schema>,
    types: BTreeMap<String, TypeDef>,
    indexes: Vec<IndexSpec>,
    resolved: Option<Resolved>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema.
    ///
    /// # Errors
    ///
    /// `Validation` if the name is taken or the schema repeats a field name.
    pub fn register_schema(&mut self, schema: Schema) -> CoreResult<()> {
        self.ensure_open()?;
        if self.schemas.contains_key(schema.name()) {
            return Err(CoreError::validation(format!(
                "schema `{}` is already registered",
                schema.name()
            )));
        }
        let mut seen = BTreeSet::new();
        for field in schema.fields() {
            if !seen.insert(field.name.as_str()) {
                return Err(CoreError::validation(format!(
                    "schema `{}` declares field `{}` twice",
                    schema.name(),
                    field.name
                )));
            }
        }
        self.schemas.insert(schema.name().to_string(), schema);
        Ok(())
    }

    /// Registers a type under `name`.
    pub fn register_type(&mut self, name: impl Into<String>, ty: TypeDef) -> CoreResult<()> {
        self.ensure_open()?;
        let name = name.into();
        if ty.schemas().is_empty() {
            return Err(CoreError::validation(format!(
                "type `{name}` aggregates no schema"
            )));
        }
        if self.types.contains_key(&name) {
            return Err(CoreError::validation(format!(
                "type `{name}` is already registered"
            )));
        }
        self.types.insert(name, ty);
        Ok(())
    }

    /// Registers a secondary index.
    pub fn register_index(&mut self, spec: IndexSpec) -> CoreResult<()> {
        self.ensure_open()?;
        check_index_name(spec.name())?;
        if self.indexes.iter().any(|i| i.name() == spec.name()) {
            return Err(CoreError::validation(format!(
                "index `{}` is already registered",
                spec.name()
            )));
        }
        self.indexes.push(spec);
        Ok(())
    }

    /// Returns true once [`Registry::initialize`] has succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.resolved.is_some()
    }

    /// Resolves and validates every declaration.
    ///
    /// Calling this again after success is a no-op.
    ///
    /// # Errors
    ///
    /// `Validation` for unknown or cyclic parents, kind-changing overrides,
    /// unknown nested schemas, reference targets or ordering fields, and
    /// index declarations naming unknown fields. `AmbiguousField` for an
    /// unqualified index field declared by two constituents of one type.
    pub fn initialize(&mut self) -> CoreResult<()> {
        if self.resolved.is_some() {
            return Ok(());
        }

        let mut schema_fields = BTreeMap::new();
        for name in self.schemas.keys() {
            let fields = self.flatten(name)?;
            schema_fields.insert(name.clone(), fields);
        }

        for (schema, fields) in &schema_fields {
            for field in fields {
                self.check_field(schema, field, &schema_fields)?;
            }
        }

        let mut types = BTreeMap::new();
        let mut backrefs: BTreeMap<String, Option<String>> = BTreeMap::new();
        for (name, def) in &self.types {
            let resolved = self.resolve_type(name, def, &schema_fields)?;
            for slot in &resolved.slots {
                if let Some(rel) = &slot.field.relationship {
                    if let Some(backref) = &rel.backref {
                        let entry = backrefs.entry(backref.clone()).or_default();
                        if entry.is_none() {
                            entry.clone_from(&rel.order_by);
                        }
                    }
                }
            }
            types.insert(name.clone(), Arc::new(resolved));
        }

        let mut indexes = vec![IndexSpec::builtin_type(), IndexSpec::builtin_path()];
        indexes.extend(backrefs.keys().map(|name| IndexSpec::backref(name)));
        for spec in &self.indexes {
            indexes.push(derive_index(spec.clone(), &schema_fields, &types)?);
        }

        self.resolved = Some(Resolved {
            schema_fields,
            types,
            indexes,
            backrefs,
        });
        Ok(())
    }

    /// Returns the resolved type `name`.
    pub fn type_def(&self, name: &str) -> CoreResult<Arc<ResolvedType>> {
        self.resolved()?
            .types
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("type `{name}`")))
    }

    /// Returns the resolved types by name.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Returns the index specs in effect after initialization, built-ins
    /// first.
    pub fn index_specs(&self) -> CoreResult<&[IndexSpec]> {
        Ok(&self.resolved()?.indexes)
    }

    /// Returns the ordering field of backreference `name`.
    pub fn backref_order(&self, name: &str) -> CoreResult<Option<&str>> {
        self.resolved()?
            .backrefs
            .get(name)
            .map(Option::as_deref)
            .ok_or_else(|| CoreError::not_found(format!("backreference `{name}`")))
    }

    /// Returns the registered schemas.
    pub fn schemas(&self) -> impl Iterator<Item = &Schema> {
        self.schemas.values()
    }

    /// Returns the registered types.
    pub fn types(&self) -> impl Iterator<Item = (&str, &TypeDef)> {
        self.types.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Derives the kind an index on `field` (`field` or `Schema.field`)
    /// would hold.
    pub(crate) fn prepare_index(&self, spec: IndexSpec) -> CoreResult<IndexSpec> {
        check_index_name(spec.name())?;
        let resolved = self.resolved()?;
        derive_index(spec, &resolved.schema_fields, &resolved.types)
    }

    /// Returns the declared kind of the field `selector` names, or `None`
    /// if no schema declares it.
    ///
    /// # Errors
    ///
    /// `AmbiguousField` if the selector is unqualified and some type sees
    /// the field through two constituents, `Validation` if the matching
    /// declarations disagree on the kind.
    pub(crate) fn field_kind(&self, selector: &FieldSelector) -> CoreResult<Option<ValueKind>> {
        let resolved = self.resolved()?;
        field_kind(selector, &resolved.schema_fields, &resolved.types)
    }

    /// Coerces and checks `value` against `field`.
    ///
    /// Nested values are checked field by field against their schema.
    /// Reference targets are checked by the store at commit.
    pub fn validate_value(&self, field: &SchemaField, value: Value) -> CoreResult<Value> {
        let resolved = self.resolved()?;
        let value = value.coerce(field.kind).map_err(|v| {
            CoreError::validation(format!(
                "field `{}` expects {}, got {}",
                field.name,
                field.kind,
                v.describe()
            ))
        })?;
        let (Value::Nested(map), Some(schema)) = (&value, &field.nested) else {
            return Ok(value);
        };
        let fields = resolved
            .schema_fields
            .get(schema)
            .ok_or_else(|| CoreError::not_found(format!("schema `{schema}`")))?;
        let mut checked = BTreeMap::new();
        for (name, inner) in map {
            let decl = fields.iter().find(|f| &f.name == name).ok_or_else(|| {
                CoreError::validation(format!("schema `{schema}` has no field `{name}`"))
            })?;
            checked.insert(name.clone(), self.validate_value(decl, inner.clone())?);
        }
        Ok(Value::Nested(checked))
    }

    fn resolved(&self) -> CoreResult<&Resolved> {
        self.resolved
            .as_ref()
            .ok_or_else(|| CoreError::invalid_state("registry is not initialized"))
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.resolved.is_some() {
            return Err(CoreError::invalid_state(
                "registry is already initialized",
            ));
        }
        Ok(())
    }

    /// Effective fields of `name`: inherited first, overrides in place.
    fn flatten(&self, name: &str) -> CoreResult<Vec<SchemaField>> {
        let mut chain = Vec::new();
        let mut current = Some(name);
        while let Some(schema_name) = current {
            if chain.iter().any(|s: &&Schema| s.name() == schema_name) {
                return Err(CoreError::validation(format!(
                    "schema `{name}` has a cyclic extension chain"
                )));
            }
            let schema = self.schemas.get(schema_name).ok_or_else(|| {
                CoreError::validation(format!("schema `{schema_name}` is not registered"))
            })?;
            chain.push(schema);
            current = schema.parent();
        }

        let mut fields: Vec<SchemaField> = Vec::new();
        for schema in chain.iter().rev() {
            for field in schema.fields() {
                match fields.iter_mut().find(|f| f.name == field.name) {
                    Some(inherited) if inherited.kind != field.kind => {
                        return Err(CoreError::validation(format!(
                            "schema `{}` overrides `{}` as {} but it is {}",
                            schema.name(),
                            field.name,
                            field.kind,
                            inherited.kind
                        )));
                    }
                    Some(inherited) => *inherited = field.clone(),
                    None => fields.push(field.clone()),
                }
            }
        }
        Ok(fields)
    }

    fn check_field(
        &self,
        schema: &str,
        field: &SchemaField,
        schema_fields: &BTreeMap<String, Vec<SchemaField>>,
    ) -> CoreResult<()> {
        if let Some(nested) = &field.nested {
            if !schema_fields.contains_key(nested) {
                return Err(CoreError::validation(format!(
                    "field `{schema}.{}` nests unknown schema `{nested}`",
                    field.name
                )));
            }
        }
        if let Some(rel) = &field.relationship {
            if !self.types.contains_key(&rel.target) && !self.schemas.contains_key(&rel.target) {
                return Err(CoreError::validation(format!(
                    "field `{schema}.{}` references unknown type `{}`",
                    field.name, rel.target
                )));
            }
            if let Some(order_by) = &rel.order_by {
                let declared = schema_fields
                    .values()
                    .any(|fields| fields.iter().any(|f| &f.name == order_by));
                if !declared {
                    return Err(CoreError::validation(format!(
                        "field `{schema}.{}` orders by unknown field `{order_by}`",
                        field.name
                    )));
                }
            }
        }
        if let Some(default) = &field.default {
            if default.clone().coerce(field.kind).is_err() {
                return Err(CoreError::validation(format!(
                    "default of `{schema}.{}` is not a {} value",
                    field.name, field.kind
                )));
            }
        }
        Ok(())
    }

    fn resolve_type(
        &self,
        name: &str,
        def: &TypeDef,
        schema_fields: &BTreeMap<String, Vec<SchemaField>>,
    ) -> CoreResult<ResolvedType> {
        let mut implements = BTreeMap::new();
        let mut slots = Vec::new();
        for constituent in def.schemas() {
            let fields = schema_fields.get(constituent).ok_or_else(|| {
                CoreError::validation(format!(
                    "type `{name}` aggregates unknown schema `{constituent}`"
                ))
            })?;
            let mut current = Some(constituent.as_str());
            while let Some(schema) = current {
                implements
                    .entry(schema.to_string())
                    .or_insert_with(|| constituent.clone());
                current = self.schemas.get(schema).and_then(Schema::parent);
            }
            slots.extend(fields.iter().map(|f| FieldSlot {
                schema: constituent.clone(),
                field: f.clone(),
            }));
        }
        Ok(ResolvedType {
            name: name.to_string(),
            class_hint: def.hint().map(str::to_string),
            constituents: def.schemas().to_vec(),
            implements,
            slots,
        })
    }
}

fn check_index_name(name: &str) -> CoreResult<()> {
    if name == TYPE_INDEX || name == PATH_INDEX || name.starts_with('~') || name.is_empty() {
        return Err(CoreError::validation(format!(
            "index name `{name}` is reserved"
        )));
    }
    Ok(())
}

/// Looks up the single kind `sel` is declared with across all schemas.
fn field_kind(
    sel: &FieldSelector,
    schema_fields: &BTreeMap<String, Vec<SchemaField>>,
    types: &BTreeMap<String, Arc<ResolvedType>>,
) -> CoreResult<Option<ValueKind>> {
    if sel.schema.is_none() {
        for ty in types.values() {
            if let Err(err @ CoreError::AmbiguousField { .. }) = ty.resolve_field(&sel.field) {
                return Err(err);
            }
        }
    }
    let kinds: BTreeSet<ValueKind> = schema_fields
        .iter()
        .filter(|(schema, _)| sel.schema.as_ref().map_or(true, |s| s == *schema))
        .flat_map(|(_, fields)| fields.iter())
        .filter(|f| f.name == sel.field)
        .map(|f| f.kind)
        .collect();
    let mut kinds = kinds.into_iter();
    let kind = kinds.next();
    if kinds.next().is_some() {
        return Err(CoreError::validation(format!(
            "field `{sel}` is declared with conflicting kinds"
        )));
    }
    Ok(kind)
}

/// Fills in the value kind of a field index from its declaration.
fn derive_index(
    mut spec: IndexSpec,
    schema_fields: &BTreeMap<String, Vec<SchemaField>>,
    types: &BTreeMap<String, Arc<ResolvedType>>,
) -> CoreResult<IndexSpec> {
    let IndexSource::Field(sel) = &spec.source else {
        if spec.kind == IndexKind::Text {
            spec.value_kind = Some(ValueKind::Text);
        }
        return Ok(spec);
    };
    let Some(kind) = field_kind(sel, schema_fields, types)? else {
        return Err(CoreError::validation(format!(
            "index `{}` names unknown field `{sel}`",
            spec.name
        )));
    };
    if spec.kind == IndexKind::Text {
        if kind != ValueKind::Text {
            return Err(CoreError::validation(format!(
                "text index `{}` names {kind} field `{sel}`",
                spec.name
            )));
        }
        spec.value_kind = Some(ValueKind::Text);
    } else if spec.value_kind.is_none() && kind.is_scalar() {
        spec.value_kind = Some(kind);
    }
    Ok(spec)
}
