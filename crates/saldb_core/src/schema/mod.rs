//! Schema model: fields, schemas, types and the registry that resolves them.

mod definition;
mod field;
mod registry;

pub use definition::{Schema, TypeDef};
pub use field::{FieldRef, FieldSelector, Relationship, SchemaField};
pub use registry::{FieldSlot, Registry, ResolvedType};
