//! # SalDB Core
//!
//! Transactional, revisioned object store with incremental indexes.
//!
//! Applications describe data with schemas and types, persist schema-typed
//! objects identified by 128-bit ids, and query them through indexes. Every
//! commit produces a new, immutable, serially numbered revision; any
//! retained revision can be read or queried by id or tag.
//!
//! ## Components
//!
//! - [`Registry`]: schemas, types and index declarations
//! - [`ObjectGraph`]: copy-on-write object versions per revision
//! - [`RevisionStore`]: the revision table and tag table
//! - [`IndexManager`]: revision-aware ordered, hash and text indexes
//! - [`QueryEngine`]: evaluation of [`Expr`] trees
//! - [`Session`]: staged mutations, commit, rollback and pinning
//!
//! ## Example
//!
//! ```rust,ignore
//! use saldb_core::{
//!     Expr, IndexSpec, QueryOptions, Registry, Schema, SchemaField, Store, StoreConfig, TypeDef,
//!     ValueKind,
//! };
//!
//! let mut registry = Registry::new();
//! registry.register_schema(Schema::new("Dublin").field(SchemaField::new("created", ValueKind::Date)))?;
//! registry.register_type("Document", TypeDef::new(["Dublin"]))?;
//! registry.register_index(IndexSpec::field("created"))?;
//!
//! let store = Store::open(registry, StoreConfig::default())?;
//! let mut session = store.session();
//! let doc = session.create("Document")?;
//! session.set(doc, "created", "2021-01-01")?;
//! session.add(doc)?;
//! session.commit()?;
//!
//! let hits = session.query(&Expr::field("created").gt("2020-06-01"), &QueryOptions::new())?;
//! assert_eq!(hits.total(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod index;
mod object;
mod persist;
mod query;
mod revision;
mod schema;
mod stats;
mod store;
mod transaction;
mod types;
mod value;

pub use config::{ImmutabilityCheck, StoreConfig};
pub use error::{CoreError, CoreResult};
pub use index::{
    Discriminator, HashIndex, HistoryEntry, IdSet, Index, IndexDefinition, IndexKey, IndexKind,
    IndexManager, IndexSource, IndexSpec, IndexUpdate, OrderedIndex, TextIndex, TokenizerConfig,
    PATH_INDEX, TYPE_INDEX,
};
pub use object::{ObjectGraph, ObjectId, PersistentObject, SchemaView, Version};
pub use persist::{Snapshot, SNAPSHOT_VERSION};
pub use query::{CompareOp, Expr, ObjectIter, QueryEngine, QueryOptions, QueryResult, Target};
pub use revision::{Delta, Revision, RevisionMeta, RevisionStore, TagChange};
pub use schema::{
    FieldRef, FieldSelector, FieldSlot, Registry, Relationship, ResolvedType, Schema, SchemaField,
    TypeDef,
};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::Store;
pub use transaction::Session;
pub use types::{RevisionId, RevisionRef};
pub use value::{Value, ValueKind};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
