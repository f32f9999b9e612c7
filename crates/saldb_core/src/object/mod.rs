//! Persistent objects and the copy-on-write graph that versions them.

mod graph;
mod id;
#[allow(clippy::module_inception)]
mod object;
mod view;

pub use graph::{ObjectGraph, Version};
pub use id::ObjectId;
pub use object::PersistentObject;
pub use view::SchemaView;

pub(crate) use graph::compare_keys;
pub(crate) use object::StoredObject;
