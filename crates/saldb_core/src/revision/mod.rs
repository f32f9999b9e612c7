//! Revision history: serially numbered copy-on-write revisions and tags.

#[allow(clippy::module_inception)]
mod revision;
mod store;

pub use revision::{Delta, Revision, RevisionMeta, TagChange};
pub use store::RevisionStore;
