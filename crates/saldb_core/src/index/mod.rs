//! Index management.
//!
//! This module provides the secondary indexes of a store:
//! - [`OrderedIndex`]: equality, ranges and ordering
//! - [`HashIndex`]: equality only
//! - [`TextIndex`]: token containment
//!
//! Every store also carries the built-in `type` and `path` indexes and one
//! internal hash index per declared backreference.

mod hash;
mod key;
mod manager;
mod ordered;
mod postings;
mod spec;
mod text;
mod traits;

pub use hash::HashIndex;
pub use key::IndexKey;
pub use manager::{HistoryEntry, IndexManager, IndexUpdate};
pub use ordered::OrderedIndex;
pub use spec::{
    Discriminator, IndexDefinition, IndexKind, IndexSource, IndexSpec, PATH_INDEX, TYPE_INDEX,
};
pub use text::{TextIndex, TokenizerConfig};
pub use traits::{IdSet, Index};

pub(crate) use spec::BACKREF_PREFIX;
