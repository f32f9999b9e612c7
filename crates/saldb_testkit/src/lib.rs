//! # SalDB Testkit
//!
//! Test utilities for SalDB.
//!
//! This crate provides:
//! - A reference registry (`Document`, `Folder`) and seeded stores
//! - Property-based test generators using proptest
//! - Concurrent commit drivers for conflict testing
//!
//! ## Usage
//!
//! ```rust,ignore
//! use saldb_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     let store = document_store();
//!     let mut session = store.session();
//!     let doc = new_document(&mut session, "Notes", date(2021, 1, 1)).unwrap();
//!     session.commit().unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
