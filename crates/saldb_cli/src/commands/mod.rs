//! CLI command implementations.

pub mod forget;
pub mod indexes;
pub mod log;
pub mod rollback;
pub mod state;
pub mod tags;
