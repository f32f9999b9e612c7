//! Query expressions and their evaluation.
//!
//! Expressions are explicit trees built with [`Expr`]; there is no textual
//! syntax. The [`QueryEngine`] evaluates a tree against one revision and
//! returns a [`QueryResult`].

mod engine;
mod expr;
mod results;

pub use engine::QueryEngine;
pub use expr::{CompareOp, Expr, QueryOptions, Target};
pub use results::{ObjectIter, QueryResult};
