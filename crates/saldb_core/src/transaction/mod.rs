//! Sessions and their staged working sets.

mod change_set;
mod session;

pub use session::Session;
