//! Database module for PostgreSQL persistence.

mod comments;
mod pool;

pub use comments::*;
pub use pool::*;
