//! The shape of the requests the query compiler accepts.
//!
//! `where` and `having` clauses are kept as raw JSON here: whether a key names a
//! column, a relation or a JSON column can only be decided against the entity
//! metadata, so they are resolved into a [`FilterTree`] during translation.

pub mod aggregate;
pub mod filter;
pub mod query;

pub use aggregate::*;
pub use filter::*;
pub use query::*;
