//! Translate the incoming QuerySpec and AggregateSpec to SQL plans to be run against the database.

pub mod error;
pub mod helpers;
pub mod query;
