//! Execute compiled plans through an [`executor::Executor`] and shape the flat
//! result rows into nested objects, pages and aggregates.

pub mod aggregates;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod query;
