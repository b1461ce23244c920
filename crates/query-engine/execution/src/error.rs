//! Errors for query execution.

use query_engine_translation::translation::error::CompileError;

/// A type for execution errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("Executor failed: {0}")]
    Executor(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Result row is missing the column '{0}'.")]
    MissingColumn(String),
    #[error("Variable '{0}' is not bound.")]
    MissingVariable(String),
    #[error("Count column holds {0}, expected a number.")]
    InvalidCount(serde_json::Value),
}
