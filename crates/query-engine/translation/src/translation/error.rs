//! Errors for query translation.

/// A type for translation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown property '{path}' on entity '{entity}'.")]
    Schema { entity: String, path: String },
    #[error("Entity '{0}' not found.")]
    EntityNotFound(String),
    #[error("Invalid filter on '{field}': {reason}.")]
    InvalidFilter { field: String, reason: String },
    #[error("{0} is not supported.")]
    UnsupportedOperation(String),
    #[error("Expected {expected} for '{field}', got {value}.")]
    TypeMismatch {
        field: String,
        expected: String,
        value: serde_json::Value,
    },
}

impl Error {
    pub(crate) fn invalid_filter(field: &str, reason: impl Into<String>) -> Error {
        Error::InvalidFilter {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn type_mismatch(
        field: &str,
        expected: impl Into<String>,
        value: &serde_json::Value,
    ) -> Error {
        Error::TypeMismatch {
            field: field.to_string(),
            expected: expected.into(),
            value: value.clone(),
        }
    }
}

/// A translation error, together with the request that caused it.
#[derive(Debug, thiserror::Error)]
#[error("Could not compile query on '{entity}': {source}")]
pub struct CompileError {
    pub entity: String,
    pub query: serde_json::Value,
    #[source]
    pub source: Error,
}
