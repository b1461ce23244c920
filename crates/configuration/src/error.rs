//! Errors that can be thrown when processing configuration.

use std::path::PathBuf;

/// The errors that can be thrown when processing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ParseConfigurationError {
    #[error("parse error on {file_path}:{line}:{column}: {message}")]
    ParseError {
        file_path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("unsupported configuration version {0}")]
    UnsupportedVersion(u32),

    #[error("I/O error: {0}")]
    IoErrorButStringified(String),
}

/// The errors that can be thrown when writing configuration to disk.
#[derive(Debug, thiserror::Error)]
pub enum WriteParsedConfigurationError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A configuration that parsed but cannot be used to compile queries.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MakeRuntimeConfigurationError {
    #[error("maxIdentifierLength must be at least {minimum}, got {actual}")]
    IdentifierLengthTooSmall { minimum: usize, actual: usize },

    #[error("relation '{relation}' of entity '{entity}' targets unknown entity '{target}'")]
    UnknownRelationTarget {
        entity: String,
        relation: String,
        target: String,
    },

    #[error("relation '{relation}' of entity '{entity}': {reason}")]
    InvalidRelation {
        entity: String,
        relation: String,
        reason: String,
    },

    #[error("entity '{0}' has no identity column")]
    MissingIdentity(String),
}
