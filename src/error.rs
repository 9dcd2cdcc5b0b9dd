//! Error taxonomy shared by every record reader.
//!
//! Readers surface exactly one [`ReaderError`] per failed call. Callers that
//! only care about the category can match on [`ReaderError::kind`].

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Coarse category of a [`ReaderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SourceUnavailable,
    SchemaMismatch,
    RewindUnsupported,
    IterationExhausted,
    ReaderClosed,
    NotInitialized,
    AlreadyInitialized,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::SourceUnavailable => "source unavailable",
            ErrorKind::SchemaMismatch => "schema mismatch",
            ErrorKind::RewindUnsupported => "rewind unsupported",
            ErrorKind::IterationExhausted => "iteration exhausted",
            ErrorKind::ReaderClosed => "reader closed",
            ErrorKind::NotInitialized => "not initialized",
            ErrorKind::AlreadyInitialized => "already initialized",
        };
        f.write_str(name)
    }
}

/// Errors returned by [`crate::reader::RecordReader`] operations.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(#[from] MismatchError),

    #[error("source cannot be rewound")]
    RewindUnsupported,

    #[error("no more rows in the current pass")]
    IterationExhausted,

    #[error("reader is closed")]
    ReaderClosed,

    #[error("reader has not been initialized")]
    NotInitialized,

    #[error("reader is already initialized")]
    AlreadyInitialized,
}

impl ReaderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReaderError::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            ReaderError::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            ReaderError::RewindUnsupported => ErrorKind::RewindUnsupported,
            ReaderError::IterationExhausted => ErrorKind::IterationExhausted,
            ReaderError::ReaderClosed => ErrorKind::ReaderClosed,
            ReaderError::NotInitialized => ErrorKind::NotInitialized,
            ReaderError::AlreadyInitialized => ErrorKind::AlreadyInitialized,
        }
    }
}

impl From<std::io::Error> for ReaderError {
    fn from(err: std::io::Error) -> Self {
        ReaderError::SourceUnavailable(SourceError::Io(err))
    }
}

impl From<ConfigError> for ReaderError {
    fn from(err: ConfigError) -> Self {
        ReaderError::SourceUnavailable(SourceError::Config(err))
    }
}

impl From<arrow::error::ArrowError> for ReaderError {
    fn from(err: arrow::error::ArrowError) -> Self {
        ReaderError::SourceUnavailable(SourceError::Arrow(err))
    }
}

impl From<parquet::errors::ParquetError> for ReaderError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        ReaderError::SourceUnavailable(SourceError::Parquet(err))
    }
}

/// The underlying resource could not be opened or read.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot open '{}': {source}", .path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The reader was built from a configuration that does not validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("{0}")]
    Unavailable(String),
}

/// A record, or the structure of a source, does not conform to the schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MismatchError {
    #[error("field '{field}' is missing")]
    MissingField { field: String },

    #[error("field '{field}' is not declared in the schema")]
    UnknownField { field: String },

    #[error("field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("field '{field}': expected a {} value", cardinality_name(.multi_valued))]
    Cardinality { field: String, multi_valued: bool },

    #[error("field '{field}' is not nullable but has no value")]
    UnexpectedNull { field: String },

    #[error("field '{field}': cannot parse '{value}' as {expected}")]
    Unparseable {
        field: String,
        value: String,
        expected: String,
    },

    #[error("record {record} is malformed: {reason}")]
    Malformed { record: u64, reason: String },

    #[error("field '{field}' has unsupported source type {data_type}")]
    UnsupportedType { field: String, data_type: String },

    #[error("field '{field}' is declared as {expected} but the source defines {found}")]
    DefinitionConflict {
        field: String,
        expected: String,
        found: String,
    },

    #[error("invalid schema: {reason}")]
    InvalidSchema { reason: String },

    #[error("{format} input has no embedded structure and needs a schema")]
    SchemaRequired { format: String },
}

fn cardinality_name(multi_valued: &bool) -> &'static str {
    if *multi_valued {
        "multi-valued"
    } else {
        "single"
    }
}
