//! Error taxonomy for a seed run.
//!
//! Errors are layered the same way a run is: [`ConfigError`] is raised before
//! any I/O, [`ReadError`] and [`RecordError`] come out of the streaming stage
//! and are wrapped in [`SeedError`] together with the line number and the
//! [`Stage`] that failed. Store failures live in [`crate::store::StoreError`].

use crate::slug::EmptySlug;
use crate::store::StoreError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Invalid run configuration, detected before the input or the store is opened.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("input path is required")]
    EmptyInputPath,

    #[error("table name is required")]
    EmptyTableName,

    #[error("database url is required (flag or DATABASE_URL env)")]
    EmptyDatabaseUrl,

    #[error("uuid namespace is required and must not be nil")]
    NilNamespace,

    #[error("maximum line length must be positive")]
    ZeroMaxLineBytes,
}

/// Failure to turn one decoded record into an entity.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("field {0} is missing")]
    MissingField(String),

    #[error("field {field} is not a {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },

    #[error("field {0} is empty")]
    EmptyField(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    EmptySlug(#[from] EmptySlug),

    #[error("slug rejected by store: {0}")]
    SlugRejected(String),

    #[error("{0}")]
    Invalid(String),
}

impl RecordError {
    pub fn wrong_type(field: &str, expected: &'static str) -> Self {
        Self::WrongType {
            field: field.to_string(),
            expected,
        }
    }
}

/// Failure while reading the line-delimited input.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("scan input: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line} exceeds the maximum length of {max} bytes")]
    LineTooLong { line: u64, max: usize },
}

/// Per-record stage a [`RecordError`] was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decode,
    Mutate,
    Encode,
    Key,
    Slug,
    EntityId,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Decode => "decode payload",
            Stage::Mutate => "mutate payload",
            Stage::Encode => "encode payload",
            Stage::Key => "derive key",
            Stage::Slug => "derive slug",
            Stage::EntityId => "derive entity id",
        };
        f.write_str(name)
    }
}

/// A fatal run error, annotated with the stage that produced it.
#[derive(Error, Debug)]
pub enum SeedError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("open input {path:?}: {source}")]
    OpenInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("init pool: {0}")]
    Connect(#[source] StoreError),

    #[error("resolve schema for {table}: {source}")]
    ResolveSchema {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("init entity writer: {0}")]
    Writer(#[source] StoreError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("line {line}: {stage}: {source}")]
    Record {
        line: u64,
        stage: Stage,
        #[source]
        source: RecordError,
    },

    #[error("line {line}: insert entity: {source}")]
    Insert {
        line: u64,
        #[source]
        source: StoreError,
    },

    #[error("seed task failed: {0}")]
    TaskFailed(String),

    #[error("seed run cancelled")]
    Cancelled,
}

impl SeedError {
    /// Line number of the record that caused the failure, when there is one.
    pub fn line(&self) -> Option<u64> {
        match self {
            SeedError::Record { line, .. } | SeedError::Insert { line, .. } => Some(*line),
            SeedError::Read(ReadError::LineTooLong { line, .. }) => Some(*line),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_error_display_names_line_and_stage() {
        let err = SeedError::Record {
            line: 7,
            stage: Stage::Key,
            source: RecordError::MissingField("sId".to_string()),
        };
        assert_eq!(err.to_string(), "line 7: derive key: field sId is missing");
        assert_eq!(err.line(), Some(7));
    }

    #[test]
    fn line_too_long_reports_line() {
        let err = SeedError::from(ReadError::LineTooLong { line: 3, max: 10 });
        assert_eq!(err.line(), Some(3));
        assert!(err.to_string().contains("maximum length of 10 bytes"));
    }

    #[test]
    fn config_errors_have_no_line() {
        let err = SeedError::from(ConfigError::EmptyTableName);
        assert_eq!(err.line(), None);
        assert_eq!(
            err.to_string(),
            "invalid configuration: table name is required"
        );
    }
}
