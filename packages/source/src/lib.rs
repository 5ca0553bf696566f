#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Loading and cleaning of yearly occurrence files.
//!
//! A [`DatasetDefinition`](dataset_def::DatasetDefinition) describes the
//! files of a dataset. The [`loader`] reads and schema-checks them into
//! raw tables and the [`cleaner`] turns the occurrence table into
//! [`CleanedIncident`](air_incident_source_models::CleanedIncident)s plus a
//! report of everything it excluded or flagged.

pub mod cleaner;
pub mod dataset_def;
pub mod loader;
pub mod parsing;
pub mod progress;
pub mod registry;

use std::path::{Path, PathBuf};

/// Errors that can occur while loading or cleaning a dataset.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// A file could not be read.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A file does not match its table schema.
    #[error(transparent)]
    DataFormat(#[from] DataFormatError),

    /// A configuration file is malformed.
    #[error("Invalid configuration{}: {message}", config_location(path.as_deref()))]
    Config {
        /// Config file, `None` for embedded configs.
        path: Option<PathBuf>,
        /// Parser message.
        message: String,
    },

    /// A dataset definition is internally inconsistent.
    #[error("Invalid dataset definition: {message}")]
    Definition {
        /// Description of what went wrong.
        message: String,
    },
}

fn config_location(path: Option<&Path>) -> String {
    path.map(|p| format!(" in {}", p.display()))
        .unwrap_or_default()
}

/// A yearly file whose structure does not match the expected schema.
#[derive(Debug, thiserror::Error)]
#[error("{} ({table}, {year}): {problem}", path.display())]
pub struct DataFormatError {
    /// Table the file belongs to.
    pub table: String,
    /// Offending file.
    pub path: PathBuf,
    /// Dataset year of the file.
    pub year: i32,
    /// What is wrong with it.
    pub problem: SchemaProblem,
}

/// The ways a file can deviate from its schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaProblem {
    /// The header does not hold exactly the expected columns.
    #[error(
        "column mismatch (missing: [{}], unexpected: [{}])",
        missing.join(", "),
        unexpected.join(", ")
    )]
    ColumnMismatch {
        /// Expected columns absent from the header.
        missing: Vec<String>,
        /// Header columns the schema does not list.
        unexpected: Vec<String>,
    },

    /// The header names a column twice.
    #[error("column '{column}' appears more than once in the header")]
    DuplicateColumn {
        /// The repeated column.
        column: String,
    },

    /// A row has a different number of fields than the header.
    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        /// Line number of the row.
        line: u64,
        /// Number of header columns.
        expected: usize,
        /// Number of fields in the row.
        found: usize,
    },

    /// The file has no header.
    #[error("empty header")]
    EmptyHeader,

    /// The delimited-text reader could not parse the file.
    #[error("line {line}: {message}")]
    Malformed {
        /// Line where parsing failed.
        line: u64,
        /// Reader message.
        message: String,
    },
}
