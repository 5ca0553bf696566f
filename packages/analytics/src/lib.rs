#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Aggregation of cleaned incidents and raw auxiliary tables.
//!
//! Every function takes its input by reference and returns a freshly built
//! [`SummaryTable`](air_incident_analytics_models::SummaryTable) or
//! [`Distribution`](air_incident_analytics_models::Distribution); nothing
//! is cached or mutated between calls.

pub mod baseline;
pub mod columns;
pub mod grouping;

use std::path::PathBuf;

use thiserror::Error;

pub use baseline::load_baseline;
pub use columns::{column_counts, column_distribution};
pub use grouping::{group_incidents, incident_locations};

/// Errors that can occur during aggregation.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// A grouping or column spec cannot be evaluated.
    #[error("Invalid spec: {message}")]
    InvalidSpec {
        /// Description of what went wrong.
        message: String,
    },

    /// A spec names a column the table does not have.
    #[error("Table '{table}' has no column '{column}'")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Requested column.
        column: String,
    },

    /// A distribution was requested over a column with no numeric values.
    #[error("Column '{column}' has no numeric values")]
    NoValues {
        /// Requested column.
        column: String,
    },

    /// The baseline file could not be read.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Baseline file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The baseline file is malformed.
    #[error("{}:{line}: {message}", path.display())]
    Baseline {
        /// Baseline file.
        path: PathBuf,
        /// Line of the bad record.
        line: u64,
        /// Description of what went wrong.
        message: String,
    },
}
