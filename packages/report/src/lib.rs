#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! End-to-end report runs.
//!
//! A [`ChartPlan`] declares which charts a run produces and where each
//! chart's numbers come from. [`pipeline::load_data`] loads and cleans the
//! requested years, and [`pipeline::run_plan`] renders every planned chart,
//! isolating failures so one bad chart never stops the rest.

pub mod pipeline;
pub mod plan;

use std::path::PathBuf;

use air_incident_analytics::AnalyticsError;
use air_incident_render::RenderError;
use air_incident_source::SourceError;
use thiserror::Error;

pub use pipeline::{
    ChartFailure, LoadedData, ReportOutcome, RunOptions, SkippedChart, load_data, run_plan,
    write_cleaning_report, write_summaries,
};
pub use plan::{ChartPlan, ChartSource, PlannedChart, default_plan, load_plan};

/// Errors that abort a report run.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Loading or cleaning failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// No dataset year was requested.
    #[error("No years selected and none found in {}", data_dir.display())]
    NoYears {
        /// Directory that was searched.
        data_dir: PathBuf,
    },

    /// A chart plan could not be read or is inconsistent.
    #[error(
        "Invalid chart plan{}: {message}",
        path.as_ref().map(|p| format!(" {}", p.display())).unwrap_or_default()
    )]
    Plan {
        /// Plan file, `None` for the embedded plan.
        path: Option<PathBuf>,
        /// Description of what went wrong.
        message: String,
    },

    /// An output file could not be written.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// An output document could not be serialized.
    #[error("Failed to serialize {what}: {source}")]
    Json {
        /// What was being serialized.
        what: &'static str,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// Why a single chart could not be produced.
#[derive(Debug, Error)]
pub enum ChartError {
    /// The aggregation step failed.
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    /// The chart could not be drawn or written.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The chart reads a table that was not loaded.
    #[error("Table '{table}' was not loaded")]
    MissingTable {
        /// Requested table.
        table: String,
    },
}
