//! Chart plan definitions.
//!
//! A plan is a TOML document with one `[[charts]]` entry per chart. The
//! chart's look ([`ChartSpec`]) sits at the top level of the entry and its
//! data source under `data`:
//!
//! ```toml
//! [[charts]]
//! id = "occurrences_per_month"
//! title = "Occurrences per month"
//! kind = "line"
//!
//! [charts.data]
//! type = "incidents"
//! dimensions = [{ type = "month" }]
//! ```

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use air_incident_analytics_models::{
    ColumnCountSpec, DistributionSpec, GroupingSpec, IncidentFilter,
};
use air_incident_render::ChartSpec;
use serde::{Deserialize, Serialize};

use crate::ReportError;

/// The plan bundled with the binary.
const DEFAULT_PLAN_TOML: &str = include_str!("../plans/default.toml");

/// Ordered list of charts to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPlan {
    /// Charts in rendering order.
    pub charts: Vec<PlannedChart>,
}

/// One chart of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedChart {
    /// Look of the chart.
    #[serde(flatten)]
    pub chart: ChartSpec,
    /// Where the numbers come from.
    pub data: ChartSource,
}

/// Data source of a planned chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChartSource {
    /// Cleaned incidents grouped by one or more dimensions.
    Incidents(GroupingSpec),
    /// Positions of cleaned incidents.
    IncidentLocations {
        /// Which incidents to plot.
        #[serde(default)]
        filter: IncidentFilter,
    },
    /// Value counts over a raw table.
    ColumnCounts {
        /// Table name from the dataset definition.
        table: String,
        /// What to count.
        counts: ColumnCountSpec,
    },
    /// Numeric summary of a raw table column.
    ColumnDistribution {
        /// Table name from the dataset definition.
        table: String,
        /// Column and bounds.
        distribution: DistributionSpec,
    },
}

impl ChartSource {
    /// Raw table this source reads, if any.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Incidents(_) | Self::IncidentLocations { .. } => None,
            Self::ColumnCounts { table, .. } | Self::ColumnDistribution { table, .. } => {
                Some(table)
            }
        }
    }
}

impl ChartPlan {
    /// Names of every raw table the plan reads.
    #[must_use]
    pub fn tables(&self) -> BTreeSet<String> {
        self.charts
            .iter()
            .filter_map(|c| c.data.table())
            .map(ToString::to_string)
            .collect()
    }

    /// Looks up a chart by id.
    #[must_use]
    pub fn chart(&self, id: &str) -> Option<&PlannedChart> {
        self.charts.iter().find(|c| c.chart.id == id)
    }

    /// Checks that chart ids are present, unique and usable as file names.
    ///
    /// # Errors
    ///
    /// Returns the offending id as a message.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for planned in &self.charts {
            let id = &planned.chart.id;
            if id.trim().is_empty() {
                return Err("chart id must not be empty".to_string());
            }
            if !id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(format!(
                    "chart id '{id}' may only contain letters, digits, '_' and '-'"
                ));
            }
            if !seen.insert(id.as_str()) {
                return Err(format!("chart id '{id}' is used more than once"));
            }
        }
        Ok(())
    }
}

/// Parses and validates a plan.
///
/// # Errors
///
/// Returns [`ReportError::Plan`] if the TOML is malformed or the plan is
/// inconsistent.
pub fn parse_plan_toml(toml_str: &str) -> Result<ChartPlan, ReportError> {
    let plan: ChartPlan = toml::from_str(toml_str).map_err(|e| ReportError::Plan {
        path: None,
        message: e.to_string(),
    })?;
    plan.validate()
        .map_err(|message| ReportError::Plan { path: None, message })?;
    Ok(plan)
}

/// Returns the bundled plan.
///
/// # Panics
///
/// Panics if the embedded plan is malformed.
#[must_use]
pub fn default_plan() -> ChartPlan {
    parse_plan_toml(DEFAULT_PLAN_TOML)
        .unwrap_or_else(|e| panic!("Failed to parse default.toml: {e}"))
}

/// Reads a plan from `path`, or returns the bundled plan for `None`.
///
/// # Errors
///
/// Returns [`ReportError::Io`] if the file cannot be read and
/// [`ReportError::Plan`] if it is not a valid plan.
pub fn load_plan(path: Option<&Path>) -> Result<ChartPlan, ReportError> {
    let Some(path) = path else {
        return Ok(default_plan());
    };
    let text = std::fs::read_to_string(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_plan_toml(&text).map_err(|e| match e {
        ReportError::Plan { message, .. } => ReportError::Plan {
            path: Some(path.to_path_buf()),
            message,
        },
        other => other,
    })
}
