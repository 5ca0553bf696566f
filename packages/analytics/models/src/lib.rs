#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Aggregation requests and result types.
//!
//! A [`GroupingSpec`] names the [`Dimension`]s to group cleaned incidents
//! by; the aggregator answers it with a [`SummaryTable`]. Column counts over
//! auxiliary tables produce the same table type with a
//! [`Dimension::Column`], and numeric columns summarize to a
//! [`Distribution`].

use std::collections::BTreeMap;

use air_incident_occurrence_models::OccurrenceClass;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// Label of the bucket holding incidents without a valid location.
pub const UNLOCATED_LABEL: &str = "unlocated";

// ── Dimensions and group values ──────────────────────────────────────────

/// Something records can be grouped by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Dimension {
    /// Calendar month of the occurrence.
    Month,
    /// Calendar year of the occurrence.
    Year,
    /// Resolved occurrence-type label.
    OccurrenceType,
    /// Parent category of the occurrence type.
    OccurrenceCategory,
    /// Severity classification.
    Classification,
    /// Latitude/longitude grid cell.
    GeoBucket {
        /// Edge length of a cell in degrees.
        size_degrees: f64,
    },
    /// State code.
    State,
    /// Raw value of a table column.
    Column {
        /// Column name, or several names joined for combined values.
        name: String,
    },
}

impl Dimension {
    /// Whether values of this dimension are ordered chronologically and
    /// gap-filled.
    #[must_use]
    pub const fn is_temporal(&self) -> bool {
        matches!(self, Self::Month | Self::Year)
    }

    /// Axis title for this dimension.
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::Month => "month".to_string(),
            Self::Year => "year".to_string(),
            Self::OccurrenceType => "occurrence type".to_string(),
            Self::OccurrenceCategory => "occurrence category".to_string(),
            Self::Classification => "classification".to_string(),
            Self::GeoBucket { size_degrees } => format!("{size_degrees}° cell"),
            Self::State => "state".to_string(),
            Self::Column { name } => name.clone(),
        }
    }
}

/// One value of a [`Dimension`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupValue {
    /// A calendar month.
    Month {
        /// Year.
        year: i32,
        /// Month, 1-12.
        month: u32,
    },
    /// A calendar year.
    Year {
        /// Year.
        year: i32,
    },
    /// A categorical label.
    Category {
        /// Label text.
        label: String,
    },
    /// A grid cell identified by the index of its south-west corner.
    GeoCell {
        /// `floor(latitude / size)`.
        lat_index: i32,
        /// `floor(longitude / size)`.
        lng_index: i32,
        /// Cell size in thousandths of a degree.
        size_millidegrees: u32,
    },
    /// Incidents without a valid location.
    Unlocated,
}

impl GroupValue {
    /// Builds a categorical value.
    #[must_use]
    pub fn category(label: impl Into<String>) -> Self {
        Self::Category {
            label: label.into(),
        }
    }

    /// Human-readable label, also used as the baseline key.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Month { year, month } => format!("{year:04}-{month:02}"),
            Self::Year { year } => year.to_string(),
            Self::Category { label } => label.clone(),
            Self::GeoCell { .. } => {
                let (lat, lng) = self.cell_origin().unwrap_or_default();
                format!("{lat:.3},{lng:.3}")
            }
            Self::Unlocated => UNLOCATED_LABEL.to_string(),
        }
    }

    /// South-west corner of a grid cell in degrees.
    #[must_use]
    pub fn cell_origin(&self) -> Option<(f64, f64)> {
        match *self {
            Self::GeoCell {
                lat_index,
                lng_index,
                size_millidegrees,
            } => {
                let size = f64::from(size_millidegrees) / 1000.0;
                Some((f64::from(lat_index) * size, f64::from(lng_index) * size))
            }
            _ => None,
        }
    }

    /// Center of a grid cell in degrees.
    #[must_use]
    pub fn cell_center(&self) -> Option<(f64, f64)> {
        let Self::GeoCell {
            size_millidegrees, ..
        } = *self
        else {
            return None;
        };
        let half = f64::from(size_millidegrees) / 2000.0;
        self.cell_origin().map(|(lat, lng)| (lat + half, lng + half))
    }
}

impl std::fmt::Display for GroupValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

// ── Summary tables ───────────────────────────────────────────────────────

/// One group of a [`SummaryTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRow {
    /// One value per dimension of the table.
    pub key: Vec<GroupValue>,
    /// Number of records in the group.
    pub count: u64,
    /// `count / exposure * scale` when a baseline covers the group.
    pub rate: Option<f64>,
}

/// Counts per group, ordered for charting.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryTable {
    /// Dimensions in key order.
    pub dimensions: Vec<Dimension>,
    /// Groups, ordered by the first dimension, then the next.
    pub rows: Vec<SummaryRow>,
}

/// Points of one line or bar series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    /// Series name, the value of the second dimension (or the table's
    /// first dimension for single-dimension tables).
    pub name: String,
    /// `(label, count)` pairs in row order.
    pub points: Vec<(String, u64)>,
}

impl SummaryTable {
    /// Sum of all counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.rows.iter().map(|r| r.count).sum()
    }

    /// Whether the table has no groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Count of the group whose key labels equal `labels`.
    #[must_use]
    pub fn count_of(&self, labels: &[&str]) -> Option<u64> {
        self.rows
            .iter()
            .find(|r| {
                r.key.len() == labels.len()
                    && r.key.iter().zip(labels).all(|(k, l)| k.label() == *l)
            })
            .map(|r| r.count)
    }

    /// Splits the table into series.
    ///
    /// Single-dimension tables yield one series. For two or more
    /// dimensions, rows are grouped by their second key value (in first
    /// appearance order) and labeled by their first.
    #[must_use]
    pub fn series(&self) -> Vec<Series> {
        if self.dimensions.len() < 2 {
            let name = self
                .dimensions
                .first()
                .map_or_else(String::new, Dimension::title);
            return vec![Series {
                name,
                points: self
                    .rows
                    .iter()
                    .map(|r| (key_label(&r.key, 0), r.count))
                    .collect(),
            }];
        }

        let mut series: Vec<Series> = Vec::new();
        for row in &self.rows {
            let name = key_label(&row.key, 1);
            let point = (key_label(&row.key, 0), row.count);
            match series.iter_mut().find(|s| s.name == name) {
                Some(s) => s.points.push(point),
                None => series.push(Series {
                    name,
                    points: vec![point],
                }),
            }
        }
        series
    }
}

fn key_label(key: &[GroupValue], idx: usize) -> String {
    key.get(idx).map(GroupValue::label).unwrap_or_default()
}

// ── Incident grouping ────────────────────────────────────────────────────

/// Restricts which incidents are aggregated. Empty fields match everything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IncidentFilter {
    /// Keep only these classifications.
    pub classifications: Vec<OccurrenceClass>,
    /// Keep occurrences on or after this date.
    pub since: Option<NaiveDate>,
    /// Keep occurrences before this date.
    pub until: Option<NaiveDate>,
    /// Keep only incidents with a valid location.
    pub located_only: bool,
}

/// What to group cleaned incidents by.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupingSpec {
    /// Dimensions in key order; at least one.
    pub dimensions: Vec<Dimension>,
    /// Which incidents to include.
    #[serde(default)]
    pub filter: IncidentFilter,
    /// Keep only the `n` largest values of each categorical dimension.
    #[serde(default)]
    pub top: Option<usize>,
    /// Exposure used to compute rates. Supplied at run time.
    #[serde(skip)]
    pub baseline: Option<Baseline>,
}

impl GroupingSpec {
    /// Spec grouping by the given dimensions with no filter.
    #[must_use]
    pub const fn new(dimensions: Vec<Dimension>) -> Self {
        Self {
            dimensions,
            filter: IncidentFilter {
                classifications: Vec::new(),
                since: None,
                until: None,
                located_only: false,
            },
            top: None,
            baseline: None,
        }
    }
}

/// Exposure per dimension value, for rate normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// Exposure keyed by the label of the first key value (e.g. `"2020"`).
    pub exposure: BTreeMap<String, f64>,
    /// Multiplier applied to every rate (e.g. `100_000.0` for "per 100k
    /// flight hours").
    pub scale: f64,
}

impl Baseline {
    /// Rate of `count` events against the exposure of `label`.
    ///
    /// `None` when the label has no exposure or the exposure is not
    /// positive.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rate(&self, label: &str, count: u64) -> Option<f64> {
        self.exposure
            .get(label)
            .filter(|e| **e > 0.0)
            .map(|exposure| count as f64 / exposure * self.scale)
    }
}

/// A plottable incident position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentLocation {
    /// Occurrence identifier.
    pub id: String,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Popup text (the city, when known).
    pub label: Option<String>,
    /// Severity classification.
    pub classification: OccurrenceClass,
}

// ── Column statistics ────────────────────────────────────────────────────

/// Include/exclude condition on one column of a raw table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnFilter {
    /// Column to test.
    pub column: String,
    /// The value must be one of these (when non-empty).
    pub include: Vec<String>,
    /// The value must not be one of these.
    pub exclude: Vec<String>,
}

impl ColumnFilter {
    /// Whether a (trimmed) value passes the filter.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        let value = value.trim();
        (self.include.is_empty() || self.include.iter().any(|v| v == value))
            && !self.exclude.iter().any(|v| v == value)
    }
}

fn default_separator() -> String {
    " ".to_string()
}

/// Value counts of one column, or of several columns joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCountSpec {
    /// Columns whose values are counted; several are joined with
    /// `separator`.
    pub columns: Vec<String>,
    /// Joiner for multi-column values.
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Rows must pass every filter.
    #[serde(default)]
    pub filters: Vec<ColumnFilter>,
    /// Keep only the part of the value before this separator
    /// (e.g. `"|"` turns `"OUTROS | OTHR"` into `"OUTROS"`).
    #[serde(default)]
    pub split_before: Option<String>,
    /// Keep only the `n` most frequent values.
    #[serde(default)]
    pub top: Option<usize>,
}

impl ColumnCountSpec {
    /// Counts of a single column.
    #[must_use]
    pub fn of(column: impl Into<String>) -> Self {
        Self {
            columns: vec![column.into()],
            separator: default_separator(),
            filters: Vec::new(),
            split_before: None,
            top: None,
        }
    }
}

/// Numeric summary of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSpec {
    /// Numeric column.
    pub column: String,
    /// Rows must pass every filter.
    #[serde(default)]
    pub filters: Vec<ColumnFilter>,
    /// Keep values strictly greater than this.
    #[serde(default)]
    pub greater_than: Option<f64>,
    /// Keep values strictly less than this.
    #[serde(default)]
    pub less_than: Option<f64>,
}

/// `describe()`-style summary of a numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    /// Column the values came from.
    pub column: String,
    /// Number of values.
    pub count: u64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample standard deviation, `None` for fewer than two values.
    pub std_dev: Option<f64>,
    /// Smallest value.
    pub min: f64,
    /// 25th percentile.
    pub q1: f64,
    /// 50th percentile.
    pub median: f64,
    /// 75th percentile.
    pub q3: f64,
    /// Largest value.
    pub max: f64,
}

impl Distribution {
    /// `[min, q1, median, q3, max]`, the five numbers of a box plot.
    #[must_use]
    pub const fn five_numbers(&self) -> [f64; 5] {
        [self.min, self.q1, self.median, self.q3, self.max]
    }
}
