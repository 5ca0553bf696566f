#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Raw tables, the canonical cleaned incident format and the cleaning report.
//!
//! The loader produces a [`RawTable`] per dataset table; the cleaner turns
//! the occurrence table into [`CleanedIncident`]s and a [`CleaningReport`]
//! that accounts for every row it did not keep.

use std::collections::BTreeMap;
use std::path::PathBuf;

use air_incident_occurrence_models::{OccurrenceClass, OccurrenceType};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Where a group of raw rows came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSource {
    /// Dataset year of the file.
    pub year: i32,
    /// Path of the file on disk.
    pub path: PathBuf,
}

/// One data row of a delimited file, aligned to the table's canonical
/// column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    /// Index into [`RawTable::sources`].
    pub source: usize,
    /// 1-based line number in the source file (the header is line 1).
    pub line: u64,
    /// Field values in canonical column order.
    pub values: Vec<String>,
}

/// A table of raw string values combined from one or more yearly files.
///
/// Every row is aligned to `columns`, which follow the dataset schema and
/// are identical for every year.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTable {
    /// Table name from the dataset definition (e.g. `"ocorrencia"`).
    pub name: String,
    /// Canonical column names.
    pub columns: Vec<String>,
    /// Files that contributed rows.
    pub sources: Vec<RecordSource>,
    /// Rows of all files in load order.
    pub records: Vec<RawRecord>,
}

impl RawTable {
    /// Creates an empty table with the given schema.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            sources: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Returns the position of `column`, if the table has it.
    #[must_use]
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Returns the value of `column` in `record`.
    #[must_use]
    pub fn value<'a>(&self, record: &'a RawRecord, column: &str) -> Option<&'a str> {
        let idx = self.column_index(column)?;
        record.values.get(idx).map(String::as_str)
    }

    /// Returns the source of `record`.
    #[must_use]
    pub fn source_of(&self, record: &RawRecord) -> Option<&RecordSource> {
        self.sources.get(record.source)
    }

    /// Returns the dataset year of `record`.
    #[must_use]
    pub fn year_of(&self, record: &RawRecord) -> Option<i32> {
        self.source_of(record).map(|s| s.year)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends all rows of `other`, remapping their source indices.
    ///
    /// Both tables must share the same columns; callers check the schema
    /// before merging.
    pub fn append(&mut self, other: Self) {
        let offset = self.sources.len();
        self.sources.extend(other.sources);
        self.records
            .extend(other.records.into_iter().map(|mut record| {
                record.source += offset;
                record
            }));
    }
}

/// How far a record's coordinates can be trusted.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordinateStatus {
    /// Both coordinates parsed and fall inside the bounding box.
    Valid,
    /// One or both coordinates were absent.
    Missing,
    /// Coordinates parsed but lie outside the bounding box.
    OutOfRange,
}

/// An occurrence after cleaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanedIncident {
    /// Provider identifier of the occurrence.
    pub id: String,
    /// Dataset year the record was loaded from.
    pub year: i32,
    /// Date and time of the occurrence (midnight when no time was given).
    pub occurred_at: NaiveDateTime,
    /// Latitude as parsed, even when out of range.
    pub latitude: Option<f64>,
    /// Longitude as parsed, even when out of range.
    pub longitude: Option<f64>,
    /// Trust level of `latitude`/`longitude`.
    pub coordinates: CoordinateStatus,
    /// Occurrence type resolved through the taxonomy.
    pub occurrence_type: OccurrenceType,
    /// Severity classification.
    pub classification: OccurrenceClass,
    /// Aircraft model.
    pub aircraft_model: Option<String>,
    /// Aircraft manufacturer.
    pub aircraft_maker: Option<String>,
    /// Operator category (e.g. `"PARTICULAR"`).
    pub operator_category: Option<String>,
    /// City of the occurrence.
    pub city: Option<String>,
    /// Two-letter state code.
    pub state: Option<String>,
    /// Investigation status (e.g. `"FINALIZADA"`).
    pub investigation_status: Option<String>,
    /// Number of aircraft involved.
    pub aircraft_involved: Option<u32>,
    /// Free-text description.
    pub description: Option<String>,
}

impl CleanedIncident {
    /// Returns `(latitude, longitude)` only when the coordinates are valid.
    #[must_use]
    pub fn location(&self) -> Option<(f64, f64)> {
        match (self.coordinates, self.latitude, self.longitude) {
            (CoordinateStatus::Valid, Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }
}

/// A per-row problem that excludes the row from the cleaned output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseError {
    /// The identifier field was empty.
    #[error("missing identifier")]
    MissingIdentifier,
    /// The date field was empty or did not match any accepted format.
    #[error("invalid date '{value}'")]
    InvalidDate {
        /// Raw field value.
        value: String,
    },
    /// The time field was present but could not be parsed.
    #[error("invalid time '{value}'")]
    InvalidTime {
        /// Raw field value.
        value: String,
    },
    /// A coordinate field held text that is not a number.
    #[error("invalid {field} '{value}'")]
    InvalidCoordinate {
        /// Column that held the value.
        field: String,
        /// Raw field value.
        value: String,
    },
}

/// Pointer back to a raw row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowRef {
    /// Dataset year.
    pub year: i32,
    /// Source file.
    pub path: PathBuf,
    /// Line number in the source file.
    pub line: u64,
}

/// A row excluded by the cleaner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcludedRow {
    /// Where the row came from.
    pub row: RowRef,
    /// Identifier, if the row had one.
    pub id: Option<String>,
    /// Why it was excluded.
    pub error: ParseError,
}

/// A kept row whose coordinates fall outside the bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedCoordinate {
    /// Where the row came from.
    pub row: RowRef,
    /// Identifier of the occurrence.
    pub id: String,
    /// Parsed latitude.
    pub latitude: f64,
    /// Parsed longitude.
    pub longitude: f64,
}

/// Two rows sharing one identifier and how the conflict was settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateResolution {
    /// The shared identifier.
    pub id: String,
    /// Row that stayed in the cleaned output.
    pub kept: RowRef,
    /// Row that was dropped.
    pub dropped: RowRef,
}

/// Account of everything the cleaner excluded or flagged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleaningReport {
    /// Rows handed to the cleaner.
    pub input_rows: u64,
    /// Rows in the cleaned output.
    pub cleaned_rows: u64,
    /// Rows excluded because of a [`ParseError`].
    pub excluded: Vec<ExcludedRow>,
    /// Kept rows with out-of-range coordinates.
    pub flagged_coordinates: Vec<FlaggedCoordinate>,
    /// Kept rows without coordinates.
    pub missing_coordinates: u64,
    /// Unknown occurrence-type codes and how often each appeared.
    pub unknown_type_codes: BTreeMap<String, u64>,
    /// Kept rows with an empty occurrence-type code.
    pub missing_type_codes: u64,
    /// Kept rows whose classification was not recognized.
    pub unclassified: u64,
    /// Duplicate identifiers and which row was kept.
    pub duplicates: Vec<DuplicateResolution>,
}

impl CleaningReport {
    /// Number of rows excluded by parse errors.
    #[must_use]
    pub fn excluded_count(&self) -> u64 {
        self.excluded.len() as u64
    }

    /// Excluded rows per dataset year.
    #[must_use]
    pub fn excluded_by_year(&self) -> BTreeMap<i32, u64> {
        let mut map = BTreeMap::new();
        for row in &self.excluded {
            *map.entry(row.row.year).or_insert(0) += 1;
        }
        map
    }

    /// Total number of kept rows with an unknown or empty type code.
    #[must_use]
    pub fn unknown_type_count(&self) -> u64 {
        self.unknown_type_codes.values().sum::<u64>() + self.missing_type_codes
    }

    /// Whether nothing was excluded, flagged or deduplicated.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.excluded.is_empty()
            && self.flagged_coordinates.is_empty()
            && self.duplicates.is_empty()
            && self.unknown_type_count() == 0
            && self.unclassified == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, year: i32, ids: &[&str]) -> RawTable {
        let mut t = RawTable::new(name, vec!["id".to_string(), "value".to_string()]);
        t.sources.push(RecordSource {
            year,
            path: PathBuf::from(format!("{name}_{year}.csv")),
        });
        for (i, id) in ids.iter().enumerate() {
            t.records.push(RawRecord {
                source: 0,
                line: i as u64 + 2,
                values: vec![(*id).to_string(), format!("v{i}")],
            });
        }
        t
    }

    #[test]
    fn append_remaps_sources() {
        let mut a = table("t", 2019, &["1", "2"]);
        let b = table("t", 2020, &["3"]);
        a.append(b);
        assert_eq!(a.len(), 3);
        assert_eq!(a.year_of(&a.records[0]), Some(2019));
        assert_eq!(a.year_of(&a.records[2]), Some(2020));
        assert_eq!(a.value(&a.records[2], "id"), Some("3"));
        assert_eq!(a.value(&a.records[2], "nope"), None);
    }

    #[test]
    fn location_requires_valid_status() {
        let mut incident = CleanedIncident {
            id: "1".to_string(),
            year: 2020,
            occurred_at: chrono::NaiveDate::from_ymd_opt(2020, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            latitude: Some(0.0),
            longitude: Some(0.0),
            coordinates: CoordinateStatus::OutOfRange,
            occurrence_type: OccurrenceType::Unknown { code: None },
            classification: OccurrenceClass::Incident,
            aircraft_model: None,
            aircraft_maker: None,
            operator_category: None,
            city: None,
            state: None,
            investigation_status: None,
            aircraft_involved: None,
            description: None,
        };
        assert_eq!(incident.location(), None);

        incident.latitude = Some(-15.0);
        incident.longitude = Some(-47.0);
        incident.coordinates = CoordinateStatus::Valid;
        assert_eq!(incident.location(), Some((-15.0, -47.0)));
    }

    #[test]
    fn report_counts_by_year() {
        let row = |year| ExcludedRow {
            row: RowRef {
                year,
                path: PathBuf::from("x.csv"),
                line: 2,
            },
            id: None,
            error: ParseError::MissingIdentifier,
        };
        let report = CleaningReport {
            excluded: vec![row(2019), row(2019), row(2020)],
            ..CleaningReport::default()
        };
        assert_eq!(report.excluded_count(), 3);
        let by_year = report.excluded_by_year();
        assert_eq!(by_year[&2019], 2);
        assert_eq!(by_year[&2020], 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn parse_error_serializes_with_kind_tag() {
        let json = serde_json::to_value(ParseError::InvalidDate {
            value: "31/02/2020".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "invalid_date");
        assert_eq!(json["value"], "31/02/2020");
    }
}
