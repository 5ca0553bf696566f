//! Config-driven dataset definition.
//!
//! [`DatasetDefinition`] captures everything the pipeline needs to know about
//! a published dataset: how its files are named and encoded, the column
//! schema of every table, which occurrence columns feed which cleaned
//! fields, and the geographic bounding box coordinates must fall in.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::SourceError;
use crate::parsing::normalize_column_name;

/// Placeholder that [`TableSchema::file_pattern`] must contain.
pub const YEAR_PLACEHOLDER: &str = "{year}";

// ── Top-level dataset definition ─────────────────────────────────────────

/// A complete description of a yearly-published occurrence dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetDefinition {
    /// Unique identifier (e.g. `"cenipa"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Version of the provider's column schema this definition matches.
    pub schema_version: String,
    /// Landing page of the dataset.
    #[serde(default)]
    pub portal_url: Option<String>,
    /// Encoding label understood by the WHATWG Encoding Standard
    /// (e.g. `"windows-1252"`, `"utf-8"`).
    pub encoding: String,
    /// Single-character field delimiter.
    pub delimiter: String,
    /// Accepted date formats, tried in order.
    pub date_formats: Vec<String>,
    /// Accepted time formats, tried in order.
    pub time_formats: Vec<String>,
    /// Region coordinates must fall in to be trusted.
    #[serde(default)]
    pub bounds: BoundingBox,
    /// The occurrence table.
    pub occurrence: TableSchema,
    /// Mapping of occurrence columns to cleaned fields.
    pub fields: FieldMapping,
    /// Auxiliary tables (aircraft, contributing factors, ...).
    #[serde(default)]
    pub tables: Vec<TableSchema>,
}

/// Schema and file naming of one table.
#[derive(Debug, Clone, Deserialize)]
pub struct TableSchema {
    /// Table name (e.g. `"aeronave"`).
    pub name: String,
    /// File name with a `{year}` placeholder (e.g. `"aeronave_{year}.csv"`).
    pub file_pattern: String,
    /// Expected columns in canonical order.
    pub columns: Vec<String>,
}

/// Maps occurrence columns to [`CleanedIncident`] fields.
///
/// [`CleanedIncident`]: air_incident_source_models::CleanedIncident
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMapping {
    /// Occurrence identifier.
    pub id: String,
    /// Occurrence date.
    pub date: String,
    /// Occurrence time. Absent or empty means midnight.
    pub time: Option<String>,
    /// Latitude in decimal degrees.
    pub latitude: String,
    /// Longitude in decimal degrees.
    pub longitude: String,
    /// Occurrence-type code resolved through the taxonomy.
    pub occurrence_type: String,
    /// Severity classification.
    pub classification: String,
    /// Aircraft model.
    pub aircraft_model: Option<String>,
    /// Aircraft manufacturer.
    pub aircraft_maker: Option<String>,
    /// Operator category.
    pub operator_category: Option<String>,
    /// City.
    pub city: Option<String>,
    /// State code.
    pub state: Option<String>,
    /// Investigation status.
    pub investigation_status: Option<String>,
    /// Number of aircraft involved.
    pub aircraft_involved: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
}

/// Latitude/longitude rectangle in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BoundingBox {
    /// Southern edge.
    pub min_latitude: f64,
    /// Northern edge.
    pub max_latitude: f64,
    /// Western edge.
    pub min_longitude: f64,
    /// Eastern edge.
    pub max_longitude: f64,
}

impl BoundingBox {
    /// Brazil including its oceanic islands.
    pub const BRAZIL: Self = Self {
        min_latitude: -34.0,
        max_latitude: 5.5,
        min_longitude: -74.0,
        max_longitude: -28.5,
    };

    /// Whether the point lies inside the box (edges included).
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&latitude)
            && (self.min_longitude..=self.max_longitude).contains(&longitude)
    }

    /// Center of the box as `(latitude, longitude)`.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            f64::midpoint(self.min_latitude, self.max_latitude),
            f64::midpoint(self.min_longitude, self.max_longitude),
        )
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::BRAZIL
    }
}

/// What to do when two rows share an identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// The row loaded last replaces earlier ones.
    #[default]
    KeepLast,
    /// The first row wins; later ones are dropped.
    Reject,
}

// ── Methods ──────────────────────────────────────────────────────────────

impl TableSchema {
    /// File name of this table for `year`.
    #[must_use]
    pub fn file_name(&self, year: i32) -> String {
        self.file_pattern.replace(YEAR_PLACEHOLDER, &year.to_string())
    }

    /// Path of this table's file for `year` inside `data_dir`.
    #[must_use]
    pub fn file_path(&self, data_dir: &Path, year: i32) -> PathBuf {
        data_dir.join(self.file_name(year))
    }

    /// Extracts the year from a file name matching this table's pattern.
    #[must_use]
    pub fn year_from_file_name(&self, file_name: &str) -> Option<i32> {
        let (prefix, suffix) = self.file_pattern.split_once(YEAR_PLACEHOLDER)?;
        let year = file_name.strip_prefix(prefix)?.strip_suffix(suffix)?;
        if year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit()) {
            year.parse().ok()
        } else {
            None
        }
    }
}

impl FieldMapping {
    /// Every mapped column with the name of the field it feeds.
    #[must_use]
    pub fn columns(&self) -> Vec<(&'static str, &str)> {
        let mut columns = vec![
            ("id", self.id.as_str()),
            ("date", self.date.as_str()),
            ("latitude", self.latitude.as_str()),
            ("longitude", self.longitude.as_str()),
            ("occurrence_type", self.occurrence_type.as_str()),
            ("classification", self.classification.as_str()),
        ];
        let optional = [
            ("time", &self.time),
            ("aircraft_model", &self.aircraft_model),
            ("aircraft_maker", &self.aircraft_maker),
            ("operator_category", &self.operator_category),
            ("city", &self.city),
            ("state", &self.state),
            ("investigation_status", &self.investigation_status),
            ("aircraft_involved", &self.aircraft_involved),
            ("description", &self.description),
        ];
        columns.extend(
            optional
                .into_iter()
                .filter_map(|(field, column)| column.as_deref().map(|c| (field, c))),
        );
        columns
    }
}

impl DatasetDefinition {
    /// Returns the unique dataset identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the human-readable dataset name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up an auxiliary table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Every table, the occurrence table first.
    pub fn all_tables(&self) -> impl Iterator<Item = &TableSchema> {
        std::iter::once(&self.occurrence).chain(self.tables.iter())
    }

    /// Returns the field delimiter as a byte.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Definition`] unless the delimiter is exactly
    /// one ASCII character.
    pub fn delimiter_byte(&self) -> Result<u8, SourceError> {
        match self.delimiter.as_bytes() {
            [byte] if byte.is_ascii() => Ok(*byte),
            _ => Err(SourceError::Definition {
                message: format!(
                    "delimiter must be a single ASCII character, got {:?}",
                    self.delimiter
                ),
            }),
        }
    }

    /// Normalizes column names and checks the definition for internal
    /// consistency.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Definition`] if a file pattern lacks the year
    /// placeholder, a table lists a column twice, a mapped field points at
    /// a column the occurrence table does not have, no date format is
    /// given, or the delimiter/encoding is unusable.
    pub fn validate(mut self) -> Result<Self, SourceError> {
        self.delimiter_byte()?;
        crate::loader::FileFormat::from_definition(&self)?;

        if self.date_formats.is_empty() {
            return Err(SourceError::Definition {
                message: "at least one date format is required".to_string(),
            });
        }

        normalize_schema(&mut self.occurrence)?;
        for table in &mut self.tables {
            normalize_schema(table)?;
        }

        let mut names: Vec<&str> = self.all_tables().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(SourceError::Definition {
                message: format!("table '{}' is defined more than once", pair[0]),
            });
        }

        let fields = self.fields.columns();
        for (field, column) in fields {
            let normalized = normalize_column_name(column);
            if !self.occurrence.columns.contains(&normalized) {
                return Err(SourceError::Definition {
                    message: format!(
                        "field '{field}' maps to column '{column}' which table '{}' does not have",
                        self.occurrence.name
                    ),
                });
            }
        }
        normalize_fields(&mut self.fields);

        Ok(self)
    }
}

fn normalize_schema(table: &mut TableSchema) -> Result<(), SourceError> {
    if !table.file_pattern.contains(YEAR_PLACEHOLDER) {
        return Err(SourceError::Definition {
            message: format!(
                "file pattern '{}' of table '{}' has no {YEAR_PLACEHOLDER} placeholder",
                table.file_pattern, table.name
            ),
        });
    }
    if table.columns.is_empty() {
        return Err(SourceError::Definition {
            message: format!("table '{}' lists no columns", table.name),
        });
    }

    table.columns = table
        .columns
        .iter()
        .map(|c| normalize_column_name(c))
        .collect();

    let mut sorted = table.columns.clone();
    sorted.sort_unstable();
    if let Some(pair) = sorted.windows(2).find(|w| w[0] == w[1]) {
        return Err(SourceError::Definition {
            message: format!(
                "column '{}' is listed more than once in table '{}'",
                pair[0], table.name
            ),
        });
    }
    Ok(())
}

fn normalize_fields(fields: &mut FieldMapping) {
    let required = [
        &mut fields.id,
        &mut fields.date,
        &mut fields.latitude,
        &mut fields.longitude,
        &mut fields.occurrence_type,
        &mut fields.classification,
    ];
    for column in required {
        *column = normalize_column_name(column);
    }
    let optional = [
        &mut fields.time,
        &mut fields.aircraft_model,
        &mut fields.aircraft_maker,
        &mut fields.operator_category,
        &mut fields.city,
        &mut fields.state,
        &mut fields.investigation_status,
        &mut fields.aircraft_involved,
        &mut fields.description,
    ];
    for column in optional.into_iter().flatten() {
        *column = normalize_column_name(column);
    }
}

/// Parses and validates a [`DatasetDefinition`] from a TOML string.
///
/// # Errors
///
/// Returns [`SourceError::Config`] if the TOML is malformed or missing
/// required fields, and [`SourceError::Definition`] if it is inconsistent.
pub fn parse_dataset_toml(toml_str: &str) -> Result<DatasetDefinition, SourceError> {
    let definition: DatasetDefinition =
        toml::de::from_str(toml_str).map_err(|e| SourceError::Config {
            path: None,
            message: e.to_string(),
        })?;
    definition.validate()
}
