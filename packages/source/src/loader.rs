//! Yearly delimited-file loader.
//!
//! Reads one file per year, decodes it from the dataset's declared
//! encoding, checks the header against the table schema and realigns every
//! row to the canonical column order. Any schema mismatch is a
//! [`DataFormatError`] naming the file and year; nothing is silently
//! dropped or shifted.

use std::path::{Path, PathBuf};

use air_incident_source_models::{RawRecord, RawTable, RecordSource};
use encoding_rs::Encoding;

use crate::dataset_def::{DatasetDefinition, TableSchema};
use crate::parsing::normalize_column_name;
use crate::progress::ProgressCallback;
use crate::{DataFormatError, SchemaProblem, SourceError};

/// Byte-level format shared by every file of a dataset.
#[derive(Debug, Clone, Copy)]
pub struct FileFormat {
    /// Text encoding of the files.
    pub encoding: &'static Encoding,
    /// Field delimiter.
    pub delimiter: u8,
}

impl FileFormat {
    /// Builds the format from a dataset definition.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Definition`] if the encoding label is unknown
    /// or the delimiter is not a single ASCII character.
    pub fn from_definition(definition: &DatasetDefinition) -> Result<Self, SourceError> {
        let encoding = Encoding::for_label(definition.encoding.trim().as_bytes()).ok_or_else(|| {
            SourceError::Definition {
                message: format!("unknown encoding label '{}'", definition.encoding),
            }
        })?;
        Ok(Self {
            encoding,
            delimiter: definition.delimiter_byte()?,
        })
    }
}

/// Loads a single year's file of `schema`.
///
/// The file is read into memory in one go and the handle is released
/// before parsing starts.
///
/// # Errors
///
/// Returns [`SourceError::Io`] if the file cannot be read and
/// [`SourceError::DataFormat`] if its header or any row does not match the
/// schema.
pub fn load_file(
    path: &Path,
    year: i32,
    schema: &TableSchema,
    format: FileFormat,
) -> Result<RawTable, SourceError> {
    let bytes = std::fs::read(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let (text, actual_encoding, had_errors) = format.encoding.decode(&bytes);
    if actual_encoding != format.encoding {
        log::debug!(
            "{}: byte order mark overrides declared encoding, decoding as {}",
            path.display(),
            actual_encoding.name()
        );
    }
    if had_errors {
        log::warn!(
            "{}: malformed {} sequences replaced with U+FFFD",
            path.display(),
            actual_encoding.name()
        );
    }

    parse_table(text.as_bytes(), path, year, schema, format.delimiter)
}

/// Parses decoded file contents into a table aligned to `schema`.
fn parse_table(
    data: &[u8],
    path: &Path,
    year: i32,
    schema: &TableSchema,
    delimiter: u8,
) -> Result<RawTable, SourceError> {
    let format_error = |problem: SchemaProblem| {
        SourceError::DataFormat(DataFormatError {
            table: schema.name.clone(),
            path: path.to_path_buf(),
            year,
            problem,
        })
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(data);

    let header: Vec<String> = reader
        .headers()
        .map_err(|e| {
            format_error(SchemaProblem::Malformed {
                line: 1,
                message: e.to_string(),
            })
        })?
        .iter()
        .map(normalize_column_name)
        .collect();

    if header.iter().all(String::is_empty) {
        return Err(format_error(SchemaProblem::EmptyHeader));
    }

    let positions = align_columns(&header, &schema.columns).map_err(format_error)?;

    let mut table = RawTable::new(schema.name.clone(), schema.columns.clone());
    table.sources.push(RecordSource {
        year,
        path: path.to_path_buf(),
    });

    for (i, result) in reader.records().enumerate() {
        let fallback_line = i as u64 + 2;
        let record = result.map_err(|e| {
            format_error(SchemaProblem::Malformed {
                line: e.position().map_or(fallback_line, csv::Position::line),
                message: e.to_string(),
            })
        })?;
        let line = record.position().map_or(fallback_line, csv::Position::line);

        if record.len() != header.len() {
            return Err(format_error(SchemaProblem::FieldCount {
                line,
                expected: header.len(),
                found: record.len(),
            }));
        }

        let values = positions
            .iter()
            .map(|&pos| record.get(pos).unwrap_or_default().trim().to_string())
            .collect();

        table.records.push(RawRecord {
            source: 0,
            line,
            values,
        });
    }

    log::debug!(
        "Parsed {} rows of '{}' from {}",
        table.len(),
        schema.name,
        path.display()
    );

    Ok(table)
}

/// For each expected column, finds its position in the file header.
///
/// Fails unless the header holds exactly the expected columns, in any
/// order.
fn align_columns(header: &[String], expected: &[String]) -> Result<Vec<usize>, SchemaProblem> {
    let mut seen: Vec<&str> = Vec::with_capacity(header.len());
    for column in header {
        if seen.contains(&column.as_str()) {
            return Err(SchemaProblem::DuplicateColumn {
                column: column.clone(),
            });
        }
        seen.push(column);
    }

    let missing: Vec<String> = expected
        .iter()
        .filter(|c| !header.contains(c))
        .cloned()
        .collect();
    let unexpected: Vec<String> = header
        .iter()
        .filter(|c| !expected.contains(c))
        .cloned()
        .collect();

    if !missing.is_empty() || !unexpected.is_empty() {
        return Err(SchemaProblem::ColumnMismatch {
            missing,
            unexpected,
        });
    }

    Ok(expected
        .iter()
        .filter_map(|c| header.iter().position(|h| h == c))
        .collect())
}

/// One file to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearFile {
    /// Dataset year.
    pub year: i32,
    /// Path to the file.
    pub path: PathBuf,
}

/// Builds the list of files of `schema` for `years` inside `data_dir`.
#[must_use]
pub fn year_files(data_dir: &Path, schema: &TableSchema, years: &[i32]) -> Vec<YearFile> {
    years
        .iter()
        .map(|&year| YearFile {
            year,
            path: schema.file_path(data_dir, year),
        })
        .collect()
}

/// Loads and concatenates several yearly files of the same table.
///
/// Stops at the first file that fails; a schema mismatch in any year
/// aborts the whole load.
///
/// # Errors
///
/// Returns the first [`SourceError`] encountered.
pub fn load_years(
    files: &[YearFile],
    schema: &TableSchema,
    format: FileFormat,
    progress: &dyn ProgressCallback,
) -> Result<RawTable, SourceError> {
    let mut combined = RawTable::new(schema.name.clone(), schema.columns.clone());
    progress.set_total(files.len() as u64);

    for file in files {
        progress.set_message(format!("{} {}", schema.name, file.year));
        let table = load_file(&file.path, file.year, schema, format)?;
        log::info!(
            "[{}] {}: {} rows from {}",
            schema.name,
            file.year,
            table.len(),
            file.path.display()
        );
        combined.append(table);
        progress.inc(1);
    }

    progress.finish(format!(
        "[{}] loaded {} rows from {} file(s)",
        schema.name,
        combined.len(),
        files.len()
    ));

    Ok(combined)
}

/// Lists the years for which `schema` has a file in `data_dir`, ascending.
///
/// # Errors
///
/// Returns [`SourceError::Io`] if the directory cannot be read.
pub fn discover_years(data_dir: &Path, schema: &TableSchema) -> Result<Vec<i32>, SourceError> {
    let io_error = |source| SourceError::Io {
        path: data_dir.to_path_buf(),
        source,
    };

    let mut years = Vec::new();
    for entry in std::fs::read_dir(data_dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        if let Some(name) = entry.file_name().to_str()
            && let Some(year) = schema.year_from_file_name(name)
        {
            years.push(year);
        }
    }
    years.sort_unstable();
    years.dedup();
    Ok(years)
}
