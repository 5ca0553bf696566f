//! Dataset and taxonomy registry.
//!
//! The bundled dataset definitions and the ICAO occurrence-type taxonomy
//! are baked into the binary with [`include_str!`]. Callers can override
//! either one with a file on disk.

use std::path::Path;

use air_incident_occurrence_models::Taxonomy;

use crate::SourceError;
use crate::dataset_def::{DatasetDefinition, parse_dataset_toml};

/// Dataset definitions embedded at compile time.
const DATASET_TOMLS: &[(&str, &str)] = &[("cenipa", include_str!("../datasets/cenipa.toml"))];

/// Identifier of the dataset used when none is requested.
pub const DEFAULT_DATASET: &str = "cenipa";

/// The bundled ICAO occurrence-category taxonomy.
const TAXONOMY_TOML: &str = include_str!("../taxonomy/icao.toml");

/// Returns every bundled dataset definition.
///
/// # Panics
///
/// Panics if an embedded TOML config is malformed.
#[must_use]
pub fn all_datasets() -> Vec<DatasetDefinition> {
    DATASET_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_dataset_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Looks up a bundled dataset by id.
#[must_use]
pub fn dataset(id: &str) -> Option<DatasetDefinition> {
    all_datasets().into_iter().find(|d| d.id == id)
}

/// Returns the default bundled dataset.
///
/// # Panics
///
/// Panics if the embedded default dataset config is missing or malformed.
#[must_use]
pub fn default_dataset() -> DatasetDefinition {
    dataset(DEFAULT_DATASET)
        .unwrap_or_else(|| panic!("Bundled dataset '{DEFAULT_DATASET}' is missing"))
}

/// Returns the bundled taxonomy.
///
/// # Panics
///
/// Panics if the embedded taxonomy is malformed.
#[must_use]
pub fn default_taxonomy() -> Taxonomy {
    parse_taxonomy_toml(TAXONOMY_TOML, None)
        .unwrap_or_else(|e| panic!("Failed to parse icao.toml: {e}"))
}

/// Reads a dataset definition from `path`, or returns the default when
/// `path` is `None`.
///
/// # Errors
///
/// Returns [`SourceError::Io`] if the file cannot be read and
/// [`SourceError::Config`]/[`SourceError::Definition`] if it is invalid.
pub fn load_dataset(path: Option<&Path>) -> Result<DatasetDefinition, SourceError> {
    let Some(path) = path else {
        return Ok(default_dataset());
    };
    let text = read_config(path)?;
    parse_dataset_toml(&text).map_err(|e| match e {
        SourceError::Config { message, .. } => SourceError::Config {
            path: Some(path.to_path_buf()),
            message,
        },
        other => other,
    })
}

/// Reads a taxonomy from `path`, or returns the bundled one when `path` is
/// `None`.
///
/// # Errors
///
/// Returns [`SourceError::Io`] if the file cannot be read and
/// [`SourceError::Config`] if it is malformed or lists a code twice.
pub fn load_taxonomy(path: Option<&Path>) -> Result<Taxonomy, SourceError> {
    match path {
        None => Ok(default_taxonomy()),
        Some(path) => parse_taxonomy_toml(&read_config(path)?, Some(path)),
    }
}

fn parse_taxonomy_toml(text: &str, path: Option<&Path>) -> Result<Taxonomy, SourceError> {
    toml::de::from_str(text).map_err(|e| SourceError::Config {
        path: path.map(Path::to_path_buf),
        message: e.to_string(),
    })
}

fn read_config(path: &Path) -> Result<String, SourceError> {
    std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })
}
