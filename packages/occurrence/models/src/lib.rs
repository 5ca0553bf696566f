#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Occurrence classification and occurrence-type taxonomy types.
//!
//! Every yearly occurrence file carries a severity classification and an
//! occurrence-type code. This crate defines the canonical classification
//! enum and the [`Taxonomy`] value that resolves type codes to
//! human-readable labels. The taxonomy is an explicit immutable value so
//! callers (and tests) can substitute their own.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Label given to occurrence-type codes that are absent from the taxonomy.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Severity classification of an occurrence as published by the
/// investigation authority.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OccurrenceClass {
    /// Accident (`ACIDENTE`).
    Accident,
    /// Serious incident (`INCIDENTE GRAVE`).
    SeriousIncident,
    /// Incident (`INCIDENTE`).
    Incident,
    /// Classification missing or not recognized.
    Unclassified,
}

impl OccurrenceClass {
    /// Maps the provider's Portuguese classification string to a class.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    /// Anything unrecognized maps to [`Self::Unclassified`].
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        let normalized = raw.trim().to_uppercase();
        match normalized.split_whitespace().collect::<Vec<_>>().as_slice() {
            ["ACIDENTE"] => Self::Accident,
            ["INCIDENTE", "GRAVE"] => Self::SeriousIncident,
            ["INCIDENTE"] => Self::Incident,
            _ => Self::Unclassified,
        }
    }

    /// Returns the provider's spelling of this class.
    #[must_use]
    pub const fn raw_label(self) -> &'static str {
        match self {
            Self::Accident => "ACIDENTE",
            Self::SeriousIncident => "INCIDENTE GRAVE",
            Self::Incident => "INCIDENTE",
            Self::Unclassified => "SEM CLASSIFICACAO",
        }
    }

    /// Severity rank, higher is more severe. Unclassified is `0`.
    #[must_use]
    pub const fn severity(self) -> u8 {
        match self {
            Self::Accident => 3,
            Self::SeriousIncident => 2,
            Self::Incident => 1,
            Self::Unclassified => 0,
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Accident,
            Self::SeriousIncident,
            Self::Incident,
            Self::Unclassified,
        ]
    }
}

/// One code of the occurrence-type taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyEntry {
    /// Code as it appears in the data (e.g. `"LOC-I"`).
    pub code: String,
    /// Human-readable label (e.g. `"Loss of control in flight"`).
    pub label: String,
    /// Broader grouping the code belongs to.
    pub category: String,
}

/// Serialized form of a [`Taxonomy`]: a flat list of entries.
#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomyFile {
    /// Taxonomy entries.
    pub entries: Vec<TaxonomyEntry>,
}

/// Error returned when a taxonomy definition lists the same code twice.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("taxonomy code '{code}' is defined more than once")]
pub struct DuplicateCodeError {
    /// The code that appeared more than once.
    pub code: String,
}

/// Fixed mapping from occurrence-type codes to labels.
///
/// Codes are matched case-insensitively after trimming.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "TaxonomyFile")]
pub struct Taxonomy {
    entries: BTreeMap<String, TaxonomyEntry>,
}

impl TryFrom<TaxonomyFile> for Taxonomy {
    type Error = DuplicateCodeError;

    fn try_from(file: TaxonomyFile) -> Result<Self, Self::Error> {
        Self::new(file.entries)
    }
}

impl Taxonomy {
    /// Builds a taxonomy from its entries.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateCodeError`] if two entries share a code.
    pub fn new(entries: Vec<TaxonomyEntry>) -> Result<Self, DuplicateCodeError> {
        let mut map = BTreeMap::new();
        for entry in entries {
            let key = normalize_code(&entry.code);
            if map.contains_key(&key) {
                return Err(DuplicateCodeError { code: entry.code });
            }
            map.insert(key, entry);
        }
        Ok(Self { entries: map })
    }

    /// Resolves a raw code to an [`OccurrenceType`].
    ///
    /// Empty codes and codes absent from the taxonomy resolve to
    /// [`OccurrenceType::Unknown`]; nothing is dropped.
    #[must_use]
    pub fn resolve(&self, raw_code: &str) -> OccurrenceType {
        let key = normalize_code(raw_code);
        if key.is_empty() {
            return OccurrenceType::Unknown { code: None };
        }
        self.entries.get(&key).map_or_else(
            || OccurrenceType::Unknown { code: Some(key.clone()) },
            |entry| OccurrenceType::Known {
                code: entry.code.clone(),
                label: entry.label.clone(),
                category: entry.category.clone(),
            },
        )
    }

    /// Looks up an entry by code.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&TaxonomyEntry> {
        self.entries.get(&normalize_code(code))
    }

    /// Iterates entries ordered by code.
    pub fn entries(&self) -> impl Iterator<Item = &TaxonomyEntry> {
        self.entries.values()
    }

    /// Number of codes in the taxonomy.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the taxonomy has no codes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// An occurrence type after resolution through the [`Taxonomy`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OccurrenceType {
    /// The code is present in the taxonomy.
    Known {
        /// Code from the taxonomy.
        code: String,
        /// Human-readable label.
        label: String,
        /// Parent category.
        category: String,
    },
    /// The code is missing or not part of the taxonomy.
    Unknown {
        /// Raw code as found in the data, `None` if the field was empty.
        code: Option<String>,
    },
}

impl OccurrenceType {
    /// Human-readable label, [`UNKNOWN_LABEL`] for unknown codes.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Known { label, .. } => label,
            Self::Unknown { .. } => UNKNOWN_LABEL,
        }
    }

    /// Parent category, [`UNKNOWN_LABEL`] for unknown codes.
    #[must_use]
    pub fn category(&self) -> &str {
        match self {
            Self::Known { category, .. } => category,
            Self::Unknown { .. } => UNKNOWN_LABEL,
        }
    }

    /// Raw code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Known { code, .. } => Some(code),
            Self::Unknown { code } => code.as_deref(),
        }
    }

    /// Whether the code resolved to a taxonomy entry.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        matches!(self, Self::Known { .. })
    }
}
