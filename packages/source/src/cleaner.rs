//! Turns the raw occurrence table into [`CleanedIncident`]s.
//!
//! Every row either becomes a cleaned incident or is listed in the
//! [`CleaningReport`] with the reason it was excluded, so
//! `input_rows == cleaned_rows + excluded + duplicates` always holds.
//! Missing values never exclude a row: an empty coordinate is recorded as
//! [`CoordinateStatus::Missing`], an empty type code as an unknown type.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use air_incident_occurrence_models::{OccurrenceClass, OccurrenceType, Taxonomy};
use air_incident_source_models::{
    CleanedIncident, CleaningReport, CoordinateStatus, DuplicateResolution, ExcludedRow,
    FlaggedCoordinate, ParseError, RawRecord, RawTable, RowRef,
};
use chrono::NaiveTime;

use crate::SourceError;
use crate::dataset_def::{BoundingBox, DatasetDefinition, DuplicatePolicy};
use crate::parsing::{non_empty, parse_coordinate, parse_count, parse_date, parse_time};
use crate::progress::ProgressCallback;

/// Rows between progress updates.
const PROGRESS_STEP: usize = 1_000;

/// Result of cleaning a table.
#[derive(Debug, Clone, Default)]
pub struct CleanOutput {
    /// Cleaned incidents in load order, one per identifier.
    pub incidents: Vec<CleanedIncident>,
    /// Account of excluded, flagged and deduplicated rows.
    pub report: CleaningReport,
}

/// Positions of the mapped columns in the raw table.
struct Columns {
    id: usize,
    date: usize,
    time: Option<usize>,
    latitude: usize,
    longitude: usize,
    occurrence_type: usize,
    classification: usize,
    aircraft_model: Option<usize>,
    aircraft_maker: Option<usize>,
    operator_category: Option<usize>,
    city: Option<usize>,
    state: Option<usize>,
    investigation_status: Option<usize>,
    aircraft_involved: Option<usize>,
    description: Option<usize>,
}

impl Columns {
    fn resolve(definition: &DatasetDefinition, table: &RawTable) -> Result<Self, SourceError> {
        let required = |column: &str| {
            table
                .column_index(column)
                .ok_or_else(|| SourceError::Definition {
                    message: format!("table '{}' has no column '{column}'", table.name),
                })
        };
        let optional = |column: &Option<String>| -> Result<Option<usize>, SourceError> {
            column.as_deref().map(required).transpose()
        };

        let fields = &definition.fields;
        Ok(Self {
            id: required(&fields.id)?,
            date: required(&fields.date)?,
            time: optional(&fields.time)?,
            latitude: required(&fields.latitude)?,
            longitude: required(&fields.longitude)?,
            occurrence_type: required(&fields.occurrence_type)?,
            classification: required(&fields.classification)?,
            aircraft_model: optional(&fields.aircraft_model)?,
            aircraft_maker: optional(&fields.aircraft_maker)?,
            operator_category: optional(&fields.operator_category)?,
            city: optional(&fields.city)?,
            state: optional(&fields.state)?,
            investigation_status: optional(&fields.investigation_status)?,
            aircraft_involved: optional(&fields.aircraft_involved)?,
            description: optional(&fields.description)?,
        })
    }
}

/// Cleans occurrence tables of one dataset.
pub struct Cleaner<'a> {
    definition: &'a DatasetDefinition,
    taxonomy: &'a Taxonomy,
    policy: DuplicatePolicy,
}

impl<'a> Cleaner<'a> {
    /// Creates a cleaner using [`DuplicatePolicy::KeepLast`].
    #[must_use]
    pub fn new(definition: &'a DatasetDefinition, taxonomy: &'a Taxonomy) -> Self {
        Self {
            definition,
            taxonomy,
            policy: DuplicatePolicy::default(),
        }
    }

    /// Sets how rows sharing an identifier are settled.
    #[must_use]
    pub const fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Cleans `table`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Definition`] if the table lacks a column the
    /// field mapping refers to. Per-row problems never fail the call; they
    /// are recorded in the report.
    pub fn clean(
        &self,
        table: &RawTable,
        progress: &dyn ProgressCallback,
    ) -> Result<CleanOutput, SourceError> {
        let columns = Columns::resolve(self.definition, table)?;
        let mut report = CleaningReport {
            input_rows: table.len() as u64,
            ..CleaningReport::default()
        };

        progress.set_total(table.len() as u64);
        progress.set_message(format!("cleaning {}", table.name));

        // Parsed rows in load order. A `None` incident marks a row
        // superseded by a duplicate; its `RowRef` stays for the report.
        let mut kept: Vec<(Option<CleanedIncident>, RowRef)> = Vec::with_capacity(table.len());
        let mut slots: HashMap<String, usize> = HashMap::new();

        for (i, record) in table.records.iter().enumerate() {
            if (i + 1) % PROGRESS_STEP == 0 {
                progress.inc(PROGRESS_STEP as u64);
            }

            let row = row_ref(table, record);
            let incident = match self.parse_row(&columns, record, row.year) {
                Ok(incident) => incident,
                Err(error) => {
                    log::debug!("{}:{} excluded: {error}", row.path.display(), row.line);
                    report.excluded.push(ExcludedRow {
                        id: record
                            .values
                            .get(columns.id)
                            .and_then(|v| non_empty(v))
                            .map(ToString::to_string),
                        row,
                        error,
                    });
                    continue;
                }
            };

            let Some(slot) = slots.get(&incident.id).copied() else {
                slots.insert(incident.id.clone(), kept.len());
                kept.push((Some(incident), row));
                continue;
            };

            match self.policy {
                DuplicatePolicy::KeepLast => {
                    kept[slot].0 = None;
                    report.duplicates.push(DuplicateResolution {
                        id: incident.id.clone(),
                        kept: row.clone(),
                        dropped: kept[slot].1.clone(),
                    });
                    slots.insert(incident.id.clone(), kept.len());
                    kept.push((Some(incident), row));
                }
                DuplicatePolicy::Reject => {
                    report.duplicates.push(DuplicateResolution {
                        id: incident.id,
                        kept: kept[slot].1.clone(),
                        dropped: row,
                    });
                }
            }
        }
        progress.inc((table.len() % PROGRESS_STEP) as u64);

        let incidents = tally_kept(kept, &mut report);

        for resolution in &report.duplicates {
            log::debug!(
                "Duplicate id {}: kept {}:{}, dropped {}:{}",
                resolution.id,
                resolution.kept.path.display(),
                resolution.kept.line,
                resolution.dropped.path.display(),
                resolution.dropped.line
            );
        }
        for (code, count) in &report.unknown_type_codes {
            log::warn!("Occurrence type code '{code}' is not in the taxonomy ({count} rows)");
        }
        log::info!(
            "[{}] {} rows in, {} cleaned, {} excluded, {} duplicates, {} out-of-range coordinates",
            table.name,
            report.input_rows,
            report.cleaned_rows,
            report.excluded.len(),
            report.duplicates.len(),
            report.flagged_coordinates.len()
        );
        progress.finish(format!(
            "[{}] cleaned {} of {} rows",
            table.name, report.cleaned_rows, report.input_rows
        ));

        Ok(CleanOutput { incidents, report })
    }

    fn parse_row(
        &self,
        columns: &Columns,
        record: &RawRecord,
        year: i32,
    ) -> Result<CleanedIncident, ParseError> {
        let field = |idx: usize| record.values.get(idx).map_or("", String::as_str);
        let optional = |idx: Option<usize>| {
            idx.and_then(|i| non_empty(field(i)))
                .map(ToString::to_string)
        };

        let id = non_empty(field(columns.id)).ok_or(ParseError::MissingIdentifier)?;

        let raw_date = field(columns.date);
        let date = parse_date(raw_date, &self.definition.date_formats).ok_or_else(|| {
            ParseError::InvalidDate {
                value: raw_date.to_string(),
            }
        })?;

        let time = match columns.time {
            Some(idx) => parse_time(field(idx), &self.definition.time_formats).map_err(|()| {
                ParseError::InvalidTime {
                    value: field(idx).to_string(),
                }
            })?,
            None => None,
        };

        let coordinate = |idx: usize, name: &str| {
            parse_coordinate(field(idx)).map_err(|()| ParseError::InvalidCoordinate {
                field: name.to_string(),
                value: field(idx).to_string(),
            })
        };
        let latitude = coordinate(columns.latitude, &self.definition.fields.latitude)?;
        let longitude = coordinate(columns.longitude, &self.definition.fields.longitude)?;

        Ok(CleanedIncident {
            id: id.to_string(),
            year,
            occurred_at: date.and_time(time.unwrap_or(NaiveTime::MIN)),
            latitude,
            longitude,
            coordinates: coordinate_status(latitude, longitude, &self.definition.bounds),
            occurrence_type: self.taxonomy.resolve(field(columns.occurrence_type)),
            classification: OccurrenceClass::from_raw(field(columns.classification)),
            aircraft_model: optional(columns.aircraft_model),
            aircraft_maker: optional(columns.aircraft_maker),
            operator_category: optional(columns.operator_category),
            city: optional(columns.city),
            state: optional(columns.state),
            investigation_status: optional(columns.investigation_status),
            aircraft_involved: columns
                .aircraft_involved
                .and_then(|idx| parse_count(field(idx))),
            description: optional(columns.description),
        })
    }
}

/// Classifies a coordinate pair against the bounding box.
#[must_use]
pub fn coordinate_status(
    latitude: Option<f64>,
    longitude: Option<f64>,
    bounds: &BoundingBox,
) -> CoordinateStatus {
    match (latitude, longitude) {
        (Some(lat), Some(lng)) if bounds.contains(lat, lng) => CoordinateStatus::Valid,
        (Some(_), Some(_)) => CoordinateStatus::OutOfRange,
        _ => CoordinateStatus::Missing,
    }
}

fn row_ref(table: &RawTable, record: &RawRecord) -> RowRef {
    let (year, path) = table
        .source_of(record)
        .map_or((0, PathBuf::new()), |s| (s.year, s.path.clone()));
    RowRef {
        year,
        path,
        line: record.line,
    }
}

/// Drops tombstones and fills the report counters that describe kept rows.
fn tally_kept(
    kept: Vec<(Option<CleanedIncident>, RowRef)>,
    report: &mut CleaningReport,
) -> Vec<CleanedIncident> {
    let mut unknown: BTreeMap<String, u64> = BTreeMap::new();
    let mut incidents = Vec::with_capacity(kept.len());

    for (incident, row) in kept {
        let Some(incident) = incident else {
            continue;
        };
        match incident.coordinates {
            CoordinateStatus::Valid => {}
            CoordinateStatus::Missing => report.missing_coordinates += 1,
            CoordinateStatus::OutOfRange => report.flagged_coordinates.push(FlaggedCoordinate {
                row,
                id: incident.id.clone(),
                latitude: incident.latitude.unwrap_or(f64::NAN),
                longitude: incident.longitude.unwrap_or(f64::NAN),
            }),
        }
        match &incident.occurrence_type {
            OccurrenceType::Known { .. } => {}
            OccurrenceType::Unknown { code: Some(code) } => {
                *unknown.entry(code.clone()).or_insert(0) += 1;
            }
            OccurrenceType::Unknown { code: None } => report.missing_type_codes += 1,
        }
        if incident.classification == OccurrenceClass::Unclassified {
            report.unclassified += 1;
        }
        incidents.push(incident);
    }

    report.unknown_type_codes = unknown;
    report.cleaned_rows = incidents.len() as u64;
    incidents
}

#[cfg(test)]
mod tests {
    use air_incident_occurrence_models::TaxonomyEntry;
    use air_incident_source_models::RecordSource;

    use super::*;
    use crate::dataset_def::parse_dataset_toml;
    use crate::progress::NullProgress;

    const DEFINITION: &str = r#"
        id = "fixture"
        name = "Fixture"
        schema_version = "1"
        encoding = "utf-8"
        delimiter = ";"
        date_formats = ["%d/%m/%Y"]
        time_formats = ["%H:%M:%S"]

        [occurrence]
        name = "ocorrencia"
        file_pattern = "ocorrencia_{year}.csv"
        columns = ["id", "dia", "hora", "lat", "lon", "tipo", "classe", "uf"]

        [fields]
        id = "id"
        date = "dia"
        time = "hora"
        latitude = "lat"
        longitude = "lon"
        occurrence_type = "tipo"
        classification = "classe"
        state = "uf"
    "#;

    fn definition() -> DatasetDefinition {
        parse_dataset_toml(DEFINITION).unwrap()
    }

    fn taxonomy() -> Taxonomy {
        Taxonomy::new(vec![TaxonomyEntry {
            code: "LOC-I".to_string(),
            label: "Loss of control in flight".to_string(),
            category: "Loss of control".to_string(),
        }])
        .unwrap()
    }

    fn row(id: &str, date: &str, lat: &str, lon: &str) -> [String; 8] {
        [
            id.to_string(),
            date.to_string(),
            "10:30:00".to_string(),
            lat.to_string(),
            lon.to_string(),
            "LOC-I".to_string(),
            "ACIDENTE".to_string(),
            "SP".to_string(),
        ]
    }

    fn table(years: &[(i32, Vec<[String; 8]>)]) -> RawTable {
        let def = definition();
        let mut combined = RawTable::new("ocorrencia", def.occurrence.columns);
        for (year, rows) in years {
            let mut t = RawTable::new("ocorrencia", combined.columns.clone());
            t.sources.push(RecordSource {
                year: *year,
                path: PathBuf::from(format!("ocorrencia_{year}.csv")),
            });
            for (i, values) in rows.iter().enumerate() {
                t.records.push(RawRecord {
                    source: 0,
                    line: i as u64 + 2,
                    values: values.to_vec(),
                });
            }
            combined.append(t);
        }
        combined
    }

    fn clean(table: &RawTable, policy: DuplicatePolicy) -> CleanOutput {
        let def = definition();
        let taxonomy = taxonomy();
        Cleaner::new(&def, &taxonomy)
            .with_policy(policy)
            .clean(table, &NullProgress)
            .unwrap()
    }

    #[test]
    fn cleans_a_valid_row() {
        let t = table(&[(2020, vec![row("1", "15/03/2020", "-23.43", "-46.47")])]);
        let out = clean(&t, DuplicatePolicy::KeepLast);
        assert_eq!(out.incidents.len(), 1);
        let incident = &out.incidents[0];
        assert_eq!(incident.id, "1");
        assert_eq!(incident.year, 2020);
        assert_eq!(incident.occurred_at.to_string(), "2020-03-15 10:30:00");
        assert_eq!(incident.location(), Some((-23.43, -46.47)));
        assert_eq!(incident.occurrence_type.label(), "Loss of control in flight");
        assert_eq!(incident.classification, OccurrenceClass::Accident);
        assert_eq!(incident.state.as_deref(), Some("SP"));
        assert!(out.report.is_clean());
    }

    #[test]
    fn malformed_dates_are_excluded_and_counted_per_year() {
        let year = |y: i32, bad: usize| {
            let rows = (0..100)
                .map(|i| {
                    let date = if i < bad {
                        "99/99/9999".to_string()
                    } else {
                        format!("01/01/{y}")
                    };
                    row(&format!("{y}-{i}"), &date, "-15.0", "-47.0")
                })
                .collect::<Vec<_>>();
            (y, rows)
        };
        let t = table(&[year(2019, 3), year(2020, 2)]);
        let out = clean(&t, DuplicatePolicy::KeepLast);

        assert_eq!(out.incidents.len(), 195);
        assert_eq!(out.report.input_rows, 200);
        assert_eq!(out.report.cleaned_rows, 195);
        assert_eq!(out.report.excluded_count(), 5);
        let by_year = out.report.excluded_by_year();
        assert_eq!(by_year[&2019], 3);
        assert_eq!(by_year[&2020], 2);
        assert!(matches!(
            out.report.excluded[0].error,
            ParseError::InvalidDate { ref value } if value == "99/99/9999"
        ));
        assert_eq!(out.report.excluded[0].row.line, 2);
    }

    #[test]
    fn null_island_is_flagged_not_dropped() {
        let t = table(&[(2020, vec![row("1", "01/01/2020", "0", "0")])]);
        let out = clean(&t, DuplicatePolicy::KeepLast);
        assert_eq!(out.incidents.len(), 1);
        assert_eq!(out.incidents[0].coordinates, CoordinateStatus::OutOfRange);
        assert_eq!(out.incidents[0].location(), None);
        assert_eq!(out.report.flagged_coordinates.len(), 1);
        assert_eq!(out.report.flagged_coordinates[0].id, "1");
    }

    #[test]
    fn missing_values_keep_the_row() {
        let mut values = row("1", "01/01/2020", "***", "");
        values[2] = String::new();
        values[5] = String::new();
        values[6] = "???".to_string();
        let t = table(&[(2020, vec![values])]);
        let out = clean(&t, DuplicatePolicy::KeepLast);

        let incident = &out.incidents[0];
        assert_eq!(incident.coordinates, CoordinateStatus::Missing);
        assert_eq!(incident.occurred_at.to_string(), "2020-01-01 00:00:00");
        assert!(!incident.occurrence_type.is_known());
        assert_eq!(incident.classification, OccurrenceClass::Unclassified);
        assert_eq!(out.report.missing_coordinates, 1);
        assert_eq!(out.report.missing_type_codes, 1);
        assert_eq!(out.report.unclassified, 1);
    }

    #[test]
    fn unknown_codes_are_tallied() {
        let mut a = row("1", "01/01/2020", "-15", "-47");
        a[5] = "xyz".to_string();
        let mut b = row("2", "01/01/2020", "-15", "-47");
        b[5] = "XYZ".to_string();
        let t = table(&[(2020, vec![a, b])]);
        let out = clean(&t, DuplicatePolicy::KeepLast);
        assert_eq!(out.incidents.len(), 2);
        assert_eq!(out.report.unknown_type_codes["XYZ"], 2);
        assert_eq!(out.report.unknown_type_count(), 2);
    }

    #[test]
    fn bad_time_and_coordinate_text_exclude_the_row() {
        let mut bad_time = row("1", "01/01/2020", "-15", "-47");
        bad_time[2] = "25:61:00".to_string();
        let bad_lat = row("2", "01/01/2020", "15S", "-47");
        let no_id = row(" ", "01/01/2020", "-15", "-47");
        let t = table(&[(2020, vec![bad_time, bad_lat, no_id])]);
        let out = clean(&t, DuplicatePolicy::KeepLast);

        assert!(out.incidents.is_empty());
        let errors: Vec<_> = out.report.excluded.iter().map(|e| e.error.clone()).collect();
        assert_eq!(
            errors,
            vec![
                ParseError::InvalidTime {
                    value: "25:61:00".to_string()
                },
                ParseError::InvalidCoordinate {
                    field: "lat".to_string(),
                    value: "15S".to_string()
                },
                ParseError::MissingIdentifier,
            ]
        );
        assert_eq!(out.report.excluded[1].id.as_deref(), Some("2"));
    }

    #[test]
    fn keep_last_prefers_the_later_year() {
        let t = table(&[
            (2019, vec![row("7", "31/12/2019", "-15", "-47")]),
            (2020, vec![row("7", "01/01/2020", "-16", "-48")]),
        ]);
        let out = clean(&t, DuplicatePolicy::KeepLast);
        assert_eq!(out.incidents.len(), 1);
        assert_eq!(out.incidents[0].year, 2020);
        assert_eq!(out.report.duplicates.len(), 1);
        assert_eq!(out.report.duplicates[0].kept.year, 2020);
        assert_eq!(out.report.duplicates[0].dropped.year, 2019);
    }

    #[test]
    fn reject_keeps_the_first_row() {
        let t = table(&[
            (2019, vec![row("7", "31/12/2019", "-15", "-47")]),
            (2020, vec![row("7", "01/01/2020", "-16", "-48")]),
        ]);
        let out = clean(&t, DuplicatePolicy::Reject);
        assert_eq!(out.incidents.len(), 1);
        assert_eq!(out.incidents[0].year, 2019);
        assert_eq!(out.report.duplicates[0].dropped.year, 2020);
    }

    #[test]
    fn every_input_row_is_accounted_for() {
        let t = table(&[
            (
                2019,
                vec![
                    row("1", "01/01/2019", "-15", "-47"),
                    row("2", "bad", "-15", "-47"),
                    row("3", "01/01/2019", "0", "0"),
                ],
            ),
            (
                2020,
                vec![
                    row("1", "01/01/2020", "-15", "-47"),
                    row("4", "01/01/2020", "", ""),
                ],
            ),
        ]);
        for policy in [DuplicatePolicy::KeepLast, DuplicatePolicy::Reject] {
            let out = clean(&t, policy);
            let r = &out.report;
            assert_eq!(
                r.input_rows,
                r.cleaned_rows + r.excluded_count() + r.duplicates.len() as u64
            );
            assert_eq!(r.cleaned_rows, 3);
        }
    }

    #[test]
    fn missing_mapped_column_is_a_definition_error() {
        let def = definition();
        let taxonomy = taxonomy();
        let t = RawTable::new("ocorrencia", vec!["id".to_string()]);
        let err = Cleaner::new(&def, &taxonomy)
            .clean(&t, &NullProgress)
            .unwrap_err();
        assert!(matches!(err, SourceError::Definition { .. }));
    }
}
