//! One report run: load the requested years, clean the occurrence table,
//! then render every chart of a plan.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use air_incident_analytics::{
    column_counts, column_distribution, group_incidents, incident_locations,
};
use air_incident_analytics_models::{Baseline, SummaryTable};
use air_incident_occurrence_models::Taxonomy;
use air_incident_render::{ChartData, Renderer};
use air_incident_source::cleaner::Cleaner;
use air_incident_source::dataset_def::{DatasetDefinition, DuplicatePolicy};
use air_incident_source::loader::{FileFormat, load_years, year_files};
use air_incident_source::progress::ProgressCallback;
use air_incident_source_models::{CleanedIncident, CleaningReport, RawTable};
use serde::Serialize;

use crate::plan::{ChartPlan, ChartSource, PlannedChart};
use crate::{ChartError, ReportError};

/// File the cleaning report is written to.
pub const CLEANING_REPORT_FILE: &str = "cleaning_report.json";

/// File the summary tables behind the charts are written to.
pub const SUMMARIES_FILE: &str = "summaries.json";

/// What to load.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory holding the yearly files.
    pub data_dir: PathBuf,
    /// Dataset years, in load order.
    pub years: Vec<i32>,
    /// How rows sharing an identifier are settled.
    pub duplicates: DuplicatePolicy,
}

/// Everything the charts of a run read.
#[derive(Debug, Clone, Default)]
pub struct LoadedData {
    /// Cleaned occurrences.
    pub incidents: Vec<CleanedIncident>,
    /// Account of what cleaning dropped or flagged.
    pub report: CleaningReport,
    /// Raw tables by name, the occurrence table included.
    pub tables: BTreeMap<String, RawTable>,
}

impl LoadedData {
    fn table(&self, name: &str) -> Result<&RawTable, ChartError> {
        self.tables.get(name).ok_or_else(|| ChartError::MissingTable {
            table: name.to_string(),
        })
    }
}

/// Loads and cleans the occurrence table for the requested years, plus the
/// auxiliary `tables` the plan reads.
///
/// An auxiliary table with no file for one of the years is skipped with a
/// warning. `progress` is called once per table to create its indicator.
///
/// # Errors
///
/// Returns [`ReportError::NoYears`] for an empty year list and
/// [`ReportError::Source`] when a file cannot be read or does not match
/// its schema.
pub fn load_data(
    definition: &DatasetDefinition,
    taxonomy: &Taxonomy,
    options: &RunOptions,
    tables: &BTreeSet<String>,
    progress: &dyn Fn(&str) -> Arc<dyn ProgressCallback>,
) -> Result<LoadedData, ReportError> {
    if options.years.is_empty() {
        return Err(ReportError::NoYears {
            data_dir: options.data_dir.clone(),
        });
    }
    let format = FileFormat::from_definition(definition)?;

    let schema = &definition.occurrence;
    let files = year_files(&options.data_dir, schema, &options.years);
    let occurrences = load_years(&files, schema, format, progress(&schema.name).as_ref())?;

    let cleaned = Cleaner::new(definition, taxonomy)
        .with_policy(options.duplicates)
        .clean(&occurrences, progress("Cleaning").as_ref())?;

    let mut loaded = BTreeMap::new();
    for name in tables.iter().filter(|n| **n != schema.name) {
        let Some(table_schema) = definition.table(name) else {
            log::warn!("Dataset '{}' has no table '{name}'", definition.id);
            continue;
        };

        let files = year_files(&options.data_dir, table_schema, &options.years);
        let missing = files
            .iter()
            .filter(|f| !f.path.is_file())
            .map(|f| f.year.to_string())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            log::warn!(
                "Skipping table '{name}': no file for year(s) {}",
                missing.join(", ")
            );
            continue;
        }

        let table = load_years(&files, table_schema, format, progress(name).as_ref())?;
        loaded.insert(name.clone(), table);
    }
    loaded.insert(schema.name.clone(), occurrences);

    Ok(LoadedData {
        incidents: cleaned.incidents,
        report: cleaned.report,
        tables: loaded,
    })
}

/// A chart that was not attempted because its table was not loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedChart {
    /// Chart id.
    pub id: String,
    /// Table that was missing.
    pub table: String,
}

/// A chart that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartFailure {
    /// Chart id.
    pub id: String,
    /// Error message.
    pub message: String,
}

/// Result of running a plan.
#[derive(Debug, Clone, Default)]
pub struct ReportOutcome {
    /// Written chart files, in plan order.
    pub rendered: Vec<PathBuf>,
    /// Charts whose table was not loaded.
    pub skipped: Vec<SkippedChart>,
    /// Charts that failed.
    pub failures: Vec<ChartFailure>,
    /// Summary tables of the rendered charts, by chart id.
    pub summaries: BTreeMap<String, SummaryTable>,
}

impl ReportOutcome {
    /// Whether charts were attempted and none of them succeeded.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        self.rendered.is_empty() && !self.failures.is_empty()
    }
}

/// Renders every chart of `plan`.
///
/// A failing chart is logged and recorded in the outcome; the remaining
/// charts are still rendered. When `baseline` is given, grouped incident
/// tables carry rates.
#[must_use]
pub fn run_plan(
    plan: &ChartPlan,
    data: &LoadedData,
    renderer: &Renderer,
    baseline: Option<&Baseline>,
) -> ReportOutcome {
    let mut outcome = ReportOutcome::default();

    for planned in &plan.charts {
        let id = &planned.chart.id;
        match render_chart(planned, data, renderer, baseline) {
            Ok((path, summary)) => {
                outcome.rendered.push(path);
                if let Some(summary) = summary {
                    outcome.summaries.insert(id.clone(), summary);
                }
            }
            Err(ChartError::MissingTable { table }) => {
                log::warn!("Skipping chart '{id}': table '{table}' was not loaded");
                outcome.skipped.push(SkippedChart {
                    id: id.clone(),
                    table,
                });
            }
            Err(e) => {
                log::warn!("Chart '{id}' failed: {e}");
                outcome.failures.push(ChartFailure {
                    id: id.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    log::info!(
        "Rendered {} chart(s), skipped {}, {} failed",
        outcome.rendered.len(),
        outcome.skipped.len(),
        outcome.failures.len()
    );

    outcome
}

fn render_chart(
    planned: &PlannedChart,
    data: &LoadedData,
    renderer: &Renderer,
    baseline: Option<&Baseline>,
) -> Result<(PathBuf, Option<SummaryTable>), ChartError> {
    let spec = &planned.chart;
    match &planned.data {
        ChartSource::Incidents(grouping) => {
            let mut grouping = grouping.clone();
            grouping.baseline = baseline.cloned();
            let table = group_incidents(&data.incidents, &grouping)?;
            let path = renderer.render(spec, ChartData::Table(&table))?;
            Ok((path, Some(table)))
        }
        ChartSource::IncidentLocations { filter } => {
            let locations = incident_locations(&data.incidents, filter);
            let path = renderer.render(spec, ChartData::Locations(&locations))?;
            Ok((path, None))
        }
        ChartSource::ColumnCounts { table, counts } => {
            let summary = column_counts(data.table(table)?, counts)?;
            let path = renderer.render(spec, ChartData::Table(&summary))?;
            Ok((path, Some(summary)))
        }
        ChartSource::ColumnDistribution {
            table,
            distribution,
        } => {
            let summary = column_distribution(data.table(table)?, distribution)?;
            let path = renderer.render(spec, ChartData::Distribution(&summary))?;
            Ok((path, None))
        }
    }
}

/// Writes `report` as pretty JSON into `output_dir`.
///
/// # Errors
///
/// Returns [`ReportError::Io`] if the file cannot be written.
pub fn write_cleaning_report(
    output_dir: &Path,
    report: &CleaningReport,
) -> Result<PathBuf, ReportError> {
    write_json(output_dir, CLEANING_REPORT_FILE, "cleaning report", report)
}

/// Writes the summary tables of a run as pretty JSON into `output_dir`.
///
/// # Errors
///
/// Returns [`ReportError::Io`] if the file cannot be written.
pub fn write_summaries(
    output_dir: &Path,
    outcome: &ReportOutcome,
) -> Result<PathBuf, ReportError> {
    write_json(output_dir, SUMMARIES_FILE, "summary tables", &outcome.summaries)
}

fn write_json(
    output_dir: &Path,
    file_name: &str,
    what: &'static str,
    value: &impl Serialize,
) -> Result<PathBuf, ReportError> {
    std::fs::create_dir_all(output_dir).map_err(|source| ReportError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let json = serde_json::to_string_pretty(value)
        .map_err(|source| ReportError::Json { what, source })?;
    let path = output_dir.join(file_name);
    std::fs::write(&path, json).map_err(|source| ReportError::Io {
        path: path.clone(),
        source,
    })?;

    log::info!("Wrote {what} to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use air_incident_render::OutputFormat;
    use air_incident_source::progress::null_progress;
    use air_incident_source::registry::{default_dataset, default_taxonomy};

    use super::*;
    use crate::plan::parse_plan_toml;

    const OCCURRENCE_HEADER: &str = "codigo_ocorrencia;ocorrencia_classificacao;ocorrencia_tipo_icao;\
        ocorrencia_latitude;ocorrencia_longitude;ocorrencia_cidade;ocorrencia_uf;ocorrencia_pais;\
        ocorrencia_aerodromo;ocorrencia_dia;ocorrencia_hora;investigacao_status;\
        total_aeronaves_envolvidas;aeronave_modelo;aeronave_fabricante;\
        aeronave_operador_categoria;ocorrencia_descricao";

    fn occurrence_row(id: u32, class: &str, date: &str, lat: &str, lng: &str) -> String {
        format!(
            "{id};{class};LOC-I;{lat};{lng};CAMPINAS;SP;BRASIL;SBKP;{date};10:00:00;FINALIZADA;1;\
             C172;CESSNA;PARTICULAR;***"
        )
    }

    fn write_year(dir: &Path, year: i32, rows: &[String]) {
        let mut text = OCCURRENCE_HEADER.to_string();
        for row in rows {
            text.push('\n');
            text.push_str(row);
        }
        text.push('\n');
        std::fs::write(dir.join(format!("ocorrencia_{year}.csv")), text).unwrap();
    }

    fn fixture_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write_year(
            dir.path(),
            2019,
            &[
                occurrence_row(1, "ACIDENTE", "03/01/2019", "-23.0", "-47.1"),
                occurrence_row(2, "INCIDENTE", "15/03/2019", "-22.9", "-47.0"),
                occurrence_row(3, "INCIDENTE", "not a date", "-22.9", "-47.0"),
            ],
        );
        write_year(
            dir.path(),
            2020,
            &[
                occurrence_row(4, "INCIDENTE GRAVE", "20/02/2020", "***", "***"),
                occurrence_row(5, "ACIDENTE", "01/06/2020", "-15.8", "-47.9"),
            ],
        );
        dir
    }

    fn options(dir: &Path, years: Vec<i32>) -> RunOptions {
        RunOptions {
            data_dir: dir.to_path_buf(),
            years,
            duplicates: DuplicatePolicy::KeepLast,
        }
    }

    fn load(dir: &Path, tables: &[&str]) -> LoadedData {
        let tables = tables.iter().map(ToString::to_string).collect();
        load_data(
            &default_dataset(),
            &default_taxonomy(),
            &options(dir, vec![2019, 2020]),
            &tables,
            &|_: &str| null_progress(),
        )
        .unwrap()
    }

    #[test]
    fn loads_and_cleans_every_year() {
        let dir = fixture_dir();
        let data = load(dir.path(), &[]);

        assert_eq!(data.report.input_rows, 5);
        assert_eq!(data.incidents.len(), 4);
        assert_eq!(data.report.excluded_count(), 1);
        assert_eq!(data.tables["ocorrencia"].len(), 5);
    }

    #[test]
    fn skips_auxiliary_tables_without_files() {
        let dir = fixture_dir();
        let data = load(dir.path(), &["aeronave", "no_such_table"]);

        assert!(!data.tables.contains_key("aeronave"));
        assert!(!data.tables.contains_key("no_such_table"));
        assert!(data.tables.contains_key("ocorrencia"));
    }

    #[test]
    fn requires_years() {
        let dir = fixture_dir();
        let err = load_data(
            &default_dataset(),
            &default_taxonomy(),
            &options(dir.path(), Vec::new()),
            &BTreeSet::new(),
            &|_: &str| null_progress(),
        )
        .unwrap_err();
        assert!(matches!(err, ReportError::NoYears { .. }));
    }

    #[test]
    fn one_failing_chart_does_not_stop_the_others() {
        let dir = fixture_dir();
        let out = tempfile::tempdir().unwrap();
        let data = load(dir.path(), &["aeronave"]);
        let plan = parse_plan_toml(
            r#"
            [[charts]]
            id = "per_month"
            title = "Per month"
            kind = "line"
            data = { type = "incidents", dimensions = [{ type = "month" }] }

            [[charts]]
            id = "makers"
            title = "Makers"
            kind = "bar"
            data = { type = "column_counts", table = "aeronave", counts = { columns = ["aeronave_fabricante"] } }

            [[charts]]
            id = "bogus"
            title = "Bogus"
            kind = "bar"
            data = { type = "column_counts", table = "ocorrencia", counts = { columns = ["no_such_column"] } }

            [[charts]]
            id = "pie_of_distribution"
            title = "Wrong kind"
            kind = "pie"
            data = { type = "column_distribution", table = "ocorrencia", distribution = { column = "total_aeronaves_envolvidas" } }

            [[charts]]
            id = "status"
            title = "Status"
            kind = "pie"
            donut = true
            data = { type = "column_counts", table = "ocorrencia", counts = { columns = ["investigacao_status"] } }
            "#,
        )
        .unwrap();
        let renderer = Renderer::new(out.path(), OutputFormat::Html).unwrap();

        let outcome = run_plan(&plan, &data, &renderer, None);

        assert_eq!(outcome.rendered.len(), 2);
        assert!(outcome.rendered.iter().all(|p| p.is_file()));
        assert_eq!(
            outcome.skipped,
            vec![SkippedChart {
                id: "makers".to_string(),
                table: "aeronave".to_string(),
            }]
        );
        let failed = outcome
            .failures
            .iter()
            .map(|f| f.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(failed, vec!["bogus", "pie_of_distribution"]);
        assert!(!outcome.all_failed());
        assert!(outcome.summaries.contains_key("per_month"));
        assert_eq!(outcome.summaries["status"].total(), 5);
    }

    #[test]
    fn grouped_tables_carry_rates_with_a_baseline() {
        let dir = fixture_dir();
        let out = tempfile::tempdir().unwrap();
        let data = load(dir.path(), &[]);
        let plan = parse_plan_toml(
            r#"
            [[charts]]
            id = "per_year"
            title = "Per year"
            kind = "bar"
            data = { type = "incidents", dimensions = [{ type = "year" }] }
            "#,
        )
        .unwrap();
        let baseline = Baseline {
            exposure: [("2019".to_string(), 1000.0), ("2020".to_string(), 500.0)]
                .into_iter()
                .collect(),
            scale: 1000.0,
        };
        let renderer = Renderer::new(out.path(), OutputFormat::Html).unwrap();

        let outcome = run_plan(&plan, &data, &renderer, Some(&baseline));

        let rows = &outcome.summaries["per_year"].rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[0].rate, Some(2.0));
        assert_eq!(rows[1].count, 2);
        assert_eq!(rows[1].rate, Some(4.0));
    }

    #[test]
    fn every_chart_failing_is_reported() {
        let data = LoadedData::default();
        let out = tempfile::tempdir().unwrap();
        let plan = parse_plan_toml(
            r#"
            [[charts]]
            id = "empty"
            title = "Empty"
            kind = "line"
            data = { type = "incidents", dimensions = [] }
            "#,
        )
        .unwrap();
        let renderer = Renderer::new(out.path(), OutputFormat::Html).unwrap();

        let outcome = run_plan(&plan, &data, &renderer, None);
        assert!(outcome.all_failed());
    }

    #[test]
    fn writes_the_cleaning_report_as_json() {
        let dir = fixture_dir();
        let out = tempfile::tempdir().unwrap();
        let data = load(dir.path(), &[]);

        let path = write_cleaning_report(&out.path().join("nested"), &data.report).unwrap();
        assert!(path.ends_with(CLEANING_REPORT_FILE));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["inputRows"], 5);
        assert_eq!(json["cleanedRows"], 4);
        assert_eq!(json["excluded"].as_array().unwrap().len(), 1);
    }
}
