//! Command implementations shared by the flag-driven and interactive modes.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use air_incident_analytics::load_baseline;
use air_incident_cli_utils::{IndicatifProgress, MultiProgress};
use air_incident_render::{OutputFormat, Renderer};
use air_incident_report::{
    LoadedData, ReportError, ReportOutcome, RunOptions, load_data, load_plan, run_plan,
    write_cleaning_report, write_summaries,
};
use air_incident_source::dataset_def::{DatasetDefinition, DuplicatePolicy};
use air_incident_source::loader::discover_years;
use air_incident_source::registry::{load_dataset, load_taxonomy};
use air_incident_source_models::CleaningReport;

/// Environment variable naming the default data directory.
pub const DATA_DIR_ENV: &str = "AIR_INCIDENT_DATA_DIR";

/// Data directory used when neither the flag nor the environment sets one.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Years accepted on the command line.
const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1900..=2100;

/// Unknown type codes listed in the cleaning summary.
const UNKNOWN_CODES_SHOWN: usize = 10;

/// Which data to load and how to clean it.
#[derive(Debug, Clone)]
pub struct DataRequest {
    /// Directory holding the yearly files.
    pub data_dir: PathBuf,
    /// Explicit years; `None` loads every year found in `data_dir`.
    pub years: Option<Vec<i32>>,
    /// Dataset definition file; `None` uses the bundled Cenipa one.
    pub dataset: Option<PathBuf>,
    /// Taxonomy file; `None` uses the bundled ICAO one.
    pub taxonomy: Option<PathBuf>,
    /// How rows sharing an identifier are settled.
    pub duplicates: DuplicatePolicy,
}

/// Everything a full report run needs.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// What to load.
    pub data: DataRequest,
    /// Directory charts, `cleaning_report.json` and `summaries.json` go to.
    pub output_dir: PathBuf,
    /// Format every chart is written in.
    pub format: OutputFormat,
    /// Chart plan file; `None` uses the bundled plan.
    pub plan: Option<PathBuf>,
    /// `key;exposure` file turning grouped counts into rates.
    pub baseline: Option<PathBuf>,
    /// Multiplier applied to every rate.
    pub baseline_scale: f64,
}

/// Resolves the data directory: flag, then environment, then default.
#[must_use]
pub fn resolve_data_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// Parses a year list such as `"2019,2020"` or `"2010-2015,2018"`.
///
/// # Errors
///
/// Returns a message naming the part that is not a year or a range, or a
/// year outside 1900..=2100.
pub fn parse_years(raw: &str) -> Result<Vec<i32>, String> {
    let mut years = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let parse = |s: &str| {
            let year = s
                .trim()
                .parse::<i32>()
                .map_err(|_| format!("'{part}' is not a year or a range of years"))?;
            if YEAR_RANGE.contains(&year) {
                Ok(year)
            } else {
                Err(format!(
                    "year {year} is outside {}-{}",
                    YEAR_RANGE.start(),
                    YEAR_RANGE.end()
                ))
            }
        };
        if let Some((from, to)) = part.split_once('-') {
            let (from, to) = (parse(from)?, parse(to)?);
            if from > to {
                return Err(format!("range '{part}' runs backwards"));
            }
            years.extend(from..=to);
        } else {
            years.push(parse(part)?);
        }
    }
    years.sort_unstable();
    years.dedup();
    if years.is_empty() {
        return Err("no years given".to_string());
    }
    Ok(years)
}

fn resolve_years(
    request: &DataRequest,
    definition: &DatasetDefinition,
) -> Result<Vec<i32>, ReportError> {
    if let Some(years) = &request.years {
        return Ok(years.clone());
    }
    let years = discover_years(&request.data_dir, &definition.occurrence)?;
    if years.is_empty() {
        return Err(ReportError::NoYears {
            data_dir: request.data_dir.clone(),
        });
    }
    log::info!(
        "Found {} year(s) in {}: {}",
        years.len(),
        request.data_dir.display(),
        years
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(years)
}

fn load(
    request: &DataRequest,
    tables: &BTreeSet<String>,
    multi: &MultiProgress,
) -> Result<LoadedData, Box<dyn std::error::Error>> {
    let definition = load_dataset(request.dataset.as_deref())?;
    let taxonomy = load_taxonomy(request.taxonomy.as_deref())?;
    let years = resolve_years(request, &definition)?;

    let options = RunOptions {
        data_dir: request.data_dir.clone(),
        years,
        duplicates: request.duplicates,
    };
    let data = load_data(
        &definition,
        &taxonomy,
        &options,
        tables,
        &IndicatifProgress::factory(multi),
    )?;
    Ok(data)
}

/// Loads, cleans, renders every planned chart and writes the cleaning
/// report and summary tables.
///
/// # Errors
///
/// Returns an error if a definition, plan or baseline cannot be read, a
/// file does not match its schema, or an output file cannot be written.
/// Failing charts are reported in the outcome instead.
pub fn run_report(
    request: &RunRequest,
    multi: &MultiProgress,
) -> Result<ReportOutcome, Box<dyn std::error::Error>> {
    let start = Instant::now();

    let plan = load_plan(request.plan.as_deref())?;
    let baseline = request
        .baseline
        .as_deref()
        .map(|path| load_baseline(path, request.baseline_scale))
        .transpose()?;
    let renderer = Renderer::new(&request.output_dir, request.format)?;

    let data = load(&request.data, &plan.tables(), multi)?;
    print_cleaning_summary(&data.report);
    write_cleaning_report(&request.output_dir, &data.report)?;

    let outcome = run_plan(&plan, &data, &renderer, baseline.as_ref());
    write_summaries(&request.output_dir, &outcome)?;

    println!();
    println!(
        "{} chart(s) written to {}",
        outcome.rendered.len(),
        request.output_dir.display()
    );
    for skipped in &outcome.skipped {
        println!("  skipped {:<36} table '{}' not loaded", skipped.id, skipped.table);
    }
    for failure in &outcome.failures {
        println!("  failed  {:<36} {}", failure.id, failure.message);
    }
    log::info!("Report finished in {:.1}s", start.elapsed().as_secs_f64());

    Ok(outcome)
}

/// Loads and cleans without rendering, then prints the cleaning report.
///
/// # Errors
///
/// Returns an error if a definition cannot be read or a file does not
/// match its schema.
pub fn check(
    request: &DataRequest,
    json: bool,
    multi: &MultiProgress,
) -> Result<CleaningReport, Box<dyn std::error::Error>> {
    let data = load(request, &BTreeSet::new(), multi)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&data.report)?);
    } else {
        print_cleaning_summary(&data.report);
    }
    Ok(data.report)
}

/// Prints the expected columns of every table.
///
/// # Errors
///
/// Returns an error if the dataset definition cannot be read.
pub fn print_schema(dataset: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let definition = load_dataset(dataset)?;
    println!("{} ({})", definition.name, definition.id);
    println!(
        "schema {}, {}, delimiter '{}'",
        definition.schema_version, definition.encoding, definition.delimiter
    );
    for table in definition.all_tables() {
        println!();
        println!("{} ({})", table.name, table.file_pattern);
        println!("{}", "-".repeat(50));
        for column in &table.columns {
            println!("  {column}");
        }
    }
    Ok(())
}

/// Prints every taxonomy code with its label and category.
///
/// # Errors
///
/// Returns an error if the taxonomy file cannot be read.
pub fn print_taxonomy(taxonomy: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let taxonomy = load_taxonomy(taxonomy)?;
    println!("{:<12} {:<48} CATEGORY", "CODE", "LABEL");
    println!("{}", "-".repeat(90));
    for entry in taxonomy.entries() {
        println!("{:<12} {:<48} {}", entry.code, entry.label, entry.category);
    }
    Ok(())
}

/// Prints the cleaning report as an aligned table, listing the most
/// frequent unknown occurrence-type codes.
fn print_cleaning_summary(report: &CleaningReport) {
    println!();
    println!("Cleaning report");
    println!("{}", "-".repeat(50));
    println!("{:<32} {}", "Input rows", report.input_rows);
    println!("{:<32} {}", "Cleaned rows", report.cleaned_rows);
    println!("{:<32} {}", "Excluded rows", report.excluded_count());
    for (year, count) in report.excluded_by_year() {
        println!("  {year:<30} {count}");
    }
    println!("{:<32} {}", "Duplicate identifiers", report.duplicates.len());
    println!(
        "{:<32} {}",
        "Out-of-range coordinates",
        report.flagged_coordinates.len()
    );
    println!("{:<32} {}", "Missing coordinates", report.missing_coordinates);
    println!("{:<32} {}", "Unclassified", report.unclassified);
    println!("{:<32} {}", "Unknown occurrence types", report.unknown_type_count());

    let mut unknown = report.unknown_type_codes.iter().collect::<Vec<_>>();
    unknown.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (code, count) in unknown.into_iter().take(UNKNOWN_CODES_SHOWN) {
        println!("  {code:<30} {count}");
    }
}
