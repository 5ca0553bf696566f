#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the air incident toolchain.
//!
//! Loads the yearly Cenipa occurrence files, cleans them and renders the
//! charts of a plan. Without a subcommand an interactive prompt asks for
//! the years and the output format.
//!
//! Uses `indicatif-log-bridge` (via [`air_incident_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod commands;
mod interactive;

use std::path::PathBuf;

use air_incident_render::OutputFormat;
use air_incident_source::dataset_def::DuplicatePolicy;
use clap::{Args, Parser, Subcommand};

use crate::commands::{DataRequest, RunRequest};

#[derive(Parser)]
#[command(name = "air_incident", about = "Brazilian civil aviation occurrence analysis")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options shared by every command that loads data.
#[derive(Args)]
struct DataArgs {
    /// Years to load, e.g. "2019,2020" or "2010-2020". Defaults to every
    /// year with an occurrence file in the data directory.
    #[arg(long)]
    years: Option<String>,
    /// Directory holding the yearly files (overrides `AIR_INCIDENT_DATA_DIR`)
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Dataset definition TOML to use instead of the bundled one
    #[arg(long)]
    dataset: Option<PathBuf>,
    /// Occurrence-type taxonomy TOML to use instead of the bundled one
    #[arg(long)]
    taxonomy: Option<PathBuf>,
    /// How to settle rows sharing an identifier: keep-last or reject
    #[arg(long, default_value = "keep-last", value_parser = parse_duplicates)]
    duplicates: DuplicatePolicy,
}

impl DataArgs {
    fn into_request(self) -> Result<DataRequest, String> {
        Ok(DataRequest {
            data_dir: commands::resolve_data_dir(self.data_dir),
            years: self
                .years
                .as_deref()
                .map(commands::parse_years)
                .transpose()?,
            dataset: self.dataset,
            taxonomy: self.taxonomy,
            duplicates: self.duplicates,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Load, clean and render every chart of a plan
    Run {
        #[command(flatten)]
        data: DataArgs,
        /// Directory charts and reports are written to
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
        /// Chart format: png, svg or html. PNG and SVG come from the `image`
        /// feature, which is on by default.
        #[arg(long, default_value_t = OutputFormat::default(), value_parser = parse_format)]
        format: OutputFormat,
        /// Chart plan TOML to use instead of the bundled one
        #[arg(long)]
        plan: Option<PathBuf>,
        /// `key;exposure` file used to turn grouped counts into rates
        #[arg(long)]
        baseline: Option<PathBuf>,
        /// Multiplier applied to every rate (e.g. 100000 for "per 100k")
        #[arg(long, default_value = "1")]
        baseline_scale: f64,
    },
    /// Load and clean only, then print the cleaning report
    Check {
        #[command(flatten)]
        data: DataArgs,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the expected columns of every table
    Schema {
        /// Dataset definition TOML to use instead of the bundled one
        #[arg(long)]
        dataset: Option<PathBuf>,
    },
    /// Print the occurrence-type taxonomy
    Taxonomy {
        /// Taxonomy TOML to use instead of the bundled one
        #[arg(long)]
        taxonomy: Option<PathBuf>,
    },
}

fn parse_duplicates(raw: &str) -> Result<DuplicatePolicy, String> {
    raw.parse()
        .map_err(|_| format!("'{raw}' is not a duplicate policy (keep-last, reject)"))
}

fn parse_format(raw: &str) -> Result<OutputFormat, String> {
    raw.parse()
        .map_err(|_| format!("'{raw}' is not an output format (png, svg, html)"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = air_incident_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return interactive::run(&multi);
    };

    match command {
        Commands::Run {
            data,
            output_dir,
            format,
            plan,
            baseline,
            baseline_scale,
        } => {
            let request = RunRequest {
                data: data.into_request()?,
                output_dir,
                format,
                plan,
                baseline,
                baseline_scale,
            };
            let outcome = commands::run_report(&request, &multi)?;
            if outcome.all_failed() {
                return Err(format!("all {} chart(s) failed", outcome.failures.len()).into());
            }
        }
        Commands::Check { data, json } => {
            commands::check(&data.into_request()?, json, &multi)?;
        }
        Commands::Schema { dataset } => commands::print_schema(dataset.as_deref())?,
        Commands::Taxonomy { taxonomy } => commands::print_taxonomy(taxonomy.as_deref())?,
    }

    Ok(())
}
