//! Interactive mode.
//!
//! Provides a menu-driven interface using `dialoguer` for running the
//! toolchain without memorizing CLI flags.

use std::path::PathBuf;

use air_incident_cli_utils::MultiProgress;
use air_incident_render::OutputFormat;
use air_incident_source::dataset_def::DuplicatePolicy;
use air_incident_source::loader::discover_years;
use air_incident_source::registry::default_dataset;
use dialoguer::{Confirm, Input, MultiSelect, Select};

use crate::commands::{self, DataRequest, RunRequest};

/// Top-level actions available in the interactive menu.
enum Action {
    RunReport,
    CheckData,
    ShowSchema,
    ShowTaxonomy,
}

impl Action {
    const ALL: &[Self] = &[
        Self::RunReport,
        Self::CheckData,
        Self::ShowSchema,
        Self::ShowTaxonomy,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::RunReport => "Render charts",
            Self::CheckData => "Check data (clean only)",
            Self::ShowSchema => "Show expected columns",
            Self::ShowTaxonomy => "Show occurrence-type taxonomy",
        }
    }
}

/// Runs the interactive menu, prompting the user to select and configure
/// one action.
///
/// # Errors
///
/// Returns an error if a prompt fails or the selected action fails.
pub fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    println!("Air Incident Toolchain");
    println!();

    let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Action::ALL[idx] {
        Action::RunReport => {
            let Some(data) = prompt_data()? else {
                return Ok(());
            };
            let request = prompt_run(data)?;
            let outcome = commands::run_report(&request, multi)?;
            if outcome.all_failed() {
                return Err(format!("all {} chart(s) failed", outcome.failures.len()).into());
            }
        }
        Action::CheckData => {
            if let Some(data) = prompt_data()? {
                commands::check(&data, false, multi)?;
            }
        }
        Action::ShowSchema => commands::print_schema(None)?,
        Action::ShowTaxonomy => commands::print_taxonomy(None)?,
    }

    Ok(())
}

/// Asks for the data directory and the years to load. Returns `None` when
/// there is nothing to load.
fn prompt_data() -> Result<Option<DataRequest>, Box<dyn std::error::Error>> {
    let default_dir = commands::resolve_data_dir(None);
    let data_dir: String = Input::new()
        .with_prompt("Data directory")
        .default(default_dir.display().to_string())
        .interact_text()?;
    let data_dir = PathBuf::from(data_dir);

    let available = discover_years(&data_dir, &default_dataset().occurrence)?;
    if available.is_empty() {
        println!("No occurrence files found in {}.", data_dir.display());
        return Ok(None);
    }

    let labels: Vec<String> = available.iter().map(ToString::to_string).collect();
    let defaults = vec![true; available.len()];
    let selected = MultiSelect::new()
        .with_prompt("Years to load (space=toggle, a=all, enter=confirm)")
        .items(&labels)
        .defaults(&defaults)
        .max_length(20)
        .interact()?;

    if selected.is_empty() {
        println!("No years selected.");
        return Ok(None);
    }

    let reject = Confirm::new()
        .with_prompt("Reject rows repeating an earlier identifier (default keeps the last)?")
        .default(false)
        .interact()?;

    Ok(Some(DataRequest {
        data_dir,
        years: Some(selected.iter().map(|&i| available[i]).collect()),
        dataset: None,
        taxonomy: None,
        duplicates: if reject {
            DuplicatePolicy::Reject
        } else {
            DuplicatePolicy::KeepLast
        },
    }))
}

/// Asks for the output format and directory.
fn prompt_run(data: DataRequest) -> Result<RunRequest, Box<dyn std::error::Error>> {
    let formats = OutputFormat::available();
    let format_labels: Vec<&str> = formats.iter().map(AsRef::as_ref).collect();
    let format_idx = Select::new()
        .with_prompt("Chart format")
        .items(&format_labels)
        .default(0)
        .interact()?;

    let output_dir: String = Input::new()
        .with_prompt("Output directory")
        .default("output".to_string())
        .interact_text()?;

    Ok(RunRequest {
        data,
        output_dir: PathBuf::from(output_dir),
        format: formats[format_idx],
        plan: None,
        baseline: None,
        baseline_scale: 1.0,
    })
}
