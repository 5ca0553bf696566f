#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the `air_incident` binary.
//!
//! Each load or clean step of a report run (one table across its yearly
//! files, then the occurrence rows) gets its own line in a shared
//! [`MultiProgress`]. Log output goes through the same [`MultiProgress`]
//! so a warning about a missing auxiliary file never tears a bar.

use std::sync::Arc;
use std::time::Duration;

use air_incident_source::progress::{LogProgress, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

/// Shown while a step has not yet said how much work it has.
const WAITING_TEMPLATE: &str = "{spinner:.cyan} {msg}";

/// Shown once the step knows how many files or rows it will process.
const COUNTING_TEMPLATE: &str = "  {msg:<24} {wide_bar:.cyan/dim} {pos}/{len} {percent}% [{eta}]";

/// One pipeline step drawn as a terminal line.
pub struct IndicatifProgress {
    bar: ProgressBar,
    counting: ProgressStyle,
}

impl IndicatifProgress {
    /// Adds a line for the step `label` (a table name such as
    /// `ocorrencia`, or `Cleaning`) to `multi`.
    ///
    /// When `multi` draws nowhere, as under a pipe or in CI, the step is
    /// logged through [`LogProgress`] instead.
    #[must_use]
    pub fn step(multi: &MultiProgress, label: &str) -> Arc<dyn ProgressCallback> {
        if multi.is_hidden() {
            log::debug!("{label}");
            return Arc::new(LogProgress);
        }

        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template(WAITING_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(label.to_string());

        Arc::new(Self {
            bar,
            counting: counting_style(),
        })
    }

    /// Step factory handed to the report pipeline, which opens one step per
    /// table it loads and one for cleaning.
    #[must_use]
    pub fn factory(multi: &MultiProgress) -> impl Fn(&str) -> Arc<dyn ProgressCallback> + '_ {
        move |label: &str| Self::step(multi, label)
    }
}

fn counting_style() -> ProgressStyle {
    ProgressStyle::with_template(COUNTING_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.counting.clone());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Installs the global logger (filtered by `RUST_LOG`) behind
/// `indicatif-log-bridge` and returns the [`MultiProgress`] every step
/// line must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // A logger is already installed when several tests call this.
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();
    log::set_max_level(level);

    multi
}
