#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Chart rendering.
//!
//! A [`ChartSpec`] says what a chart looks like; [`ChartData`] carries the
//! numbers. [`Renderer`] turns the pair into one file in its output
//! directory. PNG is the default format. PNG and SVG come from the
//! `image` feature (on by default), which pulls in a server-side
//! JavaScript runtime; HTML needs nothing extra.

pub mod charts;

use std::path::{Path, PathBuf};

use air_incident_analytics_models::{Distribution, IncidentLocation, SummaryTable};
use charming::theme::Theme;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Errors that can occur while rendering one chart.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The chart kind cannot show this data.
    #[error("{kind} charts cannot show {data}")]
    Unsupported {
        /// Requested kind.
        kind: ChartKind,
        /// Description of the data given.
        data: &'static str,
    },

    /// There is nothing to plot.
    #[error("no data to plot")]
    NoData,

    /// This build cannot produce the requested format.
    #[error("output format '{format}' is not available in this build (enable the `image` feature)")]
    FormatUnavailable {
        /// Requested format.
        format: OutputFormat,
    },

    /// The output directory could not be created.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Directory that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The chart library failed.
    #[error("chart rendering failed: {message}")]
    Chart {
        /// Library message.
        message: String,
    },
}

/// The kinds of chart the renderer draws.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChartKind {
    /// Time series, one line per series.
    Line,
    /// Horizontal bars, largest at the top.
    Bar,
    /// Pie, or donut when [`ChartSpec::donut`] is set.
    Pie,
    /// Box plot of a distribution.
    Box,
    /// Scatter of locations over longitude/latitude axes.
    GeoScatter,
}

/// Artifact format.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    /// Raster PNG.
    #[cfg_attr(feature = "image", default)]
    Png,
    /// Static SVG.
    Svg,
    /// Standalone HTML page with an interactive chart.
    #[cfg_attr(not(feature = "image"), default)]
    Html,
}

impl OutputFormat {
    /// File extension, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Svg => "svg",
            Self::Png => "png",
        }
    }

    /// Whether this build can write the format.
    #[must_use]
    pub const fn is_available(self) -> bool {
        match self {
            Self::Html => true,
            Self::Svg | Self::Png => cfg!(feature = "image"),
        }
    }

    /// Formats this build can write.
    #[must_use]
    pub fn available() -> Vec<Self> {
        [Self::Png, Self::Svg, Self::Html]
            .into_iter()
            .filter(|f| f.is_available())
            .collect()
    }
}

fn default_width() -> u64 {
    1000
}

fn default_height() -> u64 {
    600
}

/// How one chart looks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSpec {
    /// Identifier, also the output file stem.
    pub id: String,
    /// Chart title.
    pub title: String,
    /// Chart kind.
    pub kind: ChartKind,
    /// Category/time axis label.
    #[serde(default)]
    pub x_label: Option<String>,
    /// Value axis label.
    #[serde(default)]
    pub y_label: Option<String>,
    /// Cut a hole in pie charts.
    #[serde(default)]
    pub donut: bool,
    /// Width in pixels.
    #[serde(default = "default_width")]
    pub width: u64,
    /// Height in pixels.
    #[serde(default = "default_height")]
    pub height: u64,
}

impl ChartSpec {
    /// A chart with default size and no axis labels.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, kind: ChartKind) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind,
            x_label: None,
            y_label: None,
            donut: false,
            width: default_width(),
            height: default_height(),
        }
    }
}

/// The numbers behind a chart.
#[derive(Debug, Clone, Copy)]
pub enum ChartData<'a> {
    /// Grouped counts.
    Table(&'a SummaryTable),
    /// A numeric summary.
    Distribution(&'a Distribution),
    /// Individual positions.
    Locations(&'a [IncidentLocation]),
}

impl ChartData<'_> {
    /// Short description for error messages.
    #[must_use]
    pub const fn describe(&self) -> &'static str {
        match self {
            Self::Table(_) => "a summary table",
            Self::Distribution(_) => "a distribution",
            Self::Locations(_) => "locations",
        }
    }
}

/// Writes charts into one directory in one format.
#[derive(Debug, Clone)]
pub struct Renderer {
    output_dir: PathBuf,
    format: OutputFormat,
}

impl Renderer {
    /// Creates a renderer. Charts use the dark theme.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::FormatUnavailable`] if this build cannot
    /// produce `format`.
    pub fn new(output_dir: impl Into<PathBuf>, format: OutputFormat) -> Result<Self, RenderError> {
        if !format.is_available() {
            return Err(RenderError::FormatUnavailable { format });
        }
        Ok(Self {
            output_dir: output_dir.into(),
            format,
        })
    }

    /// Directory charts are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Format charts are written in.
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Path the chart `id` is written to.
    #[must_use]
    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.output_dir
            .join(format!("{id}.{}", self.format.extension()))
    }

    /// Builds and writes one chart, returning the written path.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the data does not fit the chart kind, is
    /// empty, or the chart cannot be written.
    pub fn render(&self, spec: &ChartSpec, data: ChartData<'_>) -> Result<PathBuf, RenderError> {
        let chart = charts::build_chart(spec, data)?;

        std::fs::create_dir_all(&self.output_dir).map_err(|source| RenderError::Io {
            path: self.output_dir.clone(),
            source,
        })?;
        let path = self.artifact_path(&spec.id);

        self.write(spec, &chart, &path)?;
        log::info!("Rendered '{}' to {}", spec.id, path.display());
        Ok(path)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write(
        &self,
        spec: &ChartSpec,
        chart: &charming::Chart,
        path: &Path,
    ) -> Result<(), RenderError> {
        match self.format {
            OutputFormat::Html => charming::HtmlRenderer::new(&spec.title, spec.width, spec.height)
                .theme(Theme::Dark)
                .save(chart, path)
                .map_err(chart_error),
            #[cfg(feature = "image")]
            OutputFormat::Svg => charming::ImageRenderer::new(spec.width as u32, spec.height as u32)
                .theme(Theme::Dark)
                .save(chart, path)
                .map_err(chart_error),
            #[cfg(feature = "image")]
            OutputFormat::Png => charming::ImageRenderer::new(spec.width as u32, spec.height as u32)
                .theme(Theme::Dark)
                .save_format(charming::ImageFormat::Png, chart, path)
                .map_err(chart_error),
            #[cfg(not(feature = "image"))]
            format @ (OutputFormat::Svg | OutputFormat::Png) => {
                Err(RenderError::FormatUnavailable { format })
            }
        }
    }
}

fn chart_error(e: impl std::fmt::Debug) -> RenderError {
    RenderError::Chart {
        message: format!("{e:?}"),
    }
}
