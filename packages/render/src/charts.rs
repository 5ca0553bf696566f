//! Chart construction.
//!
//! Builds a [`Chart`] from a spec and its data without touching the
//! filesystem, so every kind can be checked in isolation.

use air_incident_analytics_models::{Distribution, IncidentLocation, SummaryTable};
use charming::{
    Chart,
    component::{Axis, Grid, Legend, Title},
    element::{AxisType, Tooltip, Trigger},
    series::{Bar, Boxplot, Line, Pie, Scatter},
};

use crate::{ChartData, ChartKind, ChartSpec, RenderError};

/// Builds the chart for `spec` from `data`.
///
/// # Errors
///
/// Returns [`RenderError::Unsupported`] when the kind cannot show the data
/// and [`RenderError::NoData`] when there is nothing to plot.
pub fn build_chart(spec: &ChartSpec, data: ChartData<'_>) -> Result<Chart, RenderError> {
    match (spec.kind, data) {
        (ChartKind::Line, ChartData::Table(table)) => line_chart(spec, table),
        (ChartKind::Bar, ChartData::Table(table)) => bar_chart(spec, table),
        (ChartKind::Pie, ChartData::Table(table)) => pie_chart(spec, table),
        (ChartKind::Box, ChartData::Distribution(distribution)) => {
            Ok(box_chart(spec, distribution))
        }
        (ChartKind::GeoScatter, ChartData::Locations(locations)) => {
            location_chart(spec, locations)
        }
        (ChartKind::GeoScatter, ChartData::Table(table)) => cell_chart(spec, table),
        (kind, data) => Err(RenderError::Unsupported {
            kind,
            data: data.describe(),
        }),
    }
}

fn base(spec: &ChartSpec, trigger: Trigger) -> Chart {
    Chart::new()
        .title(Title::new().text(spec.title.as_str()))
        .tooltip(Tooltip::new().trigger(trigger))
        .grid(Grid::new().contain_label(true))
}

fn category_axis(labels: Vec<String>, name: Option<&String>) -> Axis {
    let axis = Axis::new().type_(AxisType::Category).data(labels);
    match name {
        Some(name) => axis.name(name.as_str()),
        None => axis,
    }
}

fn value_axis(name: Option<&String>) -> Axis {
    let axis = Axis::new().type_(AxisType::Value);
    match name {
        Some(name) => axis.name(name.as_str()),
        None => axis,
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_value(count: u64) -> f64 {
    count as f64
}

fn line_chart(spec: &ChartSpec, table: &SummaryTable) -> Result<Chart, RenderError> {
    if table.is_empty() {
        return Err(RenderError::NoData);
    }
    let series = table.series();
    let labels = series[0].points.iter().map(|(l, _)| l.clone()).collect();

    let mut chart = base(spec, Trigger::Axis)
        .x_axis(category_axis(labels, spec.x_label.as_ref()))
        .y_axis(value_axis(spec.y_label.as_ref()));
    if series.len() > 1 {
        chart = chart.legend(Legend::new().data(series.iter().map(|s| s.name.clone()).collect()));
    }
    for s in series {
        chart = chart.series(
            Line::new()
                .name(s.name)
                .data(s.points.into_iter().map(|(_, c)| as_value(c)).collect()),
        );
    }
    Ok(chart)
}

/// Horizontal bars. Rows are reversed so the first (largest) group is
/// drawn at the top.
fn bar_chart(spec: &ChartSpec, table: &SummaryTable) -> Result<Chart, RenderError> {
    if table.is_empty() {
        return Err(RenderError::NoData);
    }
    let series = table.series();
    let labels = series[0].points.iter().rev().map(|(l, _)| l.clone()).collect();

    let mut chart = base(spec, Trigger::Axis)
        .y_axis(category_axis(labels, spec.x_label.as_ref()))
        .x_axis(value_axis(spec.y_label.as_ref()));
    if series.len() > 1 {
        chart = chart.legend(Legend::new().data(series.iter().map(|s| s.name.clone()).collect()));
    }
    for s in series {
        chart = chart.series(
            Bar::new()
                .name(s.name)
                .data(s.points.into_iter().rev().map(|(_, c)| as_value(c)).collect()),
        );
    }
    Ok(chart)
}

fn pie_chart(spec: &ChartSpec, table: &SummaryTable) -> Result<Chart, RenderError> {
    if table.dimensions.len() > 1 {
        return Err(RenderError::Unsupported {
            kind: ChartKind::Pie,
            data: "a multi-dimension table",
        });
    }
    if table.total() == 0 {
        return Err(RenderError::NoData);
    }
    let slices: Vec<(f64, String)> = table
        .rows
        .iter()
        .map(|r| (as_value(r.count), r.key[0].label()))
        .collect();
    let data: Vec<(f64, &str)> = slices.iter().map(|(v, l)| (*v, l.as_str())).collect();

    let pie = Pie::new().name(spec.title.as_str());
    let pie = if spec.donut {
        pie.radius(vec!["40%", "70%"])
    } else {
        pie.radius("70%")
    };
    Ok(base(spec, Trigger::Item)
        .legend(Legend::new().left("left"))
        .series(pie.data(data)))
}

fn box_chart(spec: &ChartSpec, distribution: &Distribution) -> Chart {
    base(spec, Trigger::Item)
        .y_axis(category_axis(
            vec![distribution.column.clone()],
            spec.x_label.as_ref(),
        ))
        .x_axis(value_axis(spec.y_label.as_ref()))
        .series(
            Boxplot::new()
                .name(distribution.column.as_str())
                .data(vec![distribution.five_numbers().to_vec()]),
        )
}

fn scatter_axes(chart: Chart) -> Chart {
    chart
        .x_axis(Axis::new().type_(AxisType::Value).name("longitude").scale(true))
        .y_axis(Axis::new().type_(AxisType::Value).name("latitude").scale(true))
}

/// One scatter series per classification.
fn location_chart(spec: &ChartSpec, locations: &[IncidentLocation]) -> Result<Chart, RenderError> {
    if locations.is_empty() {
        return Err(RenderError::NoData);
    }
    let mut groups: Vec<(&'static str, Vec<Vec<f64>>)> = Vec::new();
    for location in locations {
        let name = location.classification.raw_label();
        let point = vec![location.longitude, location.latitude];
        match groups.iter_mut().find(|(n, _)| *n == name) {
            Some((_, points)) => points.push(point),
            None => groups.push((name, vec![point])),
        }
    }

    let mut chart = scatter_axes(base(spec, Trigger::Item))
        .legend(Legend::new().data(groups.iter().map(|(n, _)| (*n).to_string()).collect()));
    for (name, points) in groups {
        chart = chart.series(Scatter::new().name(name).symbol_size(6.0).data(points));
    }
    Ok(chart)
}

/// Grid cells of a geographic table at their centers; the unlocated
/// bucket is left out.
fn cell_chart(spec: &ChartSpec, table: &SummaryTable) -> Result<Chart, RenderError> {
    let points: Vec<Vec<f64>> = table
        .rows
        .iter()
        .filter(|r| r.count > 0)
        .filter_map(|r| {
            let (lat, lng) = r.key.first()?.cell_center()?;
            Some(vec![lng, lat, as_value(r.count)])
        })
        .collect();
    if points.is_empty() {
        return Err(RenderError::NoData);
    }
    Ok(scatter_axes(base(spec, Trigger::Item))
        .series(Scatter::new().name(spec.title.as_str()).symbol_size(8.0).data(points)))
}
