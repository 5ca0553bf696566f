//! Value counts and numeric summaries over raw tables.
//!
//! These work on any loaded table, including the auxiliary aircraft and
//! contributing-factor tables, without going through the cleaner.

use std::cmp::Reverse;
use std::collections::HashMap;

use air_incident_analytics_models::{
    ColumnCountSpec, ColumnFilter, Dimension, Distribution, DistributionSpec, GroupValue,
    SummaryRow, SummaryTable,
};
use air_incident_source::parsing::{non_empty, parse_number};
use air_incident_source_models::{RawRecord, RawTable};

use crate::AnalyticsError;

fn column_index(table: &RawTable, column: &str) -> Result<usize, AnalyticsError> {
    table
        .column_index(column)
        .ok_or_else(|| AnalyticsError::UnknownColumn {
            table: table.name.clone(),
            column: column.to_string(),
        })
}

/// Filters resolved to column positions.
struct ResolvedFilters<'a>(Vec<(usize, &'a ColumnFilter)>);

impl<'a> ResolvedFilters<'a> {
    fn new(table: &RawTable, filters: &'a [ColumnFilter]) -> Result<Self, AnalyticsError> {
        filters
            .iter()
            .map(|f| column_index(table, &f.column).map(|idx| (idx, f)))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    fn accept(&self, record: &RawRecord) -> bool {
        self.0.iter().all(|(idx, filter)| {
            filter.matches(record.values.get(*idx).map_or("", String::as_str))
        })
    }
}

/// Counts the distinct values of `spec.columns` in `table`.
///
/// Several columns are joined with `spec.separator`, skipping empty parts.
/// Rows whose resulting value is empty are not counted. Values are ordered
/// by descending count, ties by value.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidSpec`] if no column is given and
/// [`AnalyticsError::UnknownColumn`] if a column or filter column is not
/// in the table.
pub fn column_counts(
    table: &RawTable,
    spec: &ColumnCountSpec,
) -> Result<SummaryTable, AnalyticsError> {
    if spec.columns.is_empty() {
        return Err(AnalyticsError::InvalidSpec {
            message: "column counts need at least one column".to_string(),
        });
    }
    let indices = spec
        .columns
        .iter()
        .map(|c| column_index(table, c))
        .collect::<Result<Vec<_>, _>>()?;
    let filters = ResolvedFilters::new(table, &spec.filters)?;

    let mut counts: HashMap<String, u64> = HashMap::new();
    for record in table.records.iter().filter(|r| filters.accept(r)) {
        let parts = indices
            .iter()
            .filter_map(|&i| record.values.get(i).and_then(|v| non_empty(v)))
            .collect::<Vec<_>>();
        let joined = parts.join(&spec.separator);
        let value = match &spec.split_before {
            Some(sep) => joined.split(sep.as_str()).next().unwrap_or_default().trim(),
            None => joined.trim(),
        };
        if value.is_empty() {
            continue;
        }
        *counts.entry(value.to_string()).or_insert(0) += 1;
    }

    let mut values = counts.into_iter().collect::<Vec<_>>();
    values.sort_by(|(a, ca), (b, cb)| Reverse(*ca).cmp(&Reverse(*cb)).then_with(|| a.cmp(b)));
    if let Some(n) = spec.top {
        values.truncate(n);
    }

    Ok(SummaryTable {
        dimensions: vec![Dimension::Column {
            name: spec.columns.join("+"),
        }],
        rows: values
            .into_iter()
            .map(|(label, count)| SummaryRow {
                key: vec![GroupValue::Category { label }],
                count,
                rate: None,
            })
            .collect(),
    })
}

/// Summarizes the numeric values of `spec.column`.
///
/// Empty and non-numeric values are skipped, as are values outside the
/// optional exclusive bounds. Quartiles use linear interpolation between
/// the closest ranks.
///
/// # Errors
///
/// Returns [`AnalyticsError::UnknownColumn`] for a missing column and
/// [`AnalyticsError::NoValues`] when no value remains.
pub fn column_distribution(
    table: &RawTable,
    spec: &DistributionSpec,
) -> Result<Distribution, AnalyticsError> {
    let idx = column_index(table, &spec.column)?;
    let filters = ResolvedFilters::new(table, &spec.filters)?;

    let mut values = table
        .records
        .iter()
        .filter(|r| filters.accept(r))
        .filter_map(|r| r.values.get(idx).and_then(|v| parse_number(v)))
        .filter(|v| spec.greater_than.is_none_or(|lo| *v > lo))
        .filter(|v| spec.less_than.is_none_or(|hi| *v < hi))
        .collect::<Vec<f64>>();

    if values.is_empty() {
        return Err(AnalyticsError::NoValues {
            column: spec.column.clone(),
        });
    }
    values.sort_by(f64::total_cmp);

    Ok(describe(&spec.column, &values))
}

#[allow(clippy::cast_precision_loss)]
fn describe(column: &str, sorted: &[f64]) -> Distribution {
    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let std_dev = (sorted.len() > 1).then(|| {
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        variance.sqrt()
    });

    Distribution {
        column: column.to_string(),
        count: sorted.len() as u64,
        mean,
        std_dev,
        min: sorted[0],
        q1: quantile(sorted, 0.25),
        median: quantile(sorted, 0.5),
        q3: quantile(sorted, 0.75),
        max: sorted[sorted.len() - 1],
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use air_incident_source_models::RecordSource;

    use super::*;

    fn aircraft() -> RawTable {
        let columns = ["fabricante", "modelo", "dano", "fatalidades", "ano", "categoria"];
        let rows = [
            ["CESSNA", "172", "LEVE", "0", "1978", "FALHA DO MOTOR | SCF-PP"],
            ["CESSNA", "172", "SUBSTANCIAL", "1", "1980", "FALHA DO MOTOR | SCF-PP"],
            ["PIPER", "PA-28", "DESTRUÍDA", "4", "0", "PERDA DE CONTROLE | LOC-I"],
            ["CESSNA", "210", "NENHUM", "0", "2001", "***"],
            ["EMBRAER", "", "DESTRUÍDA", "2", "9999", "PERDA DE CONTROLE | LOC-I"],
            ["***", "***", "SUBSTANCIAL", "***", "1995,0", "OUTROS | OTHR"],
        ];
        let mut table = RawTable::new(
            "aeronave",
            columns.iter().map(ToString::to_string).collect(),
        );
        table.sources.push(RecordSource {
            year: 2020,
            path: PathBuf::from("aeronave_2020.csv"),
        });
        for (i, row) in rows.iter().enumerate() {
            table.records.push(RawRecord {
                source: 0,
                line: i as u64 + 2,
                values: row.iter().map(ToString::to_string).collect(),
            });
        }
        table
    }

    fn labels(table: &SummaryTable) -> Vec<(String, u64)> {
        table.rows.iter().map(|r| (r.key[0].label(), r.count)).collect()
    }

    #[test]
    fn counts_values_descending_and_skips_empty() {
        let table = column_counts(&aircraft(), &ColumnCountSpec::of("fabricante")).unwrap();
        assert_eq!(
            labels(&table),
            vec![
                ("CESSNA".to_string(), 3),
                ("EMBRAER".to_string(), 1),
                ("PIPER".to_string(), 1),
            ]
        );
        assert_eq!(table.dimensions, vec![Dimension::Column { name: "fabricante".to_string() }]);
    }

    #[test]
    fn joins_columns() {
        let mut spec = ColumnCountSpec::of("fabricante");
        spec.columns.push("modelo".to_string());
        spec.top = Some(2);
        let table = column_counts(&aircraft(), &spec).unwrap();
        assert_eq!(
            labels(&table),
            vec![("CESSNA 172".to_string(), 2), ("CESSNA 210".to_string(), 1)]
        );
    }

    #[test]
    fn splits_category_before_separator() {
        let mut spec = ColumnCountSpec::of("categoria");
        spec.split_before = Some("|".to_string());
        let table = column_counts(&aircraft(), &spec).unwrap();
        assert_eq!(
            labels(&table),
            vec![
                ("FALHA DO MOTOR".to_string(), 2),
                ("PERDA DE CONTROLE".to_string(), 2),
                ("OUTROS".to_string(), 1),
            ]
        );
    }

    #[test]
    fn filters_rows_before_counting() {
        let mut spec = ColumnCountSpec::of("fabricante");
        spec.filters.push(ColumnFilter {
            column: "dano".to_string(),
            include: vec!["DESTRUÍDA".to_string()],
            exclude: Vec::new(),
        });
        let table = column_counts(&aircraft(), &spec).unwrap();
        assert_eq!(table.total(), 2);
    }

    #[test]
    fn unknown_column_is_an_error() {
        let err = column_counts(&aircraft(), &ColumnCountSpec::of("nope")).unwrap_err();
        assert!(matches!(
            err,
            AnalyticsError::UnknownColumn { ref column, .. } if column == "nope"
        ));
    }

    #[test]
    fn distribution_with_exclusive_bounds() {
        let spec = DistributionSpec {
            column: "ano".to_string(),
            filters: Vec::new(),
            greater_than: Some(0.0),
            less_than: Some(2100.0),
        };
        let d = column_distribution(&aircraft(), &spec).unwrap();
        // 1978, 1980, 1995, 2001
        assert_eq!(d.count, 4);
        assert_eq!(d.min, 1978.0);
        assert_eq!(d.max, 2001.0);
        assert!((d.median - 1987.5).abs() < 1e-9);
        assert!((d.q1 - 1979.5).abs() < 1e-9);
        assert!((d.q3 - 1996.5).abs() < 1e-9);
        assert!((d.mean - 1988.5).abs() < 1e-9);
    }

    #[test]
    fn distribution_respects_filters() {
        let spec = DistributionSpec {
            column: "fatalidades".to_string(),
            filters: vec![ColumnFilter {
                column: "dano".to_string(),
                include: Vec::new(),
                exclude: vec!["NENHUM".to_string(), "LEVE".to_string()],
            }],
            greater_than: None,
            less_than: None,
        };
        let d = column_distribution(&aircraft(), &spec).unwrap();
        // SUBSTANCIAL 1, DESTRUÍDA 4, DESTRUÍDA 2 (the "***" row has no value)
        assert_eq!(d.count, 3);
        assert_eq!(d.five_numbers(), [1.0, 1.5, 2.0, 3.0, 4.0]);
        assert_eq!(d.std_dev.map(|s| (s * 1000.0).round()), Some(1528.0));
    }

    #[test]
    fn single_value_has_no_std_dev() {
        let spec = DistributionSpec {
            column: "fatalidades".to_string(),
            filters: vec![ColumnFilter {
                column: "fabricante".to_string(),
                include: vec!["PIPER".to_string()],
                exclude: Vec::new(),
            }],
            greater_than: None,
            less_than: None,
        };
        let d = column_distribution(&aircraft(), &spec).unwrap();
        assert_eq!(d.count, 1);
        assert_eq!(d.std_dev, None);
        assert_eq!(d.median, 4.0);
    }

    #[test]
    fn empty_distribution_is_an_error() {
        let spec = DistributionSpec {
            column: "ano".to_string(),
            filters: Vec::new(),
            greater_than: Some(3000.0),
            less_than: None,
        };
        assert!(matches!(
            column_distribution(&aircraft(), &spec),
            Err(AnalyticsError::NoValues { .. })
        ));
    }
}
