//! Grouping of cleaned incidents into summary tables.
//!
//! Time dimensions are ordered chronologically and gap-filled between the
//! first and last observed value. Categorical dimensions are ordered by
//! descending count, ties broken by label. Multi-dimension tables hold the
//! full cross product of every dimension's values, so a month with no
//! accidents still shows up as a zero.

use std::cmp::Reverse;
use std::collections::HashMap;

use air_incident_analytics_models::{
    Dimension, GroupValue, GroupingSpec, IncidentFilter, IncidentLocation, SummaryRow,
    SummaryTable,
};
use air_incident_occurrence_models::UNKNOWN_LABEL;
use air_incident_source_models::CleanedIncident;
use chrono::Datelike as _;

use crate::AnalyticsError;

/// Whether `incident` passes `filter`.
#[must_use]
pub fn matches_filter(incident: &CleanedIncident, filter: &IncidentFilter) -> bool {
    let date = incident.occurred_at.date();
    (filter.classifications.is_empty() || filter.classifications.contains(&incident.classification))
        && filter.since.is_none_or(|since| date >= since)
        && filter.until.is_none_or(|until| date < until)
        && (!filter.located_only || incident.location().is_some())
}

/// Counts incidents per group of `spec.dimensions`.
///
/// Without `top`, the counts sum to the number of incidents passing the
/// filter; incidents without a valid location land in the
/// [`GroupValue::Unlocated`] bucket of a geographic dimension.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidSpec`] if no dimension is given, a
/// dimension does not apply to incidents, or a geographic cell size is not
/// a positive number of at least a thousandth of a degree.
pub fn group_incidents(
    incidents: &[CleanedIncident],
    spec: &GroupingSpec,
) -> Result<SummaryTable, AnalyticsError> {
    if spec.dimensions.is_empty() {
        return Err(AnalyticsError::InvalidSpec {
            message: "at least one dimension is required".to_string(),
        });
    }
    for dimension in &spec.dimensions {
        check_dimension(dimension)?;
    }

    let mut counts: HashMap<Vec<GroupValue>, u64> = HashMap::new();
    for incident in incidents.iter().filter(|i| matches_filter(i, &spec.filter)) {
        let key = spec
            .dimensions
            .iter()
            .map(|d| group_value(incident, d))
            .collect::<Vec<_>>();
        *counts.entry(key).or_insert(0) += 1;
    }

    let domains = spec
        .dimensions
        .iter()
        .enumerate()
        .map(|(idx, dimension)| domain(&counts, idx, dimension, spec.top))
        .collect::<Vec<_>>();

    let rows = cross_product(&domains)
        .into_iter()
        .map(|key| {
            let count = counts.get(&key).copied().unwrap_or(0);
            let rate = spec
                .baseline
                .as_ref()
                .and_then(|b| b.rate(&key[0].label(), count));
            SummaryRow { key, count, rate }
        })
        .collect::<Vec<_>>();

    log::debug!(
        "Grouped {} incidents by [{}] into {} rows",
        counts.values().sum::<u64>(),
        spec.dimensions
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<&str>>()
            .join(", "),
        rows.len()
    );

    Ok(SummaryTable {
        dimensions: spec.dimensions.clone(),
        rows,
    })
}

/// Valid locations of the incidents passing `filter`, in input order.
#[must_use]
pub fn incident_locations(
    incidents: &[CleanedIncident],
    filter: &IncidentFilter,
) -> Vec<IncidentLocation> {
    incidents
        .iter()
        .filter(|i| matches_filter(i, filter))
        .filter_map(|i| {
            let (latitude, longitude) = i.location()?;
            Some(IncidentLocation {
                id: i.id.clone(),
                latitude,
                longitude,
                label: i.city.clone(),
                classification: i.classification,
            })
        })
        .collect()
}

fn check_dimension(dimension: &Dimension) -> Result<(), AnalyticsError> {
    match dimension {
        Dimension::GeoBucket { size_degrees } => {
            if size_degrees.is_finite() && *size_degrees >= 0.001 && *size_degrees <= 180.0 {
                Ok(())
            } else {
                Err(AnalyticsError::InvalidSpec {
                    message: format!("geographic cell size {size_degrees} is out of range"),
                })
            }
        }
        Dimension::Column { name } => Err(AnalyticsError::InvalidSpec {
            message: format!("column dimension '{name}' does not apply to incidents"),
        }),
        _ => Ok(()),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn group_value(incident: &CleanedIncident, dimension: &Dimension) -> GroupValue {
    match dimension {
        Dimension::Month => GroupValue::Month {
            year: incident.occurred_at.year(),
            month: incident.occurred_at.month(),
        },
        Dimension::Year => GroupValue::Year {
            year: incident.occurred_at.year(),
        },
        Dimension::OccurrenceType => GroupValue::category(incident.occurrence_type.label()),
        Dimension::OccurrenceCategory => {
            GroupValue::category(incident.occurrence_type.category())
        }
        Dimension::Classification => GroupValue::category(incident.classification.raw_label()),
        Dimension::State => {
            GroupValue::category(incident.state.as_deref().unwrap_or(UNKNOWN_LABEL))
        }
        Dimension::GeoBucket { size_degrees } => {
            let size_millidegrees = (size_degrees * 1000.0).round() as u32;
            let size = f64::from(size_millidegrees) / 1000.0;
            incident
                .location()
                .map_or(GroupValue::Unlocated, |(lat, lng)| GroupValue::GeoCell {
                    lat_index: (lat / size).floor() as i32,
                    lng_index: (lng / size).floor() as i32,
                    size_millidegrees,
                })
        }
        Dimension::Column { name } => GroupValue::category(name.as_str()),
    }
}

/// Ordered values of dimension `idx`.
fn domain(
    counts: &HashMap<Vec<GroupValue>, u64>,
    idx: usize,
    dimension: &Dimension,
    top: Option<usize>,
) -> Vec<GroupValue> {
    if dimension.is_temporal() {
        let min = counts.keys().map(|k| &k[idx]).min();
        let max = counts.keys().map(|k| &k[idx]).max();
        return match (min, max) {
            (Some(min), Some(max)) => time_range(min, max),
            _ => Vec::new(),
        };
    }

    let mut marginal: HashMap<&GroupValue, u64> = HashMap::new();
    for (key, count) in counts {
        *marginal.entry(&key[idx]).or_insert(0) += count;
    }
    let mut values = marginal.into_iter().collect::<Vec<_>>();
    values.sort_by(|(a, ca), (b, cb)| {
        Reverse(*ca)
            .cmp(&Reverse(*cb))
            .then_with(|| a.label().cmp(&b.label()))
    });
    if let Some(n) = top {
        values.truncate(n);
    }
    values.into_iter().map(|(v, _)| v.clone()).collect()
}

/// Every month or year from `min` to `max` inclusive.
fn time_range(min: &GroupValue, max: &GroupValue) -> Vec<GroupValue> {
    match (min, max) {
        (
            GroupValue::Month {
                year: y0,
                month: m0,
            },
            GroupValue::Month {
                year: y1,
                month: m1,
            },
        ) => {
            let mut out = Vec::new();
            let (mut year, mut month) = (*y0, *m0);
            while (year, month) <= (*y1, *m1) {
                out.push(GroupValue::Month { year, month });
                if month == 12 {
                    year += 1;
                    month = 1;
                } else {
                    month += 1;
                }
            }
            out
        }
        (GroupValue::Year { year: y0 }, GroupValue::Year { year: y1 }) => {
            (*y0..=*y1).map(|year| GroupValue::Year { year }).collect()
        }
        _ => vec![min.clone()],
    }
}

fn cross_product(domains: &[Vec<GroupValue>]) -> Vec<Vec<GroupValue>> {
    domains.iter().fold(vec![Vec::new()], |prefixes, domain| {
        prefixes
            .iter()
            .flat_map(|prefix| {
                domain.iter().map(move |value| {
                    let mut key = prefix.clone();
                    key.push(value.clone());
                    key
                })
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use air_incident_analytics_models::Baseline;
    use air_incident_occurrence_models::{OccurrenceClass, OccurrenceType};
    use air_incident_source_models::CoordinateStatus;
    use chrono::NaiveDate;

    use super::*;

    fn incident(
        id: &str,
        date: &str,
        class: OccurrenceClass,
        code: Option<&str>,
    ) -> CleanedIncident {
        CleanedIncident {
            id: id.to_string(),
            year: 2020,
            occurred_at: NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            latitude: Some(-15.5),
            longitude: Some(-47.5),
            coordinates: CoordinateStatus::Valid,
            occurrence_type: code.map_or(OccurrenceType::Unknown { code: None }, |c| {
                OccurrenceType::Known {
                    code: c.to_string(),
                    label: format!("label {c}"),
                    category: format!("category {c}"),
                }
            }),
            classification: class,
            aircraft_model: None,
            aircraft_maker: None,
            operator_category: None,
            city: Some("BRASILIA".to_string()),
            state: Some("DF".to_string()),
            investigation_status: None,
            aircraft_involved: Some(1),
            description: None,
        }
    }

    fn fixture() -> Vec<CleanedIncident> {
        use OccurrenceClass::{Accident, Incident, SeriousIncident};
        vec![
            incident("1", "2020-01-10", Accident, Some("LOC-I")),
            incident("2", "2020-01-20", Incident, Some("LOC-I")),
            incident("3", "2020-04-02", Incident, Some("BIRD")),
            incident("4", "2020-04-03", SeriousIncident, None),
            incident("5", "2019-11-30", Incident, Some("BIRD")),
            incident("6", "2020-04-09", Incident, Some("LOC-I")),
        ]
    }

    #[test]
    fn monthly_series_fills_empty_months_with_zero() {
        let table =
            group_incidents(&fixture(), &GroupingSpec::new(vec![Dimension::Month])).unwrap();
        let labels: Vec<String> = table.rows.iter().map(|r| r.key[0].label()).collect();
        assert_eq!(
            labels,
            vec!["2019-11", "2019-12", "2020-01", "2020-02", "2020-03", "2020-04"]
        );
        assert_eq!(table.count_of(&["2019-12"]), Some(0));
        assert_eq!(table.count_of(&["2020-03"]), Some(0));
        assert_eq!(table.count_of(&["2020-04"]), Some(3));
    }

    #[test]
    fn counts_sum_to_filtered_total() {
        let incidents = fixture();
        let dimensions = [
            vec![Dimension::Month],
            vec![Dimension::Year],
            vec![Dimension::OccurrenceType],
            vec![Dimension::OccurrenceCategory],
            vec![Dimension::Classification],
            vec![Dimension::State],
            vec![Dimension::GeoBucket { size_degrees: 1.0 }],
            vec![Dimension::Month, Dimension::Classification],
            vec![Dimension::Year, Dimension::OccurrenceType, Dimension::State],
        ];
        for dims in dimensions {
            let table = group_incidents(&incidents, &GroupingSpec::new(dims.clone())).unwrap();
            assert_eq!(table.total(), incidents.len() as u64, "{dims:?}");
        }
    }

    #[test]
    fn categorical_groups_order_by_descending_count_then_label() {
        let table =
            group_incidents(&fixture(), &GroupingSpec::new(vec![Dimension::Classification]))
                .unwrap();
        let labels: Vec<String> = table.rows.iter().map(|r| r.key[0].label()).collect();
        assert_eq!(labels, vec!["INCIDENTE", "ACIDENTE", "INCIDENTE GRAVE"]);
        assert_eq!(table.rows[0].count, 4);
    }

    #[test]
    fn unknown_types_form_their_own_group() {
        let table =
            group_incidents(&fixture(), &GroupingSpec::new(vec![Dimension::OccurrenceType]))
                .unwrap();
        assert_eq!(table.count_of(&["label LOC-I"]), Some(3));
        assert_eq!(table.count_of(&[UNKNOWN_LABEL]), Some(1));
    }

    #[test]
    fn multi_dimension_emits_full_cross_product() {
        let spec = GroupingSpec::new(vec![Dimension::Month, Dimension::Classification]);
        let table = group_incidents(&fixture(), &spec).unwrap();
        // 6 months x 3 observed classes
        assert_eq!(table.rows.len(), 18);
        assert_eq!(table.count_of(&["2020-02", "ACIDENTE"]), Some(0));
        assert_eq!(table.count_of(&["2020-01", "ACIDENTE"]), Some(1));
        // rows follow month first, then class order
        assert_eq!(table.rows[0].key[0].label(), "2019-11");
        assert_eq!(table.rows[0].key[1].label(), "INCIDENTE");
        assert_eq!(table.series().len(), 3);
    }

    #[test]
    fn filter_restricts_classification_and_dates() {
        let mut spec = GroupingSpec::new(vec![Dimension::Month]);
        spec.filter = IncidentFilter {
            classifications: vec![OccurrenceClass::Incident],
            since: NaiveDate::from_ymd_opt(2020, 1, 1),
            until: NaiveDate::from_ymd_opt(2020, 4, 5),
            located_only: false,
        };
        let table = group_incidents(&fixture(), &spec).unwrap();
        assert_eq!(table.total(), 2);
        assert_eq!(table.rows.first().unwrap().key[0].label(), "2020-01");
        assert_eq!(table.rows.last().unwrap().key[0].label(), "2020-04");
    }

    #[test]
    fn geo_buckets_include_unlocated() {
        let mut incidents = fixture();
        incidents[0].coordinates = CoordinateStatus::OutOfRange;
        incidents[0].latitude = Some(0.0);
        incidents[0].longitude = Some(0.0);
        incidents[1].coordinates = CoordinateStatus::Missing;

        let spec = GroupingSpec::new(vec![Dimension::GeoBucket { size_degrees: 1.0 }]);
        let table = group_incidents(&incidents, &spec).unwrap();
        assert_eq!(table.count_of(&["unlocated"]), Some(2));
        assert_eq!(table.count_of(&["-16.000,-48.000"]), Some(4));
        assert_eq!(table.total(), 6);

        let located = incident_locations(
            &incidents,
            &IncidentFilter {
                located_only: true,
                ..IncidentFilter::default()
            },
        );
        assert_eq!(located.len(), 4);
        assert!(located.iter().all(|l| l.id != "1"));
    }

    #[test]
    fn top_truncates_categorical_values() {
        let mut spec = GroupingSpec::new(vec![Dimension::OccurrenceType]);
        spec.top = Some(1);
        let table = group_incidents(&fixture(), &spec).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].key[0].label(), "label LOC-I");
    }

    #[test]
    fn rates_use_baseline_exposure() {
        let mut spec = GroupingSpec::new(vec![Dimension::Year]);
        spec.baseline = Some(Baseline {
            exposure: BTreeMap::from([("2020".to_string(), 1000.0)]),
            scale: 100.0,
        });
        let table = group_incidents(&fixture(), &spec).unwrap();
        assert_eq!(table.rows[0].key[0].label(), "2019");
        assert_eq!(table.rows[0].rate, None);
        assert_eq!(table.rows[1].count, 5);
        assert_eq!(table.rows[1].rate, Some(0.5));
    }

    #[test]
    fn empty_input_yields_empty_table() {
        let table = group_incidents(&[], &GroupingSpec::new(vec![Dimension::Month])).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn rejects_invalid_specs() {
        assert!(group_incidents(&fixture(), &GroupingSpec::new(Vec::new())).is_err());
        assert!(
            group_incidents(
                &fixture(),
                &GroupingSpec::new(vec![Dimension::GeoBucket { size_degrees: 0.0 }])
            )
            .is_err()
        );
        assert!(
            group_incidents(
                &fixture(),
                &GroupingSpec::new(vec![Dimension::Column {
                    name: "x".to_string()
                }])
            )
            .is_err()
        );
    }
}
