//! Shared parsing utilities for raw occurrence fields.
//!
//! Column-name normalization plus the date, time, coordinate and count
//! parsers the cleaner applies to every row.

use chrono::{NaiveDate, NaiveTime};

/// Values the provider uses for "no data".
const NULL_MARKERS: &[&str] = &["", "***", "NULL", "NaN", "NAN", "-"];

/// Normalizes a column header: strips a byte order mark and surrounding
/// whitespace, lowercases, and turns inner whitespace and dashes into `_`.
#[must_use]
pub fn normalize_column_name(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Returns the trimmed value, or `None` if it is empty or a null marker.
#[must_use]
pub fn non_empty(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if NULL_MARKERS.iter().any(|m| m.eq_ignore_ascii_case(trimmed)) {
        None
    } else {
        Some(trimmed)
    }
}

/// Parses a calendar date, trying each format in order.
#[must_use]
pub fn parse_date(raw: &str, formats: &[String]) -> Option<NaiveDate> {
    let value = non_empty(raw)?;
    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

/// Formats a date with the first accepted format, the inverse of
/// [`parse_date`].
#[must_use]
pub fn format_date(date: NaiveDate, formats: &[String]) -> Option<String> {
    formats.first().map(|f| date.format(f).to_string())
}

/// Parses a time of day.
///
/// Returns `Ok(None)` when the field is empty and `Err(())` when it holds
/// something that matches none of the formats.
#[allow(clippy::result_unit_err)]
pub fn parse_time(raw: &str, formats: &[String]) -> Result<Option<NaiveTime>, ()> {
    let Some(value) = non_empty(raw) else {
        return Ok(None);
    };
    formats
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(value, format).ok())
        .map(Some)
        .ok_or(())
}

/// Parses a decimal-degree coordinate.
///
/// Accepts a decimal comma (`"-23,43"`). Returns `Ok(None)` for empty or
/// null-marker values and `Err(())` for text that is not a finite number.
#[allow(clippy::result_unit_err)]
pub fn parse_coordinate(raw: &str) -> Result<Option<f64>, ()> {
    let Some(value) = non_empty(raw) else {
        return Ok(None);
    };
    let normalized = if value.contains('.') {
        value.to_string()
    } else {
        value.replacen(',', ".", 1)
    };
    match normalized.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(()),
    }
}

/// Parses a non-negative count such as the number of aircraft involved.
/// Accepts a trailing `.0` left by spreadsheet exports.
#[must_use]
pub fn parse_count(raw: &str) -> Option<u32> {
    let value = non_empty(raw)?;
    let integral = value.strip_suffix(".0").unwrap_or(value);
    integral.parse().ok()
}

/// Parses a plain number with an optional decimal comma.
#[must_use]
pub fn parse_number(raw: &str) -> Option<f64> {
    parse_coordinate(raw).ok().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formats(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn normalizes_headers() {
        assert_eq!(normalize_column_name("\u{feff}Codigo_Ocorrencia "), "codigo_ocorrencia");
        assert_eq!(normalize_column_name("Ocorrencia  Dia"), "ocorrencia_dia");
        assert_eq!(normalize_column_name("fator-nome"), "fator_nome");
    }

    #[test]
    fn treats_null_markers_as_empty() {
        assert_eq!(non_empty(" *** "), None);
        assert_eq!(non_empty("null"), None);
        assert_eq!(non_empty(""), None);
        assert_eq!(non_empty(" SP "), Some("SP"));
    }

    #[test]
    fn parses_dates_in_any_configured_format() {
        let f = formats(&["%d/%m/%Y", "%Y-%m-%d"]);
        assert_eq!(
            parse_date("05/01/2020", &f),
            NaiveDate::from_ymd_opt(2020, 1, 5)
        );
        assert_eq!(
            parse_date("2020-01-05", &f),
            NaiveDate::from_ymd_opt(2020, 1, 5)
        );
        assert_eq!(parse_date("31/02/2020", &f), None);
        assert_eq!(parse_date("", &f), None);
    }

    #[test]
    fn date_round_trips_through_first_format() {
        let f = formats(&["%d/%m/%Y", "%Y-%m-%d"]);
        let mut date = NaiveDate::from_ymd_opt(2019, 12, 25).unwrap();
        for _ in 0..400 {
            let text = format_date(date, &f).unwrap();
            assert_eq!(parse_date(&text, &f), Some(date), "{text}");
            date = date.succ_opt().unwrap();
        }
    }

    #[test]
    fn parses_times() {
        let f = formats(&["%H:%M:%S", "%H:%M"]);
        assert_eq!(
            parse_time("14:30:00", &f),
            Ok(NaiveTime::from_hms_opt(14, 30, 0))
        );
        assert_eq!(
            parse_time("07:05", &f),
            Ok(NaiveTime::from_hms_opt(7, 5, 0))
        );
        assert_eq!(parse_time("", &f), Ok(None));
        assert_eq!(parse_time("25:99:00", &f), Err(()));
    }

    #[test]
    fn parses_coordinates() {
        assert_eq!(parse_coordinate("-23.4355"), Ok(Some(-23.4355)));
        assert_eq!(parse_coordinate("-23,4355"), Ok(Some(-23.4355)));
        assert_eq!(parse_coordinate("***"), Ok(None));
        assert_eq!(parse_coordinate(""), Ok(None));
        assert_eq!(parse_coordinate("-23°26'08''"), Err(()));
        assert_eq!(parse_coordinate("inf"), Err(()));
    }

    #[test]
    fn parses_counts() {
        assert_eq!(parse_count("2"), Some(2));
        assert_eq!(parse_count("1.0"), Some(1));
        assert_eq!(parse_count("***"), None);
        assert_eq!(parse_count("-1"), None);
    }
}
