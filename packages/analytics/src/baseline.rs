//! Exposure baselines for rate normalization.
//!
//! A baseline file has one `key;exposure` record per line, for example
//! flight hours per year:
//!
//! ```text
//! # year;flight_hours
//! 2019;1843000
//! 2020;1522000,5
//! ```
//!
//! Lines starting with `#` are comments. A first line whose exposure is
//! not numeric is taken as a header.

use std::collections::BTreeMap;
use std::path::Path;

use air_incident_analytics_models::Baseline;
use air_incident_source::parsing::{non_empty, parse_number};

use crate::AnalyticsError;

/// Reads a baseline file, multiplying every rate by `scale`.
///
/// # Errors
///
/// Returns [`AnalyticsError::Io`] if the file cannot be read and
/// [`AnalyticsError::Baseline`] for a record without two fields, a
/// non-numeric exposure or a repeated key.
pub fn load_baseline(path: &Path, scale: f64) -> Result<Baseline, AnalyticsError> {
    let io_error = |source| AnalyticsError::Io {
        path: path.to_path_buf(),
        source,
    };
    let text = std::fs::read_to_string(path).map_err(io_error)?;
    let format_error = |line: u64, message: String| AnalyticsError::Baseline {
        path: path.to_path_buf(),
        line,
        message,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut exposure = BTreeMap::new();
    for (i, result) in reader.records().enumerate() {
        let record = result.map_err(|e| format_error(i as u64 + 1, e.to_string()))?;
        let line = record.position().map_or(i as u64 + 1, csv::Position::line);

        let (Some(key), Some(raw)) = (record.get(0).and_then(non_empty), record.get(1)) else {
            return Err(format_error(line, "expected 'key;exposure'".to_string()));
        };
        let Some(value) = parse_number(raw) else {
            if i == 0 {
                log::debug!("{}: treating first line as a header", path.display());
                continue;
            }
            return Err(format_error(line, format!("exposure '{raw}' is not a number")));
        };
        if exposure.insert(key.to_string(), value).is_some() {
            return Err(format_error(line, format!("key '{key}' appears more than once")));
        }
    }

    log::info!(
        "Loaded baseline with {} entries from {}",
        exposure.len(),
        path.display()
    );

    Ok(Baseline { exposure, scale })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.csv");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_keys_with_header_and_comments() {
        let (_dir, path) = write("year;hours\n# estimated\n2019;1000\n2020; 2000,5 \n");
        let baseline = load_baseline(&path, 100.0).unwrap();
        assert_eq!(baseline.exposure.len(), 2);
        assert_eq!(baseline.exposure["2020"], 2000.5);
        assert_eq!(baseline.rate("2019", 10), Some(1.0));
    }

    #[test]
    fn rejects_non_numeric_exposure_after_first_line() {
        let (_dir, path) = write("2019;1000\n2020;lots\n");
        let err = load_baseline(&path, 1.0).unwrap_err();
        assert!(matches!(err, AnalyticsError::Baseline { line: 2, .. }), "{err}");
    }

    #[test]
    fn rejects_repeated_keys() {
        let (_dir, path) = write("2019;1000\n2019;2000\n");
        assert!(load_baseline(&path, 1.0).is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_baseline(&dir.path().join("nope.csv"), 1.0).unwrap_err();
        assert!(matches!(err, AnalyticsError::Io { .. }));
    }
}
