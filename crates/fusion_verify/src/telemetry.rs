//! Recorded fusion telemetry.
//!
//! The fusion service writes one row per fixed sampling period. Row order is
//! time order, so a sample's index encodes elapsed time (`t = index * period`).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VerifyError};

/// Sampling period of the fusion service's telemetry log, in seconds.
pub const SAMPLE_PERIOD_SECONDS: f64 = 0.1;

/// One recorded point of fusion state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Horizontal distance between fused and truth position, meters.
    pub error_m: f64,
    pub fused_lat: f64,
    pub fused_lon: f64,
    pub truth_lat: f64,
    pub truth_lon: f64,
}

impl TelemetrySample {
    /// Sample carrying only an error magnitude. Positions are zeroed.
    #[must_use]
    pub fn with_error(error_m: f64) -> Self {
        Self {
            error_m,
            fused_lat: 0.0,
            fused_lon: 0.0,
            truth_lat: 0.0,
            truth_lon: 0.0,
        }
    }
}

/// Elapsed time of the sample at `index`.
#[must_use]
pub fn elapsed_seconds(index: usize, sample_period: f64) -> f64 {
    index as f64 * sample_period
}

const ERROR_COLUMNS: [&str; 1] = ["error_m"];
const FUSED_LAT_COLUMNS: [&str; 2] = ["fused_lat", "f_lat"];
const FUSED_LON_COLUMNS: [&str; 2] = ["fused_lon", "f_lon"];
const TRUTH_LAT_COLUMNS: [&str; 2] = ["truth_lat", "uav_lat"];
const TRUTH_LON_COLUMNS: [&str; 2] = ["truth_lon", "uav_lon"];

#[derive(Debug, Clone, Copy)]
struct ColumnLayout {
    error_m: usize,
    fused_lat: Option<usize>,
    fused_lon: Option<usize>,
    truth_lat: Option<usize>,
    truth_lon: Option<usize>,
}

fn find_column(headers: &[&str], names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|header| names.iter().any(|name| header.eq_ignore_ascii_case(name)))
}

impl ColumnLayout {
    fn from_header(path: &Path, header: &str) -> Result<Self> {
        let headers = header.split(',').map(str::trim).collect::<Vec<_>>();
        let error_m =
            find_column(&headers, &ERROR_COLUMNS).ok_or_else(|| VerifyError::TelemetryParse {
                path: path.to_path_buf(),
                line: 1,
                message: "header has no error_m column".to_string(),
            })?;

        Ok(Self {
            error_m,
            fused_lat: find_column(&headers, &FUSED_LAT_COLUMNS),
            fused_lon: find_column(&headers, &FUSED_LON_COLUMNS),
            truth_lat: find_column(&headers, &TRUTH_LAT_COLUMNS),
            truth_lon: find_column(&headers, &TRUTH_LON_COLUMNS),
        })
    }
}

fn parse_field(
    path: &Path,
    line: usize,
    fields: &[&str],
    index: Option<usize>,
    column: &str,
) -> Result<f64> {
    let Some(index) = index else {
        return Ok(0.0);
    };
    let raw = fields.get(index).ok_or_else(|| VerifyError::TelemetryParse {
        path: path.to_path_buf(),
        line,
        message: format!("row is missing column {column}"),
    })?;
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| VerifyError::TelemetryParse {
            path: path.to_path_buf(),
            line,
            message: format!("{column} is not numeric: {raw:?}"),
        })?;
    if !value.is_finite() {
        return Err(VerifyError::TelemetryParse {
            path: path.to_path_buf(),
            line,
            message: format!("{column} is not finite: {raw:?}"),
        });
    }
    Ok(value)
}

/// Parses telemetry CSV text. `path` is used for error reporting only.
pub fn parse_telemetry(path: &Path, content: &str) -> Result<Vec<TelemetrySample>> {
    let mut lines = content
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line))
        .filter(|(_, line)| !line.trim().is_empty());

    let Some((_, header)) = lines.next() else {
        return Ok(Vec::new());
    };
    let layout = ColumnLayout::from_header(path, header)?;

    let mut samples = Vec::new();
    for (line, raw) in lines {
        let fields = raw.split(',').collect::<Vec<_>>();
        let error_m = parse_field(path, line, &fields, Some(layout.error_m), "error_m")?;
        if error_m < 0.0 {
            return Err(VerifyError::TelemetryParse {
                path: path.to_path_buf(),
                line,
                message: format!("error_m must be non-negative, got {error_m}"),
            });
        }

        samples.push(TelemetrySample {
            error_m,
            fused_lat: parse_field(path, line, &fields, layout.fused_lat, "fused_lat")?,
            fused_lon: parse_field(path, line, &fields, layout.fused_lon, "fused_lon")?,
            truth_lat: parse_field(path, line, &fields, layout.truth_lat, "truth_lat")?,
            truth_lon: parse_field(path, line, &fields, layout.truth_lon, "truth_lon")?,
        });
    }

    Ok(samples)
}

/// Loads a telemetry artifact from disk.
pub fn load_telemetry(path: &Path) -> Result<Vec<TelemetrySample>> {
    if !path.exists() {
        return Err(VerifyError::MissingPath {
            path: path.to_path_buf(),
        });
    }
    let content = fs::read_to_string(path)?;
    parse_telemetry(path, &content)
}

/// Renders samples in the logical column layout, header included.
#[must_use]
pub fn render_telemetry_csv(samples: &[TelemetrySample]) -> String {
    let mut out = String::from("error_m,fused_lat,fused_lon,truth_lat,truth_lon\n");
    for sample in samples {
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            sample.error_m, sample.fused_lat, sample.fused_lon, sample.truth_lat, sample.truth_lon
        ));
    }
    out
}
