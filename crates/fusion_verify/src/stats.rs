//! Descriptive error statistics over a telemetry artifact.

use std::fmt::Write as _;

use serde::Serialize;

use crate::telemetry::TelemetrySample;

/// Samples at or below this error are estimator initialization frames.
pub const INIT_FRAME_ERROR_M: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ErrorStats {
    pub mae: f64,
    pub rmse: f64,
    /// Sample standard deviation; NaN with fewer than two samples.
    pub std_dev: f64,
    pub median: f64,
    pub max: f64,
    pub samples: usize,
}

impl ErrorStats {
    /// Statistics over `error_m` after dropping initialization frames.
    /// `None` when nothing is left.
    #[must_use]
    pub fn from_samples(samples: &[TelemetrySample]) -> Option<Self> {
        let mut errors = samples
            .iter()
            .map(|sample| sample.error_m)
            .filter(|error| *error > INIT_FRAME_ERROR_M)
            .collect::<Vec<_>>();
        if errors.is_empty() {
            return None;
        }

        let count = errors.len() as f64;
        let mae = errors.iter().sum::<f64>() / count;
        let rmse = (errors.iter().map(|error| error * error).sum::<f64>() / count).sqrt();
        let std_dev = if errors.len() < 2 {
            f64::NAN
        } else {
            let variance =
                errors.iter().map(|error| (error - mae).powi(2)).sum::<f64>() / (count - 1.0);
            variance.sqrt()
        };

        errors.sort_by(f64::total_cmp);
        let mid = errors.len() / 2;
        let median = if errors.len() % 2 == 0 {
            (errors[mid - 1] + errors[mid]) / 2.0
        } else {
            errors[mid]
        };
        let max = errors[errors.len() - 1];

        Some(Self {
            mae,
            rmse,
            std_dev,
            median,
            max,
            samples: errors.len(),
        })
    }
}

#[must_use]
pub fn render_stats(title: &str, stats: &ErrorStats) -> String {
    let banner = "=".repeat(50);
    let mut out = String::new();
    let _ = writeln!(out, "{banner}");
    let _ = writeln!(out, " {title}");
    let _ = writeln!(out, "{banner}");
    let _ = writeln!(out, "Mean Absolute Error (MAE): {:.2} m", stats.mae);
    let _ = writeln!(out, "Root Mean Square Error:    {:.2} m", stats.rmse);
    let _ = writeln!(out, "Standard Deviation:        {:.2} m", stats.std_dev);
    let _ = writeln!(out, "Median Error:              {:.2} m", stats.median);
    let _ = writeln!(out, "Max Peak Error:            {:.2} m", stats.max);
    let _ = writeln!(out, "Total Samples:             {}", stats.samples);
    let _ = writeln!(out, "{banner}");
    out
}

/// Two runs side by side; deltas are `candidate - baseline`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsComparison {
    pub baseline: ErrorStats,
    pub candidate: ErrorStats,
    pub mae_delta: f64,
    pub rmse_delta: f64,
    pub max_delta: f64,
}

impl StatsComparison {
    #[must_use]
    pub fn new(baseline: ErrorStats, candidate: ErrorStats) -> Self {
        Self {
            baseline,
            candidate,
            mae_delta: candidate.mae - baseline.mae,
            rmse_delta: candidate.rmse - baseline.rmse,
            max_delta: candidate.max - baseline.max,
        }
    }

    #[must_use]
    pub fn candidate_improves(&self) -> bool {
        self.mae_delta < 0.0
    }
}
