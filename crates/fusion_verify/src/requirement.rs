//! Quantitative fusion requirements.
//!
//! Every requirement consumes the full telemetry of one scenario and returns a
//! single [`CheckResult`]. Requirements hold configuration only; `validate` is a
//! pure function of its input and never fails. Empty or short inputs are
//! filtered upstream by the validator's minimum-window gate; if one slips
//! through anyway the check fails closed.
//!
//! All comparisons are strict: a measurement equal to its threshold fails.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::telemetry::{SAMPLE_PERIOD_SECONDS, TelemetrySample, elapsed_seconds};

/// First sample index of the steady-state window (10 s at 0.1 s sampling).
pub const STEADY_STATE_START: usize = 100;

/// Absolute error bound, meters, that defines "converged".
pub const CONVERGENCE_BOUND_M: f64 = 20.0;

/// Reported convergence time, seconds, when the error never drops below the bound.
pub const NOT_CONVERGED_SECONDS: f64 = 99.9;

/// Outcome of one requirement against one scenario's telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub srid: String,
    pub pass: bool,
    pub value: f64,
    pub detail: String,
}

impl CheckResult {
    #[must_use]
    pub fn status_label(&self) -> &'static str {
        if self.pass { "PASS" } else { "FAIL" }
    }
}

/// A single formal requirement.
///
/// Implementors must be stateless with respect to `validate`: the same
/// validator instance is shared read-only across every scenario of a batch.
pub trait Requirement: fmt::Debug + Send + Sync {
    /// Stable requirement identifier, e.g. `SRID-FUS-001`.
    fn srid(&self) -> &str;

    fn threshold(&self) -> f64;

    /// First sample index this requirement reads. The validator's minimum window
    /// must be at least this large.
    fn window_offset(&self) -> usize {
        0
    }

    fn validate(&self, telemetry: &[TelemetrySample]) -> CheckResult;
}

fn steady_state(telemetry: &[TelemetrySample], start: usize) -> &[TelemetrySample] {
    telemetry.get(start..).unwrap_or_default()
}

fn check(srid: &str, value: f64, threshold: f64, detail: String) -> CheckResult {
    CheckResult {
        srid: srid.to_string(),
        pass: value < threshold,
        value,
        detail,
    }
}

fn fail_closed(srid: &str, detail: String) -> CheckResult {
    CheckResult {
        srid: srid.to_string(),
        pass: false,
        value: f64::NAN,
        detail,
    }
}

/// Mean steady-state error must stay below the threshold (meters).
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyRequirement {
    srid: String,
    threshold_m: f64,
    steady_state_start: usize,
}

impl AccuracyRequirement {
    pub fn new(srid: impl Into<String>, threshold_m: f64) -> Self {
        Self {
            srid: srid.into(),
            threshold_m,
            steady_state_start: STEADY_STATE_START,
        }
    }

    #[must_use]
    pub fn with_steady_state_start(mut self, start: usize) -> Self {
        self.steady_state_start = start;
        self
    }
}

impl Requirement for AccuracyRequirement {
    fn srid(&self) -> &str {
        &self.srid
    }

    fn threshold(&self) -> f64 {
        self.threshold_m
    }

    fn window_offset(&self) -> usize {
        self.steady_state_start
    }

    fn validate(&self, telemetry: &[TelemetrySample]) -> CheckResult {
        let detail = format!("Average Error < {}m", self.threshold_m);
        let window = steady_state(telemetry, self.steady_state_start);
        if window.is_empty() {
            return fail_closed(&self.srid, detail);
        }

        let sum = window.iter().map(|sample| sample.error_m).sum::<f64>();
        let mean = sum / window.len() as f64;
        check(&self.srid, mean, self.threshold_m, detail)
    }
}

/// Peak steady-state error must stay below the threshold (meters).
///
/// Catches intermittent spikes that an acceptable mean would hide.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityRequirement {
    srid: String,
    threshold_m: f64,
    steady_state_start: usize,
}

impl StabilityRequirement {
    pub fn new(srid: impl Into<String>, threshold_m: f64) -> Self {
        Self {
            srid: srid.into(),
            threshold_m,
            steady_state_start: STEADY_STATE_START,
        }
    }

    #[must_use]
    pub fn with_steady_state_start(mut self, start: usize) -> Self {
        self.steady_state_start = start;
        self
    }
}

impl Requirement for StabilityRequirement {
    fn srid(&self) -> &str {
        &self.srid
    }

    fn threshold(&self) -> f64 {
        self.threshold_m
    }

    fn window_offset(&self) -> usize {
        self.steady_state_start
    }

    fn validate(&self, telemetry: &[TelemetrySample]) -> CheckResult {
        let detail = format!("Peak Error < {}m", self.threshold_m);
        let peak = steady_state(telemetry, self.steady_state_start)
            .iter()
            .map(|sample| sample.error_m)
            .reduce(f64::max);
        match peak {
            Some(peak) => check(&self.srid, peak, self.threshold_m, detail),
            None => fail_closed(&self.srid, detail),
        }
    }
}

/// Time until the error first drops below [`CONVERGENCE_BOUND_M`] must stay
/// below the threshold (seconds).
///
/// Reads the full sequence, transient included: settling time is measured
/// from the start of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceRequirement {
    srid: String,
    threshold_s: f64,
    bound_m: f64,
    sample_period: f64,
}

impl ConvergenceRequirement {
    pub fn new(srid: impl Into<String>, threshold_s: f64) -> Self {
        Self {
            srid: srid.into(),
            threshold_s,
            bound_m: CONVERGENCE_BOUND_M,
            sample_period: SAMPLE_PERIOD_SECONDS,
        }
    }

    #[must_use]
    pub fn with_sample_period(mut self, sample_period: f64) -> Self {
        self.sample_period = sample_period;
        self
    }

    /// Convergence time in seconds, or [`NOT_CONVERGED_SECONDS`].
    #[must_use]
    pub fn convergence_time(&self, telemetry: &[TelemetrySample]) -> f64 {
        telemetry
            .iter()
            .position(|sample| sample.error_m < self.bound_m)
            .map_or(NOT_CONVERGED_SECONDS, |index| {
                elapsed_seconds(index, self.sample_period)
            })
    }
}

impl Requirement for ConvergenceRequirement {
    fn srid(&self) -> &str {
        &self.srid
    }

    fn threshold(&self) -> f64 {
        self.threshold_s
    }

    fn validate(&self, telemetry: &[TelemetrySample]) -> CheckResult {
        let detail = format!("Convergence Time < {}s", self.threshold_s);
        check(
            &self.srid,
            self.convergence_time(telemetry),
            self.threshold_s,
            detail,
        )
    }
}
