//! Requirement registry and scenario verdict aggregation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ExecutiveConfig;
use crate::error::{Result, VerifyError};
use crate::requirement::{
    AccuracyRequirement, CheckResult, ConvergenceRequirement, Requirement, StabilityRequirement,
};
use crate::telemetry::TelemetrySample;

/// Minimum telemetry length before any requirement is evaluated.
pub const MIN_SAMPLES: usize = 150;

pub const SRID_ACCURACY: &str = "SRID-FUS-001";
pub const SRID_STABILITY: &str = "SRID-FUS-002";
pub const SRID_CONVERGENCE: &str = "SRID-FUS-003";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictStatus {
    Pass,
    Fail,
    /// Not enough data to judge. Distinct from `Fail`.
    Incomplete,
}

impl VerdictStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Incomplete => "INCOMPLETE",
        }
    }
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate verdict for one scenario.
///
/// `checks` is keyed by SRID; `order` keeps registration order for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioVerdict {
    status: VerdictStatus,
    checks: BTreeMap<String, CheckResult>,
    order: Vec<String>,
}

impl ScenarioVerdict {
    /// INCOMPLETE verdict. Never carries checks.
    #[must_use]
    pub fn incomplete() -> Self {
        Self {
            status: VerdictStatus::Incomplete,
            checks: BTreeMap::new(),
            order: Vec::new(),
        }
    }

    /// Aggregates evaluated checks: PASS iff every check passed.
    #[must_use]
    pub fn from_checks(results: Vec<CheckResult>) -> Self {
        let status = if results.iter().all(|result| result.pass) {
            VerdictStatus::Pass
        } else {
            VerdictStatus::Fail
        };
        let order = results
            .iter()
            .map(|result| result.srid.clone())
            .collect::<Vec<_>>();
        let checks = results
            .into_iter()
            .map(|result| (result.srid.clone(), result))
            .collect();
        Self {
            status,
            checks,
            order,
        }
    }

    #[must_use]
    pub fn status(&self) -> VerdictStatus {
        self.status
    }

    #[must_use]
    pub fn checks(&self) -> &BTreeMap<String, CheckResult> {
        &self.checks
    }

    #[must_use]
    pub fn check(&self, srid: &str) -> Option<&CheckResult> {
        self.checks.get(srid)
    }

    /// Checks in requirement registration order.
    pub fn ordered_checks(&self) -> impl Iterator<Item = &CheckResult> {
        self.order.iter().filter_map(|srid| self.checks.get(srid))
    }
}

/// Ordered set of requirements evaluated against each scenario.
#[derive(Debug)]
pub struct Validator {
    min_samples: usize,
    requirements: Vec<Box<dyn Requirement>>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(MIN_SAMPLES)
    }
}

impl Validator {
    #[must_use]
    pub fn new(min_samples: usize) -> Self {
        Self {
            min_samples,
            requirements: Vec::new(),
        }
    }

    /// The reference registry: accuracy, stability, and convergence, with
    /// thresholds and windows taken from `config`.
    pub fn reference(config: &ExecutiveConfig) -> Result<Self> {
        let thresholds = &config.thresholds;
        Self::new(config.min_samples)
            .with(AccuracyRequirement::new(
                SRID_ACCURACY,
                thresholds.accuracy_m,
            ))?
            .with(StabilityRequirement::new(
                SRID_STABILITY,
                thresholds.stability_m,
            ))?
            .with(
                ConvergenceRequirement::new(SRID_CONVERGENCE, thresholds.convergence_s)
                    .with_sample_period(config.sample_period_seconds),
            )
    }

    /// Appends a requirement.
    ///
    /// Fails on a duplicate SRID or when the requirement reads past the
    /// minimum window; both are configuration errors.
    pub fn register(&mut self, requirement: Box<dyn Requirement>) -> Result<()> {
        let srid = requirement.srid();
        if self.requirements.iter().any(|existing| existing.srid() == srid) {
            return Err(VerifyError::DuplicateRequirementId {
                srid: srid.to_string(),
            });
        }
        let offset = requirement.window_offset();
        if offset > self.min_samples {
            return Err(VerifyError::WindowExceedsMinimum {
                srid: srid.to_string(),
                offset,
                min_samples: self.min_samples,
            });
        }

        debug!(srid, threshold = requirement.threshold(), offset, "requirement registered");
        self.requirements.push(requirement);
        Ok(())
    }

    pub fn with(mut self, requirement: impl Requirement + 'static) -> Result<Self> {
        self.register(Box::new(requirement))?;
        Ok(self)
    }

    #[must_use]
    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    pub fn requirements(&self) -> impl Iterator<Item = &dyn Requirement> {
        self.requirements.iter().map(|requirement| &**requirement)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Judges one scenario's telemetry.
    ///
    /// Telemetry shorter than the minimum window is INCOMPLETE and no
    /// requirement runs.
    #[must_use]
    pub fn verify(&self, telemetry: &[TelemetrySample]) -> ScenarioVerdict {
        if telemetry.len() < self.min_samples {
            debug!(
                samples = telemetry.len(),
                min_samples = self.min_samples,
                "insufficient samples; verdict incomplete"
            );
            return ScenarioVerdict::incomplete();
        }

        let results = self
            .requirements
            .iter()
            .map(|requirement| requirement.validate(telemetry))
            .collect::<Vec<_>>();
        ScenarioVerdict::from_checks(results)
    }
}
