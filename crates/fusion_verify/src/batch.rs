//! Batch executive: runs a suite scenario by scenario and judges each run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::ExecutiveConfig;
use crate::error::Result;
use crate::harness::Harness;
use crate::orchestrator::{RunOrchestrator, RunOutcome};
use crate::report::write_reports;
use crate::runmeta::{EvidenceLedger, ScenarioRunMeta};
use crate::scenario::{ScenarioDefinition, Suite};
use crate::telemetry::load_telemetry;
use crate::util::{CliOutput, ensure_dir, now_compact_timestamp, now_utc_iso, relative_to};
use crate::validator::{ScenarioVerdict, Validator, VerdictStatus};

/// Why a scenario could not be judged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IncompleteReason {
    MissingTelemetry { harness_failure: Option<String> },
    EmptyTelemetry,
    UnreadableTelemetry { message: String },
    InsufficientSamples { samples: usize, min_samples: usize },
}

impl fmt::Display for IncompleteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTelemetry {
                harness_failure: Some(failure),
            } => write!(f, "no telemetry artifact produced ({failure})"),
            Self::MissingTelemetry {
                harness_failure: None,
            } => f.write_str("no telemetry artifact produced"),
            Self::EmptyTelemetry => f.write_str("telemetry artifact contains no samples"),
            Self::UnreadableTelemetry { message } => write!(f, "telemetry unreadable: {message}"),
            Self::InsufficientSamples {
                samples,
                min_samples,
            } => write!(f, "insufficient samples: {samples} < {min_samples}"),
        }
    }
}

/// One scenario's entry in a batch.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub scenario: ScenarioDefinition,
    pub verdict: ScenarioVerdict,
    pub incomplete_reason: Option<IncompleteReason>,
    pub sample_count: Option<usize>,
    pub run: ScenarioRunMeta,
}

impl ScenarioResult {
    #[must_use]
    pub fn status(&self) -> VerdictStatus {
        self.verdict.status()
    }
}

/// Results of one suite execution. Append-only while running, read-only after.
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    batch_id: String,
    batch_dir: PathBuf,
    started_at: String,
    finished_at: Option<String>,
    results: Vec<ScenarioResult>,
}

impl Batch {
    pub(crate) fn start(batch_id: String, batch_dir: PathBuf) -> Self {
        Self {
            batch_id,
            batch_dir,
            started_at: now_utc_iso(),
            finished_at: None,
            results: Vec::new(),
        }
    }

    pub(crate) fn append(&mut self, result: ScenarioResult) {
        self.results.push(result);
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(now_utc_iso());
    }

    #[must_use]
    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    #[must_use]
    pub fn batch_dir(&self) -> &Path {
        &self.batch_dir
    }

    #[must_use]
    pub fn started_at(&self) -> &str {
        &self.started_at
    }

    #[must_use]
    pub fn finished_at(&self) -> Option<&str> {
        self.finished_at.as_deref()
    }

    #[must_use]
    pub fn results(&self) -> &[ScenarioResult] {
        &self.results
    }

    #[must_use]
    pub fn result(&self, id: &str) -> Option<&ScenarioResult> {
        self.results.iter().find(|result| result.scenario.id == id)
    }

    #[must_use]
    pub fn count(&self, status: VerdictStatus) -> usize {
        self.results
            .iter()
            .filter(|result| result.status() == status)
            .count()
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results
            .iter()
            .all(|result| result.status() == VerdictStatus::Pass)
    }

    /// Process exit status for the batch: 0 only when every scenario passed.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() { 0 } else { 1 }
    }
}

/// Owns the configuration, validator, and orchestrator for one batch.
pub struct BatchExecutive<H: Harness> {
    config: ExecutiveConfig,
    validator: Validator,
    orchestrator: RunOrchestrator<H>,
    output: CliOutput,
    batch_id: Option<String>,
}

impl<H: Harness> BatchExecutive<H> {
    /// Fails before any scenario runs if `config` is invalid.
    pub fn new(config: ExecutiveConfig, validator: Validator, harness: H) -> Result<Self> {
        config.validate()?;
        let orchestrator = RunOrchestrator::new(harness, &config);
        Ok(Self {
            config,
            validator,
            orchestrator,
            output: CliOutput::silent(),
            batch_id: None,
        })
    }

    #[must_use]
    pub fn with_output(mut self, output: CliOutput) -> Self {
        self.output = output;
        self
    }

    /// Fixed batch id instead of the current local timestamp.
    #[must_use]
    pub fn with_batch_id(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    #[must_use]
    pub fn with_orchestrator(
        mut self,
        map: impl FnOnce(RunOrchestrator<H>) -> RunOrchestrator<H>,
    ) -> Self {
        self.orchestrator = map(self.orchestrator);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ExecutiveConfig {
        &self.config
    }

    #[must_use]
    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    #[must_use]
    pub fn harness(&self) -> &H {
        self.orchestrator.harness()
    }

    /// Runs every scenario of `suite` in order, then writes the reports.
    ///
    /// Scenario-level failures degrade that scenario to INCOMPLETE; only
    /// filesystem errors on the batch directory itself abort.
    pub fn execute(&mut self, suite: &Suite) -> Result<Batch> {
        let batch_id = self.batch_id.clone().unwrap_or_else(now_compact_timestamp);
        let batch_dir = self.config.results_root.join(format!("batch_{batch_id}"));
        ensure_dir(&batch_dir)?;

        let ledger = Arc::new(if self.config.evidence_ledger {
            EvidenceLedger::new(batch_dir.join("evidence_ledger.jsonl"), batch_id.clone())
        } else {
            EvidenceLedger::disabled()
        });
        self.orchestrator.set_ledger(Arc::clone(&ledger));
        ledger.record(
            "config_resolved",
            vec![
                format!("scenarios={}", suite.len()),
                format!("requirements={}", self.validator.len()),
                format!("min_samples={}", self.validator.min_samples()),
                format!("timeout_s={}", self.orchestrator.timeout().as_secs()),
                format!("telemetry_source={}", self.config.telemetry_source.display()),
            ],
            None,
        );

        info!(batch_id = %batch_id, scenarios = suite.len(), "batch started");
        self.output.rule(Some(format!("batch {batch_id}").as_str()));

        let mut batch = Batch::start(batch_id, batch_dir);
        for scenario in suite {
            self.output
                .info(&format!("running {} ({})", scenario.id, scenario.name));
            let started_at = now_utc_iso();
            let outcome = self.orchestrator.run(scenario, batch.batch_dir())?;
            let result = self.judge(&batch, scenario, &outcome, started_at);

            let meta_path = batch
                .batch_dir()
                .join(format!("{}.run_meta.json", scenario.artifact_stem()));
            if let Err(error) = result.run.write_to_path(&meta_path) {
                warn!(path = %meta_path.display(), %error, "failed to write run metadata");
            }
            ledger.record(
                "verdict_recorded",
                vec![
                    format!("scenario={}", scenario.id),
                    format!("status={}", result.status()),
                ],
                result.incomplete_reason.as_ref().map(ToString::to_string),
            );
            self.announce(&result);

            // Second, defensive teardown between scenarios.
            if let Err(error) = self.orchestrator.teardown() {
                warn!(%error, "inter-scenario teardown failed");
            }
            batch.append(result);
        }
        batch.finish();

        let (text_path, _) = write_reports(&batch)?;
        info!(
            pass = batch.count(VerdictStatus::Pass),
            fail = batch.count(VerdictStatus::Fail),
            incomplete = batch.count(VerdictStatus::Incomplete),
            "batch finished"
        );
        self.output
            .info(&format!("SVR report written to {}", text_path.display()));
        Ok(batch)
    }

    fn judge(
        &self,
        batch: &Batch,
        scenario: &ScenarioDefinition,
        outcome: &RunOutcome,
        started_at: String,
    ) -> ScenarioResult {
        let (verdict, incomplete_reason, sample_count) = match &outcome.artifact {
            None => (
                ScenarioVerdict::incomplete(),
                Some(IncompleteReason::MissingTelemetry {
                    harness_failure: outcome.failure.clone(),
                }),
                None,
            ),
            Some(path) => match load_telemetry(path) {
                Err(error) => (
                    ScenarioVerdict::incomplete(),
                    Some(IncompleteReason::UnreadableTelemetry {
                        message: error.to_string(),
                    }),
                    None,
                ),
                Ok(samples) if samples.is_empty() => (
                    ScenarioVerdict::incomplete(),
                    Some(IncompleteReason::EmptyTelemetry),
                    Some(0),
                ),
                Ok(samples) => {
                    let verdict = self.validator.verify(&samples);
                    let reason = (verdict.status() == VerdictStatus::Incomplete).then(|| {
                        IncompleteReason::InsufficientSamples {
                            samples: samples.len(),
                            min_samples: self.validator.min_samples(),
                        }
                    });
                    (verdict, reason, Some(samples.len()))
                }
            },
        };

        let run = ScenarioRunMeta {
            batch_id: batch.batch_id().to_string(),
            scenario_id: scenario.id.clone(),
            scenario_name: scenario.name.clone(),
            env: scenario
                .env
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect(),
            harness: self.orchestrator.harness().label(),
            started_at,
            finished_at: Some(now_utc_iso()),
            elapsed_seconds: Some(outcome.elapsed.as_secs_f64()),
            states: outcome.state_labels(),
            exit_code: outcome.exit_code,
            timed_out: outcome.timed_out,
            failure: outcome.failure.clone(),
            telemetry: outcome.artifact.as_ref().map(|path| {
                relative_to(batch.batch_dir(), path)
                    .unwrap_or_else(|| path.clone())
                    .display()
                    .to_string()
            }),
            telemetry_sha256: outcome.artifact_sha256.clone(),
            sample_count,
            verdict: verdict.status().to_string(),
            incomplete_reason: incomplete_reason.as_ref().map(ToString::to_string),
        };

        ScenarioResult {
            scenario: scenario.clone(),
            verdict,
            incomplete_reason,
            sample_count,
            run,
        }
    }

    fn announce(&self, result: &ScenarioResult) {
        let line = format!("{} [{}]", result.scenario.id, result.status());
        match result.status() {
            VerdictStatus::Pass => self.output.success(&line),
            VerdictStatus::Fail => self.output.error(&line),
            VerdictStatus::Incomplete => match &result.incomplete_reason {
                Some(reason) => self.output.warning(&format!("{line}: {reason}")),
                None => self.output.warning(&line),
            },
        }
    }
}
