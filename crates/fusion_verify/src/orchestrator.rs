//! Single-scenario run orchestration.
//!
//! A run always follows the same bounded sequence:
//!
//! 1. merge the scenario's environment overrides onto the ambient environment;
//! 2. reset the harness and delete any residual telemetry artifact;
//! 3. launch the harness;
//! 4. wait up to `sim_time + safety_margin`, terminating on timeout;
//! 5. copy the telemetry artifact, if one exists, into the batch directory;
//! 6. tear the harness down, whatever happened before.
//!
//! Harness failures never escape as errors. They are recorded on the
//! [`RunOutcome`], and the caller decides what they mean for the verdict.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::config::ExecutiveConfig;
use crate::error::{Result, VerifyError};
use crate::harness::{AwaitOutcome, Harness};
use crate::runmeta::EvidenceLedger;
use crate::scenario::ScenarioDefinition;
use crate::util::{remove_file_if_exists, sha256_file};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Idle,
    Launching,
    Running,
    Completed,
    TimedOut,
    Failed,
    TornDown,
}

impl RunState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Launching => "LAUNCHING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::TimedOut => "TIMED_OUT",
            Self::Failed => "FAILED",
            Self::TornDown => "TORN_DOWN",
        }
    }

    /// Teardown is reachable from every state except `Idle` and itself.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use RunState::{Completed, Failed, Idle, Launching, Running, TimedOut, TornDown};
        match (self, next) {
            (Idle, Launching | Failed) => true,
            (Launching, Running | Failed) => true,
            (Running, Completed | TimedOut | Failed) => true,
            (Launching | Running | Completed | TimedOut | Failed, TornDown) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State history of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLifecycle {
    history: Vec<RunState>,
}

impl Default for RunLifecycle {
    fn default() -> Self {
        Self {
            history: vec![RunState::Idle],
        }
    }
}

impl RunLifecycle {
    #[must_use]
    pub fn state(&self) -> RunState {
        self.history.last().copied().unwrap_or(RunState::Idle)
    }

    pub fn advance(&mut self, next: RunState) -> Result<()> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(VerifyError::InvalidTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        debug!(from = %current, to = %next, "run state transition");
        self.history.push(next);
        Ok(())
    }

    #[must_use]
    pub fn history(&self) -> &[RunState] {
        &self.history
    }
}

/// Everything observed during one scenario run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub scenario_id: String,
    pub history: Vec<RunState>,
    /// State the run reached before teardown.
    pub terminal_state: RunState,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub failure: Option<String>,
    /// Scenario-specific copy of the telemetry artifact; `None` means no result.
    pub artifact: Option<PathBuf>,
    pub artifact_sha256: Option<String>,
    pub residual_cleared: bool,
    pub elapsed: Duration,
}

impl RunOutcome {
    #[must_use]
    pub fn has_result(&self) -> bool {
        self.artifact.is_some()
    }

    #[must_use]
    pub fn state_labels(&self) -> Vec<String> {
        self.history.iter().map(ToString::to_string).collect()
    }
}

/// Scenario environment on top of the ambient one, plus the simulation duration.
#[must_use]
pub fn merged_env(
    ambient: &BTreeMap<String, String>,
    scenario: &ScenarioDefinition,
    sim_duration_var: &str,
    sim_duration_value: &str,
) -> BTreeMap<String, String> {
    let mut env = ambient.clone();
    env.extend(
        scenario
            .env
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    env.insert(sim_duration_var.to_string(), sim_duration_value.to_string());
    env
}

/// Current process environment, skipping entries that are not valid UTF-8.
#[must_use]
pub fn ambient_env() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

/// Owns the harness and runs one scenario at a time against it.
pub struct RunOrchestrator<H: Harness> {
    harness: H,
    telemetry_source: PathBuf,
    timeout: Duration,
    sim_duration_var: String,
    sim_duration_value: String,
    ambient: BTreeMap<String, String>,
    ledger: Arc<EvidenceLedger>,
}

impl<H: Harness> RunOrchestrator<H> {
    pub fn new(harness: H, config: &ExecutiveConfig) -> Self {
        Self {
            harness,
            telemetry_source: config.telemetry_source.clone(),
            timeout: config.harness_timeout(),
            sim_duration_var: config.sim_duration_var.clone(),
            sim_duration_value: config.sim_duration_value(),
            ambient: ambient_env(),
            ledger: Arc::new(EvidenceLedger::disabled()),
        }
    }

    #[must_use]
    pub fn with_ambient_env(mut self, ambient: BTreeMap<String, String>) -> Self {
        self.ambient = ambient;
        self
    }

    pub fn set_ledger(&mut self, ledger: Arc<EvidenceLedger>) {
        self.ledger = ledger;
    }

    #[must_use]
    pub fn harness(&self) -> &H {
        &self.harness
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Idempotent harness teardown outside of a run.
    pub fn teardown(&mut self) -> Result<()> {
        self.harness.teardown()
    }

    /// Runs `scenario` and copies its telemetry into `dest_dir`.
    ///
    /// Only a broken lifecycle invariant is returned as an error.
    pub fn run(&mut self, scenario: &ScenarioDefinition, dest_dir: &Path) -> Result<RunOutcome> {
        let span = info_span!("scenario_run", id = %scenario.id, name = %scenario.name);
        let _guard = span.enter();
        let started = Instant::now();
        let mut lifecycle = RunLifecycle::default();
        let mut outcome = RunOutcome {
            scenario_id: scenario.id.clone(),
            history: Vec::new(),
            terminal_state: RunState::Idle,
            exit_code: None,
            timed_out: false,
            failure: None,
            artifact: None,
            artifact_sha256: None,
            residual_cleared: false,
            elapsed: Duration::ZERO,
        };

        let env = merged_env(
            &self.ambient,
            scenario,
            &self.sim_duration_var,
            &self.sim_duration_value,
        );

        if let Err(error) = self.harness.reset() {
            warn!(%error, "pre-run harness reset failed; continuing");
        }

        let clean = match remove_file_if_exists(&self.telemetry_source) {
            Ok(removed) => {
                outcome.residual_cleared = removed;
                if removed {
                    info!(path = %self.telemetry_source.display(), "cleared residual telemetry");
                    self.ledger.record(
                        "residual_telemetry_cleared",
                        vec![
                            format!("scenario={}", scenario.id),
                            format!("path={}", self.telemetry_source.display()),
                        ],
                        None,
                    );
                }
                true
            }
            Err(error) => {
                let reason = format!(
                    "could not clear residual telemetry at {}: {error}",
                    self.telemetry_source.display()
                );
                warn!(%reason, "skipping launch");
                outcome.failure = Some(reason);
                false
            }
        };

        if clean {
            self.launch_and_await(scenario, dest_dir, &env, &mut lifecycle, &mut outcome)?;
            self.retrieve(scenario, dest_dir, &mut outcome);
        } else {
            lifecycle.advance(RunState::Failed)?;
        }
        outcome.terminal_state = lifecycle.state();

        if let Err(error) = self.harness.teardown() {
            warn!(%error, "post-run harness teardown failed");
        }
        lifecycle.advance(RunState::TornDown)?;

        outcome.history = lifecycle.history().to_vec();
        outcome.elapsed = started.elapsed();
        info!(
            terminal = %outcome.terminal_state,
            timed_out = outcome.timed_out,
            has_result = outcome.has_result(),
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "scenario run finished"
        );
        Ok(outcome)
    }

    fn launch_and_await(
        &mut self,
        scenario: &ScenarioDefinition,
        dest_dir: &Path,
        env: &BTreeMap<String, String>,
        lifecycle: &mut RunLifecycle,
        outcome: &mut RunOutcome,
    ) -> Result<()> {
        self.harness
            .capture_output_to(&dest_dir.join(format!("{}.harness.log", scenario.artifact_stem())));

        lifecycle.advance(RunState::Launching)?;
        let mut handle = match self.harness.launch(env) {
            Ok(handle) => handle,
            Err(error) => {
                warn!(%error, "harness launch failed");
                self.ledger.record(
                    "harness_launch_failed",
                    vec![format!("scenario={}", scenario.id)],
                    Some(error.to_string()),
                );
                outcome.failure = Some(error.to_string());
                return lifecycle.advance(RunState::Failed);
            }
        };
        lifecycle.advance(RunState::Running)?;

        match self.harness.await_completion(&mut handle, self.timeout) {
            Ok(AwaitOutcome::Completed { exit_code }) => {
                outcome.exit_code = exit_code;
                if exit_code != Some(0) {
                    debug!(exit = ?exit_code, "harness exited non-zero");
                }
                lifecycle.advance(RunState::Completed)
            }
            Ok(AwaitOutcome::TimedOut) => {
                let reason = format!("harness exceeded {}s", self.timeout.as_secs());
                warn!(%reason, "terminating harness");
                if let Err(error) = self.harness.terminate(&mut handle) {
                    warn!(%error, "harness termination failed");
                }
                self.ledger.record(
                    "harness_timeout",
                    vec![
                        format!("scenario={}", scenario.id),
                        format!("timeout_s={}", self.timeout.as_secs()),
                    ],
                    Some(reason.clone()),
                );
                outcome.timed_out = true;
                outcome.failure = Some(reason);
                lifecycle.advance(RunState::TimedOut)
            }
            Err(error) => {
                warn!(%error, "awaiting harness failed");
                if let Err(error) = self.harness.terminate(&mut handle) {
                    warn!(%error, "harness termination failed");
                }
                self.ledger.record(
                    "harness_await_failed",
                    vec![format!("scenario={}", scenario.id)],
                    Some(error.to_string()),
                );
                outcome.failure = Some(error.to_string());
                lifecycle.advance(RunState::Failed)
            }
        }
    }

    fn retrieve(&self, scenario: &ScenarioDefinition, dest_dir: &Path, outcome: &mut RunOutcome) {
        if !self.telemetry_source.exists() {
            warn!(path = %self.telemetry_source.display(), "no telemetry artifact produced");
            self.ledger.record(
                "telemetry_missing",
                vec![format!("scenario={}", scenario.id)],
                Some("no telemetry artifact at the expected path".to_string()),
            );
            return;
        }

        let dest = dest_dir.join(format!("{}.csv", scenario.artifact_stem()));
        let copied = std::fs::create_dir_all(dest_dir)
            .and_then(|()| std::fs::copy(&self.telemetry_source, &dest));
        if let Err(error) = copied {
            let reason = format!("failed to capture telemetry: {error}");
            warn!(%reason, "telemetry capture failed");
            if outcome.failure.is_none() {
                outcome.failure = Some(reason);
            }
            return;
        }

        match sha256_file(&dest) {
            Ok(digest) => outcome.artifact_sha256 = Some(digest),
            Err(error) => warn!(%error, "failed to fingerprint captured telemetry"),
        }
        info!(dest = %dest.display(), "telemetry captured");
        self.ledger.record(
            "telemetry_captured",
            vec![
                format!("scenario={}", scenario.id),
                format!("dest={}", dest.display()),
                format!(
                    "sha256={}",
                    outcome.artifact_sha256.as_deref().unwrap_or("unknown")
                ),
            ],
            None,
        );
        outcome.artifact = Some(dest);
    }
}
