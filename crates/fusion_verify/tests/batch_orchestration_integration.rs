use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fusion_verify::batch::{BatchExecutive, IncompleteReason};
use fusion_verify::config::ExecutiveConfig;
use fusion_verify::error::Result;
use fusion_verify::harness::{AwaitOutcome, ComposeHarness, Harness};
use fusion_verify::runmeta::{DecisionRecord, ScenarioRunMeta};
use fusion_verify::scenario::{ScenarioDefinition, Suite};
use fusion_verify::telemetry::{TelemetrySample, load_telemetry, render_telemetry_csv};
use fusion_verify::validator::{Validator, VerdictStatus};
use tempfile::{TempDir, tempdir};

/// In-process stand-in for the compose project.
///
/// Behavior is chosen per scenario through the `MODE` env override, the way the
/// real harness is parameterized: `write:<error>:<count>`, `hang:<error>:<count>`,
/// `none`, `empty`, `garbage`.
#[derive(Debug)]
struct ScriptedHarness {
    telemetry_source: PathBuf,
    calls: Vec<String>,
    launches: Vec<BTreeMap<String, String>>,
    residual_seen_at_launch: bool,
}

impl ScriptedHarness {
    fn new(telemetry_source: &Path) -> Self {
        Self {
            telemetry_source: telemetry_source.to_path_buf(),
            calls: Vec::new(),
            launches: Vec::new(),
            residual_seen_at_launch: false,
        }
    }

    fn write_series(&self, error_m: f64, count: usize) -> Result<()> {
        if let Some(parent) = self.telemetry_source.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let samples = vec![TelemetrySample::with_error(error_m); count];
        std::fs::write(&self.telemetry_source, render_telemetry_csv(&samples))?;
        Ok(())
    }
}

fn parse_series(script: &str) -> (f64, usize) {
    let mut parts = script.split(':');
    let error = parts.next().and_then(|v| v.parse().ok()).unwrap_or(1.0);
    let count = parts.next().and_then(|v| v.parse().ok()).unwrap_or(200);
    (error, count)
}

impl Harness for ScriptedHarness {
    type Handle = String;

    fn label(&self) -> String {
        "scripted".to_string()
    }

    fn reset(&mut self) -> Result<()> {
        self.calls.push("reset".to_string());
        Ok(())
    }

    fn launch(&mut self, env: &BTreeMap<String, String>) -> Result<String> {
        self.calls.push("launch".to_string());
        self.launches.push(env.clone());
        if self.telemetry_source.exists() {
            self.residual_seen_at_launch = true;
        }

        let mode = env.get("MODE").cloned().unwrap_or_else(|| "none".to_string());
        if let Some(series) = mode
            .strip_prefix("write:")
            .or_else(|| mode.strip_prefix("hang:"))
        {
            let (error, count) = parse_series(series);
            self.write_series(error, count)?;
        } else if mode == "empty" {
            self.write_series(0.0, 0)?;
        } else if mode == "garbage" {
            if let Some(parent) = self.telemetry_source.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&self.telemetry_source, "error_m\nnot-a-number\n")?;
        }
        Ok(mode)
    }

    fn await_completion(&mut self, handle: &mut String, _timeout: Duration) -> Result<AwaitOutcome> {
        self.calls.push("await".to_string());
        if handle.starts_with("hang:") {
            Ok(AwaitOutcome::TimedOut)
        } else {
            Ok(AwaitOutcome::Completed { exit_code: Some(0) })
        }
    }

    fn terminate(&mut self, _handle: &mut String) -> Result<()> {
        self.calls.push("terminate".to_string());
        Ok(())
    }

    fn teardown(&mut self) -> Result<()> {
        self.calls.push("teardown".to_string());
        Ok(())
    }
}

struct Fixture {
    _temp: TempDir,
    config: ExecutiveConfig,
}

fn fixture() -> Fixture {
    let temp = tempdir().expect("tempdir");
    let config = ExecutiveConfig {
        telemetry_source: temp.path().join("logs/logs/results.csv"),
        results_root: temp.path().join("simulation_results"),
        ..ExecutiveConfig::default()
    };
    Fixture {
        _temp: temp,
        config,
    }
}

fn executive(config: &ExecutiveConfig) -> BatchExecutive<ScriptedHarness> {
    let validator = Validator::reference(config).expect("reference registry");
    let harness = ScriptedHarness::new(&config.telemetry_source);
    BatchExecutive::new(config.clone(), validator, harness)
        .expect("executive")
        .with_batch_id("20261016_120000")
        .with_orchestrator(|orchestrator| orchestrator.with_ambient_env(BTreeMap::new()))
}

fn scenario(id: &str, name: &str, mode: &str) -> ScenarioDefinition {
    ScenarioDefinition::new(id, name).with_env("MODE", mode)
}

#[test]
fn missing_artifact_mid_suite_only_degrades_that_scenario() {
    let fx = fixture();
    let suite = Suite::new(vec![
        scenario("TC-1", "first", "write:5.0:200"),
        scenario("TC-2", "silent", "none"),
        scenario("TC-3", "third", "write:6.0:200"),
    ])
    .expect("suite");

    let mut executive = executive(&fx.config);
    let batch = executive.execute(&suite).expect("batch");

    assert_eq!(batch.results().len(), 3);
    let statuses = batch
        .results()
        .iter()
        .map(|result| result.status())
        .collect::<Vec<_>>();
    assert_eq!(
        statuses,
        vec![VerdictStatus::Pass, VerdictStatus::Incomplete, VerdictStatus::Pass]
    );

    let silent = batch.result("TC-2").expect("TC-2");
    assert!(silent.verdict.checks().is_empty());
    assert!(matches!(
        silent.incomplete_reason,
        Some(IncompleteReason::MissingTelemetry { .. })
    ));
    assert_eq!(batch.exit_code(), 1);

    let report =
        std::fs::read_to_string(batch.batch_dir().join("SVR_Summary_Report.txt")).expect("report");
    assert!(report.contains("TEST CASE: TC-1 [PASS]"));
    assert!(report.contains("TEST CASE: TC-2 [INCOMPLETE]"));
    assert!(report.contains("TEST CASE: TC-3 [PASS]"));
    assert!(report.contains("  SRID-FUS-001: Measured=5.00 | Average Error < 25m -> [PASS]"));
    assert_eq!(
        batch.batch_dir(),
        fx.config.results_root.join("batch_20261016_120000")
    );
}

#[test]
fn stale_telemetry_never_reaches_the_next_scenario() {
    let fx = fixture();
    let suite = Suite::new(vec![
        scenario("TC-A", "sentinel_a", "write:11.0:200"),
        scenario("TC-B", "silent", "none"),
        scenario("TC-C", "sentinel_c", "write:13.0:200"),
    ])
    .expect("suite");

    let mut executive = executive(&fx.config);
    let batch = executive.execute(&suite).expect("batch");

    assert!(!executive.harness().residual_seen_at_launch);
    assert_eq!(
        batch.result("TC-B").expect("TC-B").status(),
        VerdictStatus::Incomplete
    );

    let a = load_telemetry(&batch.batch_dir().join("TC-A_sentinel_a.csv")).expect("A telemetry");
    let c = load_telemetry(&batch.batch_dir().join("TC-C_sentinel_c.csv")).expect("C telemetry");
    assert!(a.iter().all(|sample| sample.error_m == 11.0));
    assert!(c.iter().all(|sample| sample.error_m == 13.0));
    assert!(!batch.batch_dir().join("TC-B_silent.csv").exists());
}

#[test]
fn scenarios_run_strictly_one_after_another() {
    let fx = fixture();
    let suite = Suite::new(vec![
        scenario("TC-1", "a", "write:5.0:200"),
        scenario("TC-2", "b", "hang:5.0:200"),
        scenario("TC-3", "c", "none"),
    ])
    .expect("suite");

    let mut executive = executive(&fx.config);
    executive.execute(&suite).expect("batch");

    let calls = &executive.harness().calls;
    let launches = calls
        .iter()
        .enumerate()
        .filter(|(_, call)| call.as_str() == "launch")
        .map(|(index, _)| index)
        .collect::<Vec<_>>();
    assert_eq!(launches.len(), 3);
    for pair in launches.windows(2) {
        assert!(
            calls[pair[0]..pair[1]].iter().any(|call| call == "teardown"),
            "no teardown between launches: {calls:?}"
        );
    }
    assert_eq!(calls.last().map(String::as_str), Some("teardown"));
}

#[test]
fn scenario_env_overrides_do_not_leak_between_runs() {
    let fx = fixture();
    let suite = Suite::new(vec![
        scenario("TC-1", "fast", "none").with_env("UAV_SPEED", "250.0"),
        scenario("TC-2", "default", "none"),
    ])
    .expect("suite");

    let mut executive = executive(&fx.config);
    executive.execute(&suite).expect("batch");

    let launches = &executive.harness().launches;
    assert_eq!(launches[0].get("UAV_SPEED").map(String::as_str), Some("250.0"));
    assert!(!launches[1].contains_key("UAV_SPEED"));
    for env in launches {
        assert_eq!(env.get("SIM_DURATION_SEC").map(String::as_str), Some("30"));
    }
}

#[test]
fn timed_out_run_is_terminated_and_partial_telemetry_is_judged() {
    let fx = fixture();
    let suite = Suite::new(vec![scenario("TC-T", "slow", "hang:4.0:160")]).expect("suite");

    let mut executive = executive(&fx.config);
    let batch = executive.execute(&suite).expect("batch");

    let result = batch.result("TC-T").expect("TC-T");
    assert_eq!(result.status(), VerdictStatus::Pass);
    assert_eq!(result.sample_count, Some(160));
    assert!(result.run.timed_out);
    assert!(result.run.states.contains(&"TIMED_OUT".to_string()));
    assert!(executive.harness().calls.contains(&"terminate".to_string()));

    let meta = ScenarioRunMeta::from_path(&batch.batch_dir().join("TC-T_slow.run_meta.json"))
        .expect("run meta");
    assert_eq!(
        meta.states,
        vec!["IDLE", "LAUNCHING", "RUNNING", "TIMED_OUT", "TORN_DOWN"]
    );
    assert_eq!(meta.telemetry.as_deref(), Some("TC-T_slow.csv"));
    assert_eq!(meta.telemetry_sha256.as_deref().map(str::len), Some(64));
}

#[test]
fn empty_short_and_unreadable_telemetry_are_incomplete() {
    let fx = fixture();
    let suite = Suite::new(vec![
        scenario("TC-E", "empty", "empty"),
        scenario("TC-S", "short", "write:1.0:149"),
        scenario("TC-G", "garbage", "garbage"),
    ])
    .expect("suite");

    let mut executive = executive(&fx.config);
    let batch = executive.execute(&suite).expect("batch");

    assert_eq!(batch.count(VerdictStatus::Incomplete), 3);
    assert_eq!(
        batch.result("TC-E").and_then(|r| r.incomplete_reason.clone()),
        Some(IncompleteReason::EmptyTelemetry)
    );
    assert_eq!(
        batch.result("TC-S").and_then(|r| r.incomplete_reason.clone()),
        Some(IncompleteReason::InsufficientSamples {
            samples: 149,
            min_samples: 150
        })
    );
    assert!(matches!(
        batch.result("TC-G").and_then(|r| r.incomplete_reason.clone()),
        Some(IncompleteReason::UnreadableTelemetry { .. })
    ));
    for result in batch.results() {
        assert!(result.verdict.checks().is_empty());
    }
}

#[test]
fn evidence_ledger_records_orchestration_decisions() {
    let fx = fixture();
    let suite = Suite::new(vec![
        scenario("TC-1", "ok", "write:5.0:200"),
        scenario("TC-2", "slow", "hang:5.0:10"),
    ])
    .expect("suite");

    let mut executive = executive(&fx.config);
    let batch = executive.execute(&suite).expect("batch");

    let content = std::fs::read_to_string(batch.batch_dir().join("evidence_ledger.jsonl"))
        .expect("ledger");
    let actions = content
        .lines()
        .map(|line| serde_json::from_str::<DecisionRecord>(line).expect("record"))
        .map(|record| record.action)
        .collect::<Vec<_>>();
    assert_eq!(actions.first().map(String::as_str), Some("config_resolved"));
    assert!(actions.contains(&"telemetry_captured".to_string()));
    assert!(actions.contains(&"harness_timeout".to_string()));
    assert_eq!(
        actions
            .iter()
            .filter(|action| action.as_str() == "verdict_recorded")
            .count(),
        2
    );
}

#[test]
fn disabled_ledger_leaves_no_file() {
    let mut fx = fixture();
    fx.config.evidence_ledger = false;
    let suite = Suite::new(vec![scenario("TC-1", "ok", "write:5.0:200")]).expect("suite");

    let mut executive = executive(&fx.config);
    let batch = executive.execute(&suite).expect("batch");

    assert!(batch.all_passed());
    assert_eq!(batch.exit_code(), 0);
    assert!(!batch.batch_dir().join("evidence_ledger.jsonl").exists());
}

#[test]
fn duplicate_srid_fails_before_any_scenario_runs() {
    let error = Validator::reference(&ExecutiveConfig::default())
        .expect("reference")
        .with(fusion_verify::requirement::AccuracyRequirement::new(
            "SRID-FUS-001",
            1.0,
        ))
        .expect_err("duplicate srid");
    assert_eq!(error.exit_code(), 2);
}

#[cfg(unix)]
#[test]
fn compose_reset_and_teardown_are_idempotent() {
    let temp = tempdir().expect("tempdir");
    for command in ["true", "false"] {
        let mut harness = ComposeHarness::new(command, "fusion_service", temp.path())
            .expect("harness");
        harness.reset().expect("first reset");
        harness.reset().expect("second reset");
        harness.teardown().expect("first teardown");
        harness.teardown().expect("second teardown");
    }
}
