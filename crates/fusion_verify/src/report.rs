use std::fmt::Write as _;
use std::path::PathBuf;

use serde::Serialize;

use crate::batch::Batch;
use crate::error::Result;
use crate::requirement::CheckResult;
use crate::util::{now_local_display, now_utc_iso, write_string};
use crate::validator::VerdictStatus;

pub const SVR_REPORT_FILE: &str = "SVR_Summary_Report.txt";
pub const JSON_REPORT_FILE: &str = "batch_report.json";

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub id: String,
    pub name: String,
    pub status: VerdictStatus,
    pub reason: Option<String>,
    pub sample_count: Option<usize>,
    pub checks: Vec<CheckResult>,
    pub run_meta: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub batch_id: String,
    pub batch_dir: String,
    pub generated_at: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: VerdictStatus,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub incomplete: usize,
    pub scenarios: Vec<ScenarioReport>,
}

impl ReportSummary {
    #[must_use]
    pub fn from_batch(batch: &Batch) -> Self {
        let scenarios = batch
            .results()
            .iter()
            .map(|result| ScenarioReport {
                id: result.scenario.id.clone(),
                name: result.scenario.name.clone(),
                status: result.status(),
                reason: result.incomplete_reason.as_ref().map(ToString::to_string),
                sample_count: result.sample_count,
                checks: result.verdict.ordered_checks().cloned().collect(),
                run_meta: format!("{}.run_meta.json", result.scenario.artifact_stem()),
            })
            .collect::<Vec<_>>();

        let passed = batch.count(VerdictStatus::Pass);
        let failed = batch.count(VerdictStatus::Fail);
        let incomplete = batch.count(VerdictStatus::Incomplete);
        // Batch status: any FAIL dominates, then any INCOMPLETE.
        let status = if failed > 0 {
            VerdictStatus::Fail
        } else if incomplete > 0 {
            VerdictStatus::Incomplete
        } else {
            VerdictStatus::Pass
        };

        Self {
            batch_id: batch.batch_id().to_string(),
            batch_dir: batch.batch_dir().display().to_string(),
            generated_at: now_utc_iso(),
            started_at: batch.started_at().to_string(),
            finished_at: batch.finished_at().map(ToOwned::to_owned),
            status,
            total: scenarios.len(),
            passed,
            failed,
            incomplete,
            scenarios,
        }
    }
}

/// Renders the plain-text Software Verification Results document.
#[must_use]
pub fn render_svr(summary: &ReportSummary, date: &str) -> String {
    let banner = "=".repeat(70);
    let mut out = String::new();
    let _ = writeln!(out, "{banner}");
    let _ = writeln!(
        out,
        "SOFTWARE VERIFICATION RESULTS (SVR) - BATCH {}",
        summary.batch_id
    );
    let _ = writeln!(out, "DATE: {date}");
    let _ = writeln!(out, "{banner}");
    out.push('\n');

    for scenario in &summary.scenarios {
        let _ = writeln!(out, "TEST CASE: {} [{}]", scenario.id, scenario.status);
        let _ = writeln!(out, "Scenario : {}", scenario.name);
        let _ = writeln!(out, "{}", "-".repeat(30));
        for check in &scenario.checks {
            let _ = writeln!(
                out,
                "  {}: Measured={:.2} | {} -> [{}]",
                check.srid,
                check.value,
                check.detail,
                check.status_label()
            );
        }
        if let Some(reason) = &scenario.reason {
            let _ = writeln!(out, "  Reason: {reason}");
        }
        out.push('\n');
    }

    let _ = writeln!(out, "{banner}");
    let _ = writeln!(
        out,
        "SUMMARY: {} PASS / {} FAIL / {} INCOMPLETE of {} test cases",
        summary.passed, summary.failed, summary.incomplete, summary.total
    );
    out
}

/// Writes the text and JSON reports into the batch directory.
pub fn write_reports(batch: &Batch) -> Result<(PathBuf, PathBuf)> {
    let summary = ReportSummary::from_batch(batch);
    let text_path = batch.batch_dir().join(SVR_REPORT_FILE);
    let json_path = batch.batch_dir().join(JSON_REPORT_FILE);
    write_string(&text_path, &render_svr(&summary, &now_local_display()))?;
    write_string(&json_path, &serde_json::to_string_pretty(&summary)?)?;
    Ok((text_path, json_path))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::batch::{Batch, IncompleteReason, ScenarioResult};
    use crate::requirement::CheckResult;
    use crate::runmeta::ScenarioRunMeta;
    use crate::scenario::ScenarioDefinition;
    use crate::validator::{ScenarioVerdict, VerdictStatus};

    use super::{JSON_REPORT_FILE, ReportSummary, SVR_REPORT_FILE, render_svr, write_reports};

    fn check(srid: &str, pass: bool, value: f64, detail: &str) -> CheckResult {
        CheckResult {
            srid: srid.to_string(),
            pass,
            value,
            detail: detail.to_string(),
        }
    }

    fn sample_batch(dir: std::path::PathBuf) -> Batch {
        let mut batch = Batch::start("20261016_101500".to_string(), dir);
        batch.append(ScenarioResult {
            scenario: ScenarioDefinition::new("TC-ACC-01", "nominal_speed_50ms"),
            verdict: ScenarioVerdict::from_checks(vec![
                check("SRID-FUS-001", true, 10.0, "Average Error < 25m"),
                check("SRID-FUS-002", true, 12.346, "Peak Error < 100m"),
                check("SRID-FUS-003", false, 10.0, "Convergence Time < 10s"),
            ]),
            incomplete_reason: None,
            sample_count: Some(200),
            run: ScenarioRunMeta::default(),
        });
        batch.append(ScenarioResult {
            scenario: ScenarioDefinition::new("TC-ACC-02", "high_speed_250ms"),
            verdict: ScenarioVerdict::incomplete(),
            incomplete_reason: Some(IncompleteReason::MissingTelemetry {
                harness_failure: None,
            }),
            sample_count: None,
            run: ScenarioRunMeta::default(),
        });
        batch.finish();
        batch
    }

    #[test]
    fn svr_text_lists_every_scenario_and_check() {
        let temp = tempdir().expect("tempdir");
        let summary = ReportSummary::from_batch(&sample_batch(temp.path().to_path_buf()));
        let text = render_svr(&summary, "2026-10-16 10:15:00");

        let expected_head = format!(
            "{banner}\nSOFTWARE VERIFICATION RESULTS (SVR) - BATCH 20261016_101500\n\
             DATE: 2026-10-16 10:15:00\n{banner}\n\n",
            banner = "=".repeat(70)
        );
        assert!(text.starts_with(&expected_head), "{text}");
        assert!(text.contains("TEST CASE: TC-ACC-01 [FAIL]\nScenario : nominal_speed_50ms\n"));
        assert!(text.contains("  SRID-FUS-002: Measured=12.35 | Peak Error < 100m -> [PASS]\n"));
        assert!(text.contains("  SRID-FUS-003: Measured=10.00 | Convergence Time < 10s -> [FAIL]\n"));
        assert!(text.contains(
            "TEST CASE: TC-ACC-02 [INCOMPLETE]\nScenario : high_speed_250ms\n------------------------------\n  Reason: no telemetry artifact produced\n"
        ));
        assert!(text.contains("SUMMARY: 0 PASS / 1 FAIL / 1 INCOMPLETE of 2 test cases"));
    }

    #[test]
    fn summary_status_prefers_fail_over_incomplete() {
        let temp = tempdir().expect("tempdir");
        let summary = ReportSummary::from_batch(&sample_batch(temp.path().to_path_buf()));
        assert_eq!(summary.status, VerdictStatus::Fail);
        assert_eq!(summary.total, 2);
        assert_eq!(
            summary.scenarios[0].run_meta,
            "TC-ACC-01_nominal_speed_50ms.run_meta.json"
        );
        let srids = summary.scenarios[0]
            .checks
            .iter()
            .map(|check| check.srid.as_str())
            .collect::<Vec<_>>();
        assert_eq!(srids, vec!["SRID-FUS-001", "SRID-FUS-002", "SRID-FUS-003"]);
    }

    #[test]
    fn write_reports_emits_text_and_json() {
        let temp = tempdir().expect("tempdir");
        let batch = sample_batch(temp.path().join("batch_20261016_101500"));
        let (text_path, json_path) = write_reports(&batch).expect("write reports");

        assert_eq!(text_path.file_name().and_then(|n| n.to_str()), Some(SVR_REPORT_FILE));
        assert_eq!(json_path.file_name().and_then(|n| n.to_str()), Some(JSON_REPORT_FILE));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).expect("read json"))
                .expect("parse json");
        assert_eq!(json["batch_id"], "20261016_101500");
        assert_eq!(json["incomplete"], 1);
        assert_eq!(json["scenarios"][1]["status"], "INCOMPLETE");
        assert_eq!(json["scenarios"][1]["checks"].as_array().map(Vec::len), Some(0));
        assert!(std::fs::read_to_string(&text_path)
            .expect("read text")
            .contains("TEST CASE: TC-ACC-01 [FAIL]"));
    }
}
