use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::util::{append_line, now_utc_iso, write_string};

pub const POLICY_ID: &str = "fusion_verify/v1";

/// Per-scenario run record written next to the captured telemetry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScenarioRunMeta {
    pub batch_id: String,
    pub scenario_id: String,
    pub scenario_name: String,
    pub env: Vec<String>,
    pub harness: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub elapsed_seconds: Option<f64>,
    pub states: Vec<String>,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub failure: Option<String>,
    pub telemetry: Option<String>,
    pub telemetry_sha256: Option<String>,
    pub sample_count: Option<usize>,
    pub verdict: String,
    pub incomplete_reason: Option<String>,
}

impl ScenarioRunMeta {
    pub fn write_to_path(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        write_string(path, &content)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str::<Self>(&content)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub timestamp: String,
    pub batch_id: String,
    pub decision_id: String,
    pub action: String,
    pub evidence_terms: Vec<String>,
    pub fallback_active: bool,
    pub fallback_reason: Option<String>,
    pub policy_id: String,
}

impl DecisionRecord {
    pub fn append_jsonl(&self, path: &Path) -> Result<()> {
        let line = serde_json::to_string(self)?;
        append_line(path, &line)
    }
}

/// Append-only JSONL log of orchestration decisions for one batch.
///
/// A disabled ledger accepts records and drops them. Write failures are
/// logged, never propagated: evidence must not decide a scenario's verdict.
#[derive(Debug)]
pub struct EvidenceLedger {
    path: Option<PathBuf>,
    batch_id: String,
    sequence: AtomicUsize,
}

impl EvidenceLedger {
    pub fn new(path: impl Into<PathBuf>, batch_id: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            batch_id: batch_id.into(),
            sequence: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            path: None,
            batch_id: String::new(),
            sequence: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&self, action: &str, evidence_terms: Vec<String>, fallback_reason: Option<String>) {
        let Some(path) = &self.path else {
            return;
        };
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let record = DecisionRecord {
            timestamp: now_utc_iso(),
            batch_id: self.batch_id.clone(),
            decision_id: format!("decision-{sequence}"),
            action: action.to_string(),
            evidence_terms,
            fallback_active: fallback_reason.is_some(),
            fallback_reason,
            policy_id: POLICY_ID.to_string(),
        };
        if let Err(error) = record.append_jsonl(path) {
            warn!(path = %path.display(), %error, "failed to append evidence ledger record");
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::{DecisionRecord, EvidenceLedger, ScenarioRunMeta};

    #[test]
    fn runmeta_round_trip_preserves_fields() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("TC-ACC-01_nominal.run_meta.json");

        let original = ScenarioRunMeta {
            batch_id: "20261015_120000".to_string(),
            scenario_id: "TC-ACC-01".to_string(),
            scenario_name: "nominal_speed_50ms".to_string(),
            env: vec!["UAV_SPEED=50.0".to_string()],
            states: vec!["IDLE".to_string(), "LAUNCHING".to_string()],
            timed_out: true,
            exit_code: Some(124),
            verdict: "INCOMPLETE".to_string(),
            incomplete_reason: Some("no telemetry artifact".to_string()),
            ..ScenarioRunMeta::default()
        };

        original.write_to_path(&path).expect("write run meta");
        let decoded = ScenarioRunMeta::from_path(&path).expect("read run meta");

        assert_eq!(decoded.scenario_id, original.scenario_id);
        assert_eq!(decoded.env, original.env);
        assert_eq!(decoded.states, original.states);
        assert!(decoded.timed_out);
        assert_eq!(decoded.exit_code, Some(124));
        assert_eq!(decoded.incomplete_reason, original.incomplete_reason);
    }

    #[test]
    fn runmeta_deserialize_sparse_json_uses_defaults() {
        let parsed = serde_json::from_str::<ScenarioRunMeta>(r#"{"scenario_id":"TC-1"}"#)
            .expect("parse sparse run meta");
        assert_eq!(parsed.scenario_id, "TC-1");
        assert!(parsed.states.is_empty());
        assert!(!parsed.timed_out);
        assert!(parsed.telemetry.is_none());
    }

    #[test]
    fn ledger_writes_one_numbered_record_per_line() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("evidence_ledger.jsonl");
        let ledger = EvidenceLedger::new(&path, "batch-1");

        ledger.record("config_resolved", vec!["scenarios=6".to_string()], None);
        ledger.record(
            "harness_timeout",
            vec!["scenario=TC-ACC-02".to_string()],
            Some("harness exceeded 50s".to_string()),
        );

        let content = std::fs::read_to_string(&path).expect("read ledger");
        let records = content
            .lines()
            .map(|line| serde_json::from_str::<DecisionRecord>(line).expect("parse record"))
            .collect::<Vec<_>>();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].decision_id, "decision-1");
        assert!(!records[0].fallback_active);
        assert_eq!(records[1].decision_id, "decision-2");
        assert!(records[1].fallback_active);
        assert_eq!(records[1].batch_id, "batch-1");
    }

    #[test]
    fn disabled_ledger_writes_nothing() {
        let ledger = EvidenceLedger::disabled();
        ledger.record("anything", Vec::new(), None);
        assert!(ledger.path().is_none());
    }
}
