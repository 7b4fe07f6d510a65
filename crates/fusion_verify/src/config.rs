use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Result, VerifyError};
use crate::util::parse_duration_value;
use crate::validator::MIN_SAMPLES;

const REFERENCE_CONFIG: &str = include_str!("../profiles/reference.env");

/// Raw `key=value` settings read from a config fragment.
#[derive(Debug, Clone, Default)]
pub struct ConfigValues {
    pub source: String,
    pub values: BTreeMap<String, String>,
}

impl ConfigValues {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).map(|raw| {
            let value = raw.trim().to_ascii_lowercase();
            matches!(value.as_str(), "1" | "true" | "yes" | "on")
        })
    }

    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|_| {
                    VerifyError::invalid(format!("{}: invalid value for {key}: {raw}", self.source))
                })
            })
            .transpose()
    }

    pub fn get_duration(&self, key: &str) -> Result<Option<Duration>> {
        self.get(key).map(parse_duration_value).transpose()
    }
}

#[must_use]
pub fn parse_config_content(content: &str) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };

        let key = key.trim().to_string();
        let mut value = value_raw.trim().to_string();

        if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
            value = value[1..value.len() - 1].to_string();
        }

        values.insert(key, value);
    }

    values
}

#[must_use]
pub fn reference_values() -> ConfigValues {
    ConfigValues {
        source: "reference".to_string(),
        values: parse_config_content(REFERENCE_CONFIG),
    }
}

pub fn load_config_file(path: &Path) -> Result<ConfigValues> {
    if !path.exists() {
        return Err(VerifyError::MissingPath {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    Ok(ConfigValues {
        source: path.display().to_string(),
        values: parse_config_content(&content),
    })
}

/// Pass thresholds of the reference requirement registry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub accuracy_m: f64,
    pub stability_m: f64,
    pub convergence_s: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            accuracy_m: 25.0,
            stability_m: 100.0,
            convergence_s: 10.0,
        }
    }
}

/// Immutable settings for one batch, resolved before any scenario runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutiveConfig {
    pub sim_time: Duration,
    pub safety_margin: Duration,
    pub sample_period_seconds: f64,
    pub min_samples: usize,
    /// Where the harness writes telemetry during a run.
    pub telemetry_source: PathBuf,
    pub results_root: PathBuf,
    pub compose_command: String,
    pub compose_service: String,
    pub project_dir: PathBuf,
    /// Environment variable that carries the simulation duration to the harness.
    pub sim_duration_var: String,
    pub evidence_ledger: bool,
    pub thresholds: Thresholds,
}

impl Default for ExecutiveConfig {
    fn default() -> Self {
        Self {
            sim_time: Duration::from_secs(30),
            safety_margin: Duration::from_secs(20),
            sample_period_seconds: 0.1,
            min_samples: MIN_SAMPLES,
            telemetry_source: PathBuf::from("./logs/logs/results.csv"),
            results_root: PathBuf::from("./simulation_results"),
            compose_command: "docker-compose".to_string(),
            compose_service: "fusion_service".to_string(),
            project_dir: PathBuf::from("."),
            sim_duration_var: "SIM_DURATION_SEC".to_string(),
            evidence_ledger: true,
            thresholds: Thresholds::default(),
        }
    }
}

impl ExecutiveConfig {
    /// Defaults overlaid with the bundled reference profile.
    pub fn reference() -> Result<Self> {
        let mut config = Self::default();
        config.apply_values(&reference_values())?;
        Ok(config)
    }

    pub fn apply_values(&mut self, values: &ConfigValues) -> Result<()> {
        if let Some(value) = values.get_duration("sim_time_seconds")? {
            self.sim_time = value;
        }
        if let Some(value) = values.get_duration("safety_margin_seconds")? {
            self.safety_margin = value;
        }
        if let Some(value) = values.get_parsed::<f64>("sample_period_seconds")? {
            self.sample_period_seconds = value;
        }
        if let Some(value) = values.get_parsed::<usize>("min_samples")? {
            self.min_samples = value;
        }
        if let Some(value) = values.get("telemetry_source") {
            self.telemetry_source = PathBuf::from(value);
        }
        if let Some(value) = values.get("results_root") {
            self.results_root = PathBuf::from(value);
        }
        if let Some(value) = values.get("compose_command") {
            self.compose_command = value.to_string();
        }
        if let Some(value) = values.get("compose_service") {
            self.compose_service = value.to_string();
        }
        if let Some(value) = values.get("project_dir") {
            self.project_dir = PathBuf::from(value);
        }
        if let Some(value) = values.get("sim_duration_var") {
            self.sim_duration_var = value.to_string();
        }
        if let Some(value) = values.get_bool("evidence_ledger") {
            self.evidence_ledger = value;
        }
        if let Some(value) = values.get_parsed::<f64>("accuracy_threshold_m")? {
            self.thresholds.accuracy_m = value;
        }
        if let Some(value) = values.get_parsed::<f64>("stability_threshold_m")? {
            self.thresholds.stability_m = value;
        }
        if let Some(value) = values.get_parsed::<f64>("convergence_threshold_s")? {
            self.thresholds.convergence_s = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sim_time.is_zero() {
            return Err(VerifyError::invalid("sim time must be positive"));
        }
        if self.sim_time.subsec_nanos() != 0 {
            return Err(VerifyError::invalid(format!(
                "sim time must be a whole number of seconds, got {}ms",
                self.sim_time.as_millis()
            )));
        }
        if !(self.sample_period_seconds.is_finite() && self.sample_period_seconds > 0.0) {
            return Err(VerifyError::invalid(format!(
                "sample period must be positive, got {}",
                self.sample_period_seconds
            )));
        }
        if self.min_samples == 0 {
            return Err(VerifyError::invalid("minimum sample window must be positive"));
        }
        if self.compose_command.trim().is_empty() {
            return Err(VerifyError::invalid("compose command cannot be empty"));
        }
        if self.sim_duration_var.trim().is_empty() {
            return Err(VerifyError::invalid(
                "simulation duration variable cannot be empty",
            ));
        }
        let thresholds = [
            ("accuracy_threshold_m", self.thresholds.accuracy_m),
            ("stability_threshold_m", self.thresholds.stability_m),
            ("convergence_threshold_s", self.thresholds.convergence_s),
        ];
        for (key, value) in thresholds {
            if !value.is_finite() {
                return Err(VerifyError::invalid(format!("{key} must be finite")));
            }
        }
        Ok(())
    }

    /// Reference profile, then the optional config file on top.
    pub fn resolve(config_file: Option<&Path>) -> Result<Self> {
        let mut config = Self::reference()?;
        if let Some(path) = config_file {
            config.apply_values(&load_config_file(path)?)?;
        }
        Ok(config)
    }

    /// Upper bound on a single harness run: simulated time plus safety margin.
    #[must_use]
    pub fn harness_timeout(&self) -> Duration {
        self.sim_time.saturating_add(self.safety_margin)
    }

    /// Value passed to the harness in [`Self::sim_duration_var`].
    #[must_use]
    pub fn sim_duration_value(&self) -> String {
        self.sim_time.as_secs().to_string()
    }
}
