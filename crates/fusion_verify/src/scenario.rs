use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VerifyError};
use crate::util::{OutputIntegration, sanitize_file_stem};

const DO178C_SUITE: &str = include_str!("../suites/do178c.json");

/// One environment-parameterized test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ScenarioDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            env: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Deterministic artifact stem, `{id}_{name}`.
    #[must_use]
    pub fn artifact_stem(&self) -> String {
        sanitize_file_stem(&format!("{}_{}", self.id, self.name))
    }
}

/// Ordered scenario suite with unique ids. Iteration order is execution order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Suite {
    scenarios: Vec<ScenarioDefinition>,
}

impl Suite {
    pub fn new(scenarios: Vec<ScenarioDefinition>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        let mut stems = BTreeMap::new();
        for scenario in &scenarios {
            if scenario.id.trim().is_empty() {
                return Err(VerifyError::invalid("scenario id cannot be empty"));
            }
            if !seen.insert(scenario.id.as_str()) {
                return Err(VerifyError::DuplicateScenarioId {
                    id: scenario.id.clone(),
                });
            }
            if let Some(first) = stems.insert(scenario.artifact_stem(), scenario.id.as_str()) {
                return Err(VerifyError::DuplicateArtifactStem {
                    stem: scenario.artifact_stem(),
                    first: first.to_string(),
                    second: scenario.id.clone(),
                });
            }
        }
        Ok(Self { scenarios })
    }

    /// The DO-178C reference suite bundled with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_json_str(DO178C_SUITE)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let scenarios = serde_json::from_str::<Vec<ScenarioDefinition>>(content)?;
        Self::new(scenarios)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(VerifyError::MissingPath {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Keeps only `ids`, in suite order. Unknown ids are an error.
    pub fn select(&self, ids: &[String]) -> Result<Self> {
        if let Some(unknown) = ids.iter().find(|id| self.get(id).is_none()) {
            return Err(VerifyError::ScenarioNotFound { id: unknown.clone() });
        }
        let scenarios = self
            .scenarios
            .iter()
            .filter(|scenario| ids.contains(&scenario.id))
            .cloned()
            .collect();
        Ok(Self { scenarios })
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ScenarioDefinition> {
        self.scenarios.iter().find(|scenario| scenario.id == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScenarioDefinition> {
        self.scenarios.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

impl<'a> IntoIterator for &'a Suite {
    type Item = &'a ScenarioDefinition;
    type IntoIter = std::slice::Iter<'a, ScenarioDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Splits a comma-separated id list, dropping blanks.
#[must_use]
pub fn parse_id_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[derive(Debug, Clone, Default, Args)]
pub struct ListScenariosArgs {
    /// JSON suite file; defaults to the built-in DO-178C suite.
    #[arg(long)]
    pub suite: Option<PathBuf>,
}

/// One line per scenario: id, name, and env overrides.
#[must_use]
pub fn render_scenario_lines(suite: &Suite) -> Vec<String> {
    suite
        .iter()
        .map(|scenario| {
            let env = scenario
                .env
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(" ");
            format!("{}\t{}\t{env}", scenario.id, scenario.name)
        })
        .collect()
}

pub fn print_scenarios(args: ListScenariosArgs) -> Result<()> {
    let suite = match &args.suite {
        Some(path) => Suite::load(path)?,
        None => Suite::builtin()?,
    };
    if OutputIntegration::detect().should_emit_json() {
        println!("{}", serde_json::to_string(&suite.scenarios)?);
    } else {
        for line in render_scenario_lines(&suite) {
            println!("{line}");
        }
    }
    Ok(())
}
