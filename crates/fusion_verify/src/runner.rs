use std::path::PathBuf;

use clap::Args;

use crate::batch::BatchExecutive;
use crate::config::ExecutiveConfig;
use crate::error::{Result, VerifyError};
use crate::harness::ComposeHarness;
use crate::scenario::{Suite, parse_id_list};
use crate::util::{OutputIntegration, command_exists, output_for, parse_duration_value};
use crate::validator::{Validator, VerdictStatus};

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// `key=value` config file layered over the reference profile.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// JSON suite file; defaults to the built-in DO-178C suite.
    #[arg(long)]
    pub suite: Option<PathBuf>,

    /// Comma-separated scenario ids to run, in suite order.
    #[arg(long)]
    pub only: Option<String>,

    #[arg(long = "results-root")]
    pub results_root: Option<PathBuf>,

    #[arg(long = "telemetry-source")]
    pub telemetry_source: Option<PathBuf>,

    #[arg(long = "compose-command")]
    pub compose_command: Option<String>,

    #[arg(long = "project-dir")]
    pub project_dir: Option<PathBuf>,

    #[arg(long = "sim-time")]
    pub sim_time: Option<String>,

    #[arg(long = "safety-margin")]
    pub safety_margin: Option<String>,

    #[arg(long = "no-evidence-ledger")]
    pub no_evidence_ledger: bool,
}

/// Defaults, then config file, then flags.
pub fn resolve_config(args: &RunArgs) -> Result<ExecutiveConfig> {
    let mut config = ExecutiveConfig::resolve(args.config.as_deref())?;
    if let Some(value) = &args.results_root {
        config.results_root = value.clone();
    }
    if let Some(value) = &args.telemetry_source {
        config.telemetry_source = value.clone();
    }
    if let Some(value) = &args.compose_command {
        config.compose_command = value.clone();
    }
    if let Some(value) = &args.project_dir {
        config.project_dir = value.clone();
    }
    if let Some(value) = &args.sim_time {
        config.sim_time = parse_duration_value(value)?;
    }
    if let Some(value) = &args.safety_margin {
        config.safety_margin = parse_duration_value(value)?;
    }
    if args.no_evidence_ledger {
        config.evidence_ledger = false;
    }
    config.validate()?;
    Ok(config)
}

pub fn resolve_suite(args: &RunArgs) -> Result<Suite> {
    let suite = match &args.suite {
        Some(path) => Suite::load(path)?,
        None => Suite::builtin()?,
    };
    let Some(only) = &args.only else {
        return Ok(suite);
    };
    let ids = parse_id_list(only);
    if ids.is_empty() {
        return Err(VerifyError::invalid("--only selected no scenarios"));
    }
    suite.select(&ids)
}

pub fn run_batch(args: RunArgs) -> Result<()> {
    let integration = OutputIntegration::detect();
    run_batch_with_integration(&args, &integration)
}

fn run_batch_with_integration(args: &RunArgs, integration: &OutputIntegration) -> Result<()> {
    let ui = output_for(integration);
    let config = resolve_config(args)?;
    let suite = resolve_suite(args)?;
    let validator = Validator::reference(&config)?;
    let harness = ComposeHarness::from_config(&config)?;

    if !command_exists(harness.program()) {
        ui.warning(&format!(
            "compose program not found: {}; scenarios will be INCOMPLETE",
            harness.program()
        ));
    }

    let mut executive =
        BatchExecutive::new(config, validator, harness)?.with_output(ui.clone());
    let batch = executive.execute(&suite)?;

    let passed = batch.count(VerdictStatus::Pass);
    let failed = batch.count(VerdictStatus::Fail);
    let incomplete = batch.count(VerdictStatus::Incomplete);
    let status = if batch.all_passed() { "ok" } else { "failed" };

    if integration.should_emit_json() {
        println!(
            "{}",
            serde_json::json!({
                "command": "run",
                "status": status,
                "batch_id": batch.batch_id(),
                "batch_dir": batch.batch_dir().display().to_string(),
                "pass_count": passed,
                "fail_count": failed,
                "incomplete_count": incomplete,
                "integration": integration,
            })
        );
    } else {
        ui.rule(Some("summary"));
        ui.info(&format!(
            "{passed} PASS / {failed} FAIL / {incomplete} INCOMPLETE in {}",
            batch.batch_dir().display()
        ));
    }

    if batch.all_passed() {
        Ok(())
    } else {
        Err(VerifyError::exit(
            batch.exit_code(),
            format!(
                "batch {} did not pass: {failed} FAIL, {incomplete} INCOMPLETE",
                batch.batch_id()
            ),
        ))
    }
}
