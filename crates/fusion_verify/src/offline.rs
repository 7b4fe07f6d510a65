//! Harness-free commands over telemetry that already exists on disk.

use std::path::{Path, PathBuf};

use clap::Args;
use serde_json::json;

use crate::config::ExecutiveConfig;
use crate::error::{Result, VerifyError};
use crate::stats::{ErrorStats, StatsComparison, render_stats};
use crate::telemetry::load_telemetry;
use crate::util::{OutputIntegration, output_for};
use crate::validator::{Validator, VerdictStatus};

#[derive(Debug, Clone, Args)]
pub struct VerifyArgs {
    /// Telemetry CSV to judge.
    pub telemetry: PathBuf,

    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct StatsArgs {
    /// Telemetry CSV to summarize.
    pub telemetry: PathBuf,

    /// Second run to compare against the first.
    #[arg(long)]
    pub compare: Option<PathBuf>,
}

pub fn run_verify(args: VerifyArgs) -> Result<()> {
    let integration = OutputIntegration::detect();
    run_verify_with_integration(&args, &integration)
}

fn run_verify_with_integration(args: &VerifyArgs, integration: &OutputIntegration) -> Result<()> {
    let ui = output_for(integration);
    let config = ExecutiveConfig::resolve(args.config.as_deref())?;
    config.validate()?;
    let validator = Validator::reference(&config)?;
    let samples = load_telemetry(&args.telemetry)?;
    let verdict = validator.verify(&samples);

    if integration.should_emit_json() {
        println!(
            "{}",
            json!({
                "command": "verify",
                "status": verdict.status(),
                "telemetry": args.telemetry.display().to_string(),
                "samples": samples.len(),
                "min_samples": validator.min_samples(),
                "checks": verdict.ordered_checks().collect::<Vec<_>>(),
                "integration": integration,
            })
        );
    } else {
        ui.rule(Some(args.telemetry.display().to_string().as_str()));
        for check in verdict.ordered_checks() {
            let line = format!(
                "{}: Measured={:.2} | {} -> [{}]",
                check.srid,
                check.value,
                check.detail,
                check.status_label()
            );
            if check.pass {
                ui.success(&line);
            } else {
                ui.error(&line);
            }
        }
        if verdict.status() == VerdictStatus::Incomplete {
            ui.warning(&format!(
                "insufficient samples: {} < {}",
                samples.len(),
                validator.min_samples()
            ));
        }
        ui.info(&format!("verdict: {}", verdict.status()));
    }

    match verdict.status() {
        VerdictStatus::Pass => Ok(()),
        status => Err(VerifyError::exit(
            1,
            format!("{}: verdict {status}", args.telemetry.display()),
        )),
    }
}

fn stats_for(path: &Path) -> Result<ErrorStats> {
    let samples = load_telemetry(path)?;
    ErrorStats::from_samples(&samples).ok_or_else(|| {
        VerifyError::invalid(format!(
            "{}: no samples above the initialization threshold",
            path.display()
        ))
    })
}

pub fn run_stats(args: StatsArgs) -> Result<()> {
    let integration = OutputIntegration::detect();
    run_stats_with_integration(&args, &integration)
}

fn run_stats_with_integration(args: &StatsArgs, integration: &OutputIntegration) -> Result<()> {
    let primary = stats_for(&args.telemetry)?;
    let comparison = match &args.compare {
        Some(path) => Some(StatsComparison::new(primary, stats_for(path)?)),
        None => None,
    };

    if integration.should_emit_json() {
        println!(
            "{}",
            json!({
                "command": "stats",
                "status": "ok",
                "telemetry": args.telemetry.display().to_string(),
                "stats": primary,
                "comparison": comparison,
                "candidate_improves": comparison.as_ref().map(StatsComparison::candidate_improves),
                "integration": integration,
            })
        );
        return Ok(());
    }

    print!("{}", render_stats(&args.telemetry.display().to_string(), &primary));
    if let (Some(path), Some(comparison)) = (&args.compare, &comparison) {
        print!(
            "{}",
            render_stats(&path.display().to_string(), &comparison.candidate)
        );
        println!(
            "MAE delta: {:+.2} m | RMSE delta: {:+.2} m | Max delta: {:+.2} m",
            comparison.mae_delta, comparison.rmse_delta, comparison.max_delta
        );
        let verdict = if comparison.candidate_improves() {
            "lower"
        } else {
            "no lower"
        };
        println!(
            "{} has {verdict} MAE than {}",
            path.display(),
            args.telemetry.display()
        );
    }
    Ok(())
}
