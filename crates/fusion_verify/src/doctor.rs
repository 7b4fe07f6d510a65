use std::path::{Path, PathBuf};

use clap::Args;
use serde_json::json;

use crate::config::ExecutiveConfig;
use crate::error::{Result, VerifyError};
use crate::scenario::Suite;
use crate::util::{
    CliOutput, OutputIntegration, command_exists, ensure_dir, output_for, remove_file_if_exists,
    split_command, write_string,
};
use crate::validator::Validator;

#[derive(Debug, Clone, Default, Args)]
pub struct DoctorArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub suite: Option<PathBuf>,

    #[arg(long = "compose-command")]
    pub compose_command: Option<String>,

    #[arg(long = "results-root")]
    pub results_root: Option<PathBuf>,
}

fn check_command(name: &str, ui: &CliOutput) -> Result<()> {
    if command_exists(name) {
        ui.success(&format!("command available: {name}"));
        Ok(())
    } else {
        ui.error(&format!("command missing: {name}"));
        Err(VerifyError::MissingCommand {
            command: name.to_string(),
        })
    }
}

fn check_writable(root: &Path, ui: &CliOutput) -> Result<()> {
    ensure_dir(root)?;
    let probe = root.join(".fusion_verify_doctor_probe");
    write_string(&probe, "ok\n")?;
    remove_file_if_exists(&probe)?;
    ui.success(&format!("results root writable: {}", root.display()));
    Ok(())
}

pub fn run_doctor(args: DoctorArgs) -> Result<()> {
    let integration = OutputIntegration::detect();
    run_doctor_with_integration(&args, &integration)
}

fn run_doctor_with_integration(args: &DoctorArgs, integration: &OutputIntegration) -> Result<()> {
    let ui = output_for(integration);
    ui.rule(Some("fusion_verify doctor"));

    let mut config = ExecutiveConfig::resolve(args.config.as_deref())?;
    if let Some(command) = &args.compose_command {
        config.compose_command = command.clone();
    }
    if let Some(root) = &args.results_root {
        config.results_root = root.clone();
    }
    config.validate()?;
    ui.success("configuration valid");

    let (program, _) = split_command(&config.compose_command)?;
    check_command(&program, &ui)?;

    let suite = match &args.suite {
        Some(path) => Suite::load(path)?,
        None => Suite::builtin()?,
    };
    if suite.is_empty() {
        return Err(VerifyError::invalid("suite defines no scenarios"));
    }
    ui.success(&format!("suite valid: {} scenarios", suite.len()));

    let validator = Validator::reference(&config)?;
    ui.success(&format!(
        "requirement registry valid: {} requirements, minimum window {}",
        validator.len(),
        validator.min_samples()
    ));

    check_writable(&config.results_root, &ui)?;

    if integration.should_emit_json() {
        println!(
            "{}",
            json!({
                "command": "doctor",
                "status": "ok",
                "compose_program": program,
                "scenarios": suite.len(),
                "requirements": validator.len(),
                "min_samples": validator.min_samples(),
                "results_root": config.results_root.display().to_string(),
                "integration": integration,
            })
        );
    } else {
        ui.success("doctor checks passed");
    }
    Ok(())
}
