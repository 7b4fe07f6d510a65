use clap::{Parser, Subcommand};

use crate::doctor::{DoctorArgs, run_doctor};
use crate::error::Result;
use crate::offline::{StatsArgs, VerifyArgs, run_stats, run_verify};
use crate::runner::{RunArgs, run_batch};
use crate::scenario::{ListScenariosArgs, print_scenarios};

#[derive(Debug, Parser)]
#[command(
    name = "fusion_verify",
    about = "Scenario orchestration and requirement verification for the sensor-fusion service",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a scenario suite against the compose harness and write the SVR report.
    Run(RunArgs),

    /// Judge an existing telemetry file against the requirement registry.
    Verify(VerifyArgs),

    /// Error statistics for a telemetry file, optionally compared with another.
    Stats(StatsArgs),

    /// Print the scenarios of a suite.
    #[command(name = "list-scenarios")]
    ListScenarios(ListScenariosArgs),

    /// Validate environment and wiring.
    Doctor(DoctorArgs),
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => run_batch(args),
        Commands::Verify(args) => run_verify(args),
        Commands::Stats(args) => run_stats(args),
        Commands::ListScenarios(args) => print_scenarios(args),
        Commands::Doctor(args) => run_doctor(args),
    }
}
