#![forbid(unsafe_code)]

pub mod batch;
pub mod cli;
pub mod config;
pub mod doctor;
pub mod error;
pub mod harness;
pub mod offline;
pub mod orchestrator;
pub mod report;
pub mod requirement;
pub mod runmeta;
pub mod runner;
pub mod scenario;
pub mod stats;
pub mod telemetry;
pub mod util;
pub mod validator;

pub use cli::run_from_env;
pub use error::{Result, VerifyError};
