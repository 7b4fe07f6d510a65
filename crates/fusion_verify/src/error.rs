use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VerifyError>;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing dependency command: {command}")]
    MissingCommand { command: String },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("required path does not exist: {path}")]
    MissingPath { path: PathBuf },

    #[error("duplicate requirement id: {srid}")]
    DuplicateRequirementId { srid: String },

    #[error(
        "requirement {srid} reads from sample offset {offset} but the minimum window is {min_samples}"
    )]
    WindowExceedsMinimum {
        srid: String,
        offset: usize,
        min_samples: usize,
    },

    #[error("duplicate scenario id: {id}")]
    DuplicateScenarioId { id: String },

    #[error("scenarios {first} and {second} share artifact name {stem}")]
    DuplicateArtifactStem {
        stem: String,
        first: String,
        second: String,
    },

    #[error("scenario not found: {id}")]
    ScenarioNotFound { id: String },

    #[error("telemetry parse error in {path} line {line}: {message}")]
    TelemetryParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("invalid run state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("harness launch failed: {command}: {message}")]
    HarnessLaunch { command: String, message: String },

    #[error("{message}")]
    Exit { code: i32, message: String },
}

impl VerifyError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Exit { code, .. } => *code,
            Self::DuplicateRequirementId { .. }
            | Self::WindowExceedsMinimum { .. }
            | Self::DuplicateScenarioId { .. }
            | Self::DuplicateArtifactStem { .. }
            | Self::ScenarioNotFound { .. }
            | Self::InvalidArgument { .. } => 2,
            _ => 1,
        }
    }

    #[must_use]
    pub fn exit(code: i32, message: impl Into<String>) -> Self {
        Self::Exit {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
