//! Control surface of the external simulation harness.
//!
//! The orchestrator only ever talks to a [`Harness`]; the compose-backed
//! implementation below is the production binding. `reset` and `teardown`
//! must be idempotent: calling either on an already clean harness is not an
//! error.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::config::ExecutiveConfig;
use crate::error::{Result, VerifyError};
use crate::util::{ensure_dir, split_command};

/// Result of a bounded wait on a launched harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitOutcome {
    Completed { exit_code: Option<i32> },
    TimedOut,
}

pub trait Harness {
    /// Token for one launched run.
    type Handle;

    /// Short label used in logs and run metadata.
    fn label(&self) -> String;

    /// Tears down anything left over from a previous run.
    fn reset(&mut self) -> Result<()>;

    /// Starts a run with the given environment. Returns without waiting.
    fn launch(&mut self, env: &BTreeMap<String, String>) -> Result<Self::Handle>;

    /// Blocks until the run finishes or `timeout` elapses.
    fn await_completion(
        &mut self,
        handle: &mut Self::Handle,
        timeout: Duration,
    ) -> Result<AwaitOutcome>;

    /// Forcibly stops a run. Only used after a timeout.
    fn terminate(&mut self, handle: &mut Self::Handle) -> Result<()>;

    /// Releases every harness resource.
    fn teardown(&mut self) -> Result<()>;

    /// Where the next launch should write its console output, if anywhere.
    fn capture_output_to(&mut self, _path: &Path) {}
}

/// Handle of a running `compose up`.
#[derive(Debug)]
pub struct ComposeRun {
    child: Child,
}

impl ComposeRun {
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

/// Harness driven through a docker-compose project.
#[derive(Debug, Clone)]
pub struct ComposeHarness {
    program: String,
    base_args: Vec<String>,
    service: String,
    project_dir: PathBuf,
    output_log: Option<PathBuf>,
}

impl ComposeHarness {
    pub fn new(
        compose_command: &str,
        service: impl Into<String>,
        project_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let (program, base_args) = split_command(compose_command)?;
        Ok(Self {
            program,
            base_args,
            service: service.into(),
            project_dir: project_dir.into(),
            output_log: None,
        })
    }

    pub fn from_config(config: &ExecutiveConfig) -> Result<Self> {
        Self::new(
            &config.compose_command,
            config.compose_service.clone(),
            config.project_dir.clone(),
        )
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.base_args).current_dir(&self.project_dir);
        command
    }

    fn command_label(&self, subcommand: &str) -> String {
        let mut words = vec![self.program.clone()];
        words.extend(self.base_args.iter().cloned());
        words.push(subcommand.to_string());
        words.join(" ")
    }

    fn output_streams(&self) -> Result<(Stdio, Stdio)> {
        let Some(path) = &self.output_log else {
            return Ok((Stdio::null(), Stdio::null()));
        };
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        let out: File = OpenOptions::new().create(true).append(true).open(path)?;
        let err = out.try_clone()?;
        Ok((Stdio::from(out), Stdio::from(err)))
    }

    fn down(&self) -> Result<()> {
        let label = self.command_label("down -v");
        let status = self
            .command()
            .arg("down")
            .arg("-v")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|error| VerifyError::HarnessLaunch {
                command: label.clone(),
                message: error.to_string(),
            })?;
        // A project with nothing running exits non-zero on some compose versions.
        if !status.success() {
            debug!(command = %label, exit = ?status.code(), "compose down reported failure");
        }
        Ok(())
    }
}

impl Harness for ComposeHarness {
    type Handle = ComposeRun;

    fn label(&self) -> String {
        format!("{} ({})", self.command_label("up"), self.service)
    }

    fn reset(&mut self) -> Result<()> {
        self.down()
    }

    fn launch(&mut self, env: &BTreeMap<String, String>) -> Result<ComposeRun> {
        let label = self.command_label("up");
        let (stdout, stderr) = self.output_streams()?;
        let child = self
            .command()
            .arg("up")
            .arg("--abort-on-container-exit")
            .arg("--force-recreate")
            .arg("--exit-code-from")
            .arg(&self.service)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|error| VerifyError::HarnessLaunch {
                command: label,
                message: error.to_string(),
            })?;
        debug!(pid = child.id(), service = %self.service, "compose up spawned");
        Ok(ComposeRun { child })
    }

    fn await_completion(
        &mut self,
        handle: &mut ComposeRun,
        timeout: Duration,
    ) -> Result<AwaitOutcome> {
        match handle.child.wait_timeout(timeout)? {
            Some(status) => Ok(AwaitOutcome::Completed {
                exit_code: status.code(),
            }),
            None => Ok(AwaitOutcome::TimedOut),
        }
    }

    fn terminate(&mut self, handle: &mut ComposeRun) -> Result<()> {
        if let Err(error) = handle.child.kill() {
            warn!(pid = handle.pid(), %error, "failed to kill compose process");
        }
        if let Err(error) = handle.child.wait() {
            debug!(pid = handle.pid(), %error, "failed to reap compose process");
        }
        Ok(())
    }

    fn teardown(&mut self) -> Result<()> {
        self.down()
    }

    fn capture_output_to(&mut self, path: &Path) {
        self.output_log = Some(path.to_path_buf());
    }
}
