use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, Utc};
use fastapi_output::RichOutput;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlmodel_console::OutputMode as SqlModelOutputMode;
use tracing_subscriber::EnvFilter;

use crate::error::{Result, VerifyError};

#[must_use]
pub fn now_utc_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[must_use]
pub fn now_compact_timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

#[must_use]
pub fn now_local_display() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn command_exists(command: &str) -> bool {
    which::which(command).is_ok()
}

/// Installs the stderr `tracing` subscriber for the binary.
///
/// `RUST_LOG` takes precedence; otherwise only warnings and errors are shown so
/// the operator-facing [`CliOutput`] lines stay readable.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputIntegration {
    pub fastapi_mode: String,
    pub fastapi_agent: bool,
    pub fastapi_ci: bool,
    pub fastapi_tty: bool,
    pub sqlmodel_mode: String,
    pub sqlmodel_agent: bool,
}

impl OutputIntegration {
    #[must_use]
    pub fn detect() -> Self {
        let fastapi_detection = fastapi_output::detect_environment();
        let fastapi_mode = fastapi_output::OutputMode::auto();
        let sqlmodel_mode = SqlModelOutputMode::detect();
        Self {
            fastapi_mode: fastapi_mode.as_str().to_string(),
            fastapi_agent: fastapi_detection.is_agent,
            fastapi_ci: fastapi_detection.is_ci,
            fastapi_tty: fastapi_detection.is_tty,
            sqlmodel_mode: sqlmodel_mode.as_str().to_string(),
            sqlmodel_agent: SqlModelOutputMode::is_agent_environment(),
        }
    }

    #[must_use]
    pub fn should_emit_json(&self) -> bool {
        self.sqlmodel_mode == "json"
    }
}

#[derive(Debug, Clone)]
pub struct CliOutput {
    inner: RichOutput,
    enabled: bool,
}

impl CliOutput {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            inner: RichOutput::auto(),
            enabled,
        }
    }

    /// Output sink that never prints. Used by library callers and tests.
    #[must_use]
    pub fn silent() -> Self {
        Self::new(false)
    }

    pub fn rule(&self, title: Option<&str>) {
        if self.enabled {
            self.inner.rule(title);
        }
    }

    pub fn info(&self, message: &str) {
        if self.enabled {
            self.inner.info(message);
        }
    }

    pub fn success(&self, message: &str) {
        if self.enabled {
            self.inner.success(message);
        }
    }

    pub fn warning(&self, message: &str) {
        if self.enabled {
            self.inner.warning(message);
        }
    }

    pub fn error(&self, message: &str) {
        if self.enabled {
            self.inner.error(message);
        }
    }
}

#[must_use]
pub fn output_for(integration: &OutputIntegration) -> CliOutput {
    CliOutput::new(!integration.should_emit_json())
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

pub fn write_string(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

pub fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Removes `path` if present. Returns whether a file was actually removed.
pub fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error.into()),
    }
}

pub fn parse_duration_value(raw: &str) -> Result<Duration> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(VerifyError::invalid("duration value cannot be empty"));
    }

    if let Some(ms) = trimmed.strip_suffix("ms") {
        let value = ms
            .trim()
            .parse::<u64>()
            .map_err(|_| VerifyError::invalid(format!("invalid millisecond duration: {raw}")))?;
        return Ok(Duration::from_millis(value));
    }

    if let Some(sec) = trimmed.strip_suffix('s') {
        let value = sec
            .trim()
            .parse::<u64>()
            .map_err(|_| VerifyError::invalid(format!("invalid second duration: {raw}")))?;
        return Ok(Duration::from_secs(value));
    }

    let value = trimmed
        .parse::<u64>()
        .map_err(|_| VerifyError::invalid(format!("invalid duration value: {raw}")))?;
    Ok(Duration::from_secs(value))
}

/// Splits a command line such as `docker compose` into program and leading args.
pub fn split_command(raw: &str) -> Result<(String, Vec<String>)> {
    let mut words = raw.split_whitespace().map(ToOwned::to_owned);
    let program = words
        .next()
        .ok_or_else(|| VerifyError::invalid("command cannot be empty"))?;
    Ok((program, words.collect()))
}

/// Artifact-safe file stem: anything outside `[A-Za-z0-9._-]` becomes `_`.
#[must_use]
pub fn sanitize_file_stem(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[must_use]
pub fn relative_to(base: &Path, path: &Path) -> Option<PathBuf> {
    pathdiff::diff_paths(path, base)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use tempfile::tempdir;

    use super::{
        OutputIntegration, output_for, parse_duration_value, relative_to, remove_file_if_exists,
        sanitize_file_stem, sha256_file, split_command,
    };

    #[test]
    fn parse_duration_supports_ms_s_and_plain_seconds() {
        assert_eq!(
            parse_duration_value("250ms").expect("ms duration"),
            Duration::from_millis(250)
        );
        assert_eq!(
            parse_duration_value("7s").expect("seconds duration"),
            Duration::from_secs(7)
        );
        assert_eq!(
            parse_duration_value("9").expect("plain seconds duration"),
            Duration::from_secs(9)
        );
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        let empty = parse_duration_value("").expect_err("empty duration should fail");
        assert!(empty.to_string().contains("duration value cannot be empty"));

        let malformed = parse_duration_value("bad").expect_err("malformed duration should fail");
        assert!(malformed.to_string().contains("invalid duration value"));
    }

    #[test]
    fn split_command_handles_multi_word_programs() {
        let (program, args) = split_command("docker compose").expect("split");
        assert_eq!(program, "docker");
        assert_eq!(args, vec!["compose".to_string()]);

        let (program, args) = split_command("  docker-compose ").expect("split");
        assert_eq!(program, "docker-compose");
        assert!(args.is_empty());

        assert!(split_command("   ").is_err());
    }

    #[test]
    fn sanitize_file_stem_replaces_path_separators() {
        assert_eq!(
            sanitize_file_stem("TC-ACC-01_nominal_speed_50ms"),
            "TC-ACC-01_nominal_speed_50ms"
        );
        assert_eq!(sanitize_file_stem("a/b c"), "a_b_c");
    }

    #[test]
    fn remove_file_if_exists_is_idempotent() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("results.csv");
        std::fs::write(&path, "error_m\n").expect("write");

        assert!(remove_file_if_exists(&path).expect("first remove"));
        assert!(!remove_file_if_exists(&path).expect("second remove"));
        assert!(!path.exists());
    }

    #[test]
    fn sha256_file_matches_known_digest() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("abc.txt");
        std::fs::write(&path, "abc").expect("write");
        assert_eq!(
            sha256_file(&path).expect("digest"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn relative_to_returns_path_relative_to_base() {
        let base = Path::new("/tmp/root");
        let target = Path::new("/tmp/root/a/b.csv");
        let relative = relative_to(base, target).expect("relative path");
        assert_eq!(relative, Path::new("a/b.csv"));
    }

    #[test]
    fn output_for_disables_human_output_when_json_mode_requested() {
        let json_integration = OutputIntegration {
            fastapi_mode: "plain".to_string(),
            fastapi_agent: true,
            fastapi_ci: false,
            fastapi_tty: false,
            sqlmodel_mode: "json".to_string(),
            sqlmodel_agent: true,
        };
        let human_integration = OutputIntegration {
            sqlmodel_mode: "plain".to_string(),
            ..json_integration.clone()
        };

        assert!(!output_for(&json_integration).enabled);
        assert!(output_for(&human_integration).enabled);
    }
}
