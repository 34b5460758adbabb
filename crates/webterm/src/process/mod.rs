//! External process execution.
//!
//! [`ProcessRunner`] runs a [`ProcessSpec`] in one of two modes. The mode is
//! never chosen by the caller: [`classify_mode`] derives it from the command
//! text, so package operations that can run for minutes stream their output
//! while everything else is buffered.
//!
//! - **Buffered**: wait for exit, then write the combined output. An empty
//!   run writes a placeholder line so the transcript is never empty.
//! - **Streamed**: read stdout and stderr line by line as the child produces
//!   them. Stderr lines are tagged. Every line goes through the transcript,
//!   which forwards it to a live listener if one is attached.
//!
//! The child always runs with its working directory set to the `ProcessSpec`'s
//! directory; the caller's own working directory is never changed.

mod locate;
mod tool;

pub use locate::{PharInstaller, ToolCommand, ToolInstaller, ToolLocator};
pub use tool::ToolRunner;

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::normalize::split_args;
use crate::transcript::{ExecutionResult, Transcript};

/// Substrings that mark a command as long-running.
pub const LONG_RUNNING: &[&str] = &[
    "install",
    "update",
    "require",
    "remove",
    "create-project",
    "dump-autoload",
    "self-update",
    "global require",
    "global update",
];

/// Line written when a buffered run produced no output.
pub const NO_OUTPUT: &str = "Command executed but produced no output.";

/// Line closing a buffered run that exited non-zero.
pub fn exit_code_line(code: i32) -> String {
    format!("Command exited with code: {}", code)
}

/// Prefix for stderr lines in streamed mode.
pub const STDERR_TAG: &str = "[stderr] ";

/// Errors raised while running an external process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The `ProcessSpec` had no program to run.
    #[error("empty command")]
    EmptyCommand,
    /// The program could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Reading output or waiting for the child failed.
    #[error("process IO error: {0}")]
    Io(#[from] io::Error),
    /// No copy of the external tool could be found.
    #[error("{0} not found")]
    ToolNotFound(String),
    /// The on-demand install did not produce a usable tool.
    #[error("install failed: {0}")]
    Install(String),
}

/// How a process's output is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Collect everything, then return once.
    Buffered,
    /// Forward output line by line while the child runs.
    Streamed,
}

/// Choose the run mode for `command` from the [`LONG_RUNNING`] table.
pub fn classify_mode(command: &str) -> RunMode {
    if LONG_RUNNING.iter().any(|verb| command.contains(verb)) {
        RunMode::Streamed
    } else {
        RunMode::Buffered
    }
}

/// A process to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    argv: Vec<String>,
    command: String,
    working_dir: PathBuf,
    mode: RunMode,
}

impl ProcessSpec {
    /// Run `command` with the `program` prefix in `working_dir`.
    ///
    /// The command is split with shell quoting rules and its mode is
    /// classified from the command text alone.
    pub fn new(program: &[String], command: &str, working_dir: impl Into<PathBuf>) -> Self {
        Self::with_mode(program, command, working_dir, classify_mode(command))
    }

    /// Like [`ProcessSpec::new`], but always buffered.
    ///
    /// Used for host console commands, whose verbs are not package
    /// operations even when they contain words like `install`.
    pub fn buffered(program: &[String], command: &str, working_dir: impl Into<PathBuf>) -> Self {
        Self::with_mode(program, command, working_dir, RunMode::Buffered)
    }

    fn with_mode(
        program: &[String],
        command: &str,
        working_dir: impl Into<PathBuf>,
        mode: RunMode,
    ) -> Self {
        let mut argv = program.to_vec();
        argv.extend(split_args(command));
        Self {
            argv,
            command: command.to_string(),
            working_dir: working_dir.into(),
            mode,
        }
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Command text the `ProcessSpec` was built from.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Directory the child runs in.
    pub fn working_dir(&self) -> &std::path::Path {
        &self.working_dir
    }

    /// Output collection mode.
    pub fn mode(&self) -> RunMode {
        self.mode
    }
}

/// Spawns processes described by [`ProcessSpec`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Create a runner.
    pub fn new() -> Self {
        Self
    }

    /// Run `spec` and collect its output into a fresh transcript.
    pub async fn run(&self, spec: &ProcessSpec) -> Result<ExecutionResult, ProcessError> {
        let mut transcript = Transcript::new();
        let code = self.run_into(spec, &mut transcript).await?;
        Ok(ExecutionResult::from_transcript(code, transcript))
    }

    /// Run `spec`, writing its output to `transcript`. Returns the exit code.
    ///
    /// A child killed by a signal reports `-1`.
    pub async fn run_into(
        &self,
        spec: &ProcessSpec,
        transcript: &mut Transcript,
    ) -> Result<i32, ProcessError> {
        let (program, args) = spec.argv.split_first().ok_or(ProcessError::EmptyCommand)?;
        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let spawn_error = |source| ProcessError::Spawn {
            program: program.clone(),
            source,
        };

        let code = match spec.mode {
            RunMode::Buffered => {
                let output = command.output().await.map_err(spawn_error)?;
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                let text = text.trim();
                if text.is_empty() {
                    transcript.line(NO_OUTPUT);
                } else {
                    transcript.block(text);
                }
                output.status.code().unwrap_or(-1)
            }
            RunMode::Streamed => {
                let mut child = command
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()
                    .map_err(spawn_error)?;
                let stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| io::Error::other("stdout was not captured"))?;
                let stderr = child
                    .stderr
                    .take()
                    .ok_or_else(|| io::Error::other("stderr was not captured"))?;

                let mut out_lines = BufReader::new(stdout).lines();
                let mut err_lines = BufReader::new(stderr).lines();
                let (mut out_done, mut err_done) = (false, false);
                while !(out_done && err_done) {
                    tokio::select! {
                        line = out_lines.next_line(), if !out_done => match line? {
                            Some(line) => transcript.line(line),
                            None => out_done = true,
                        },
                        line = err_lines.next_line(), if !err_done => match line? {
                            Some(line) => transcript.line(format!("{}{}", STDERR_TAG, line)),
                            None => err_done = true,
                        },
                    }
                }
                child.wait().await?.code().unwrap_or(-1)
            }
        };

        debug!(program = %program, mode = ?spec.mode, code, "process exited");
        Ok(code)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_classify_mode() {
        assert_eq!(classify_mode("install"), RunMode::Streamed);
        assert_eq!(classify_mode("require vendor/package"), RunMode::Streamed);
        assert_eq!(classify_mode("global update"), RunMode::Streamed);
        assert_eq!(classify_mode("--version"), RunMode::Buffered);
        assert_eq!(classify_mode("show"), RunMode::Buffered);
    }

    #[test]
    fn test_spec_splits_command_and_keeps_program() {
        let program = vec!["php".to_string(), "composer.phar".to_string()];
        let spec = ProcessSpec::new(&program, "require 'a/b c' --dev", "/srv");
        assert_eq!(spec.argv(), ["php", "composer.phar", "require", "a/b c", "--dev"]);
        assert_eq!(spec.mode(), RunMode::Streamed);

        let forced = ProcessSpec::buffered(&program, "migrate:install", "/srv");
        assert_eq!(forced.mode(), RunMode::Buffered);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_buffered_combines_output() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ProcessSpec::new(&sh("echo out; echo err >&2; exit 3"), "", dir.path());
        let result = ProcessRunner::new().run(&spec).await.unwrap();

        assert_eq!(result.exit_code, 3);
        assert_eq!(result.output, ["out", "err"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_buffered_placeholder_for_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ProcessSpec::new(&sh("true"), "", dir.path());
        let result = ProcessRunner::new().run(&spec).await.unwrap();

        assert!(result.success());
        assert_eq!(result.output, [NO_OUTPUT]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let spec = ProcessSpec::new(&sh("ls"), "", dir.path());
        let result = ProcessRunner::new().run(&spec).await.unwrap();

        assert_eq!(result.output, ["marker.txt"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_streamed_tags_stderr() {
        let dir = tempfile::tempdir().unwrap();
        // The trailing argument only selects the mode; sh ignores it as $0.
        let spec = ProcessSpec::new(&sh("echo out; echo err >&2"), "install", dir.path());
        assert_eq!(spec.mode(), RunMode::Streamed);

        let result = ProcessRunner::new().run(&spec).await.unwrap();
        let mut lines = result.output.clone();
        lines.sort();
        assert_eq!(lines, ["[stderr] err", "out"]);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ProcessSpec::new(&["/nonexistent/webterm-tool".to_string()], "", dir.path());
        let err = ProcessRunner::new().run(&spec).await.unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_empty_spec() {
        let spec = ProcessSpec::new(&[], "", "/");
        let err = ProcessRunner::new().run(&spec).await.unwrap_err();
        assert!(matches!(err, ProcessError::EmptyCommand));
    }
}
