//! Package tool commands.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use super::locate::{PharInstaller, ToolCommand, ToolInstaller, ToolLocator, is_writable};
use super::{ProcessRunner, ProcessSpec, RunMode, exit_code_line};
use crate::config::ToolConfig;
use crate::transcript::Transcript;

/// Flag appended to every tool command.
pub const NO_ANSI: &str = "--no-ansi";

/// Runs package tool commands in the project root.
///
/// The tool is resolved on every call, so a copy installed or uploaded
/// between calls is picked up without a restart.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    name: String,
    project_root: PathBuf,
    locator: ToolLocator,
    installer: Option<Arc<dyn ToolInstaller>>,
    runner: ProcessRunner,
}

impl ToolRunner {
    /// Create a runner for `config`. The installer is enabled when
    /// `config.auto_install` is set.
    pub fn new(config: &ToolConfig, project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let installer = config
            .auto_install
            .then(|| Arc::new(PharInstaller::new(config)) as Arc<dyn ToolInstaller>);
        Self {
            name: config.name.clone(),
            locator: ToolLocator::new(config.clone(), project_root.clone()),
            project_root,
            installer,
            runner: ProcessRunner::new(),
        }
    }

    /// Replace the locator.
    pub fn with_locator(mut self, locator: ToolLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Replace the last-resort installer, or disable it with `None`.
    pub fn with_installer(mut self, installer: Option<Arc<dyn ToolInstaller>>) -> Self {
        self.installer = installer;
        self
    }

    /// Run `command` (the tool's arguments), writing to `transcript`.
    ///
    /// Returns the exit code. In streamed mode the child's exit code is only
    /// logged: output has already been delivered, so the run reports success.
    pub async fn execute(&self, command: &str, transcript: &mut Transcript) -> i32 {
        let command = command.trim();
        if command.is_empty() {
            self.help(transcript);
            return 0;
        }

        let Some(tool) = self.resolve(transcript).await else {
            self.not_found(transcript);
            return 1;
        };

        let full = format!("{} {}", command, NO_ANSI);
        let spec = ProcessSpec::new(&tool.program, &full, &self.project_root);

        transcript.line(format!("Using: {}", tool));
        transcript.line(format!("Executing: {}", command));
        transcript.line(format!("Working Directory: {}", self.project_root.display()));
        transcript.blank();
        if spec.mode() == RunMode::Streamed {
            transcript.line("This may take a while...");
        }

        let code = match self.runner.run_into(&spec, transcript).await {
            Ok(code) => code,
            Err(e) => {
                transcript.line(format!("Error: {}", e));
                return 1;
            }
        };

        match spec.mode() {
            RunMode::Buffered if code != 0 => {
                transcript.line(exit_code_line(code));
                code
            }
            RunMode::Buffered => {
                transcript.line("Command completed");
                0
            }
            RunMode::Streamed => {
                debug!(code, "streamed command finished");
                transcript.line("Command completed");
                0
            }
        }
    }

    async fn resolve(&self, transcript: &mut Transcript) -> Option<ToolCommand> {
        if let Some(tool) = self.locator.locate().await {
            return Some(tool);
        }
        let installer = self.installer.as_ref()?;
        if !is_writable(&self.project_root).await {
            return None;
        }

        transcript.line(format!("{} not found. Attempting to download...", self.name));
        match installer.install(&self.project_root, transcript).await {
            Ok(tool) => Some(tool),
            Err(e) => {
                warn!(error = %e, "tool install failed");
                None
            }
        }
    }

    fn not_found(&self, transcript: &mut Transcript) {
        transcript.line(format!("{} not found", self.name));
        transcript.blank();
        transcript.line("For Shared Hosting:");
        transcript.line("1. Download composer.phar from https://getcomposer.org/composer.phar");
        transcript.line(format!("2. Upload to: {}", self.project_root.display()));
        transcript.blank();
        transcript.line("For Local Development:");
        transcript.line("1. Install via Homebrew: brew install composer");
        transcript.line("2. Or download from: https://getcomposer.org/");
        transcript.blank();
        transcript.line(format!("Once available, you can use any {} command!", self.name));
    }

    fn help(&self, transcript: &mut Transcript) {
        let name = &self.name;
        transcript.line(format!("{} terminal", name));
        transcript.blank();
        transcript.line("Package Management:");
        transcript.line(format!("  {} install                Install dependencies", name));
        transcript.line(format!("  {} update                 Update dependencies", name));
        transcript.line(format!("  {} require vendor/package Add new package", name));
        transcript.line(format!("  {} remove vendor/package  Remove package", name));
        transcript.line(format!("  {} show                   List packages", name));
        transcript.line(format!("  {} outdated               Show outdated packages", name));
        transcript.blank();
        transcript.line("Information & Validation:");
        transcript.line(format!("  {} --version              Show version", name));
        transcript.line(format!("  {} validate               Validate composer.json", name));
        transcript.line(format!("  {} diagnose               Diagnose issues", name));
        transcript.blank();
        transcript.line("Maintenance:");
        transcript.line(format!("  {} dump-autoload          Regenerate autoloader", name));
        transcript.line(format!("  {} clear-cache            Clear cache", name));
        transcript.line(format!("  {} self-update            Update the tool", name));
        transcript.blank();
        transcript.line("Use with caution on production sites.");
    }
}
