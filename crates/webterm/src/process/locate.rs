//! Locating and installing the external package tool.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::ProcessError;
use crate::config::ToolConfig;
use crate::transcript::Transcript;

/// How to invoke a located tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// Program and leading arguments, e.g. `["php", "/srv/composer.phar"]`.
    pub program: Vec<String>,
}

impl ToolCommand {
    /// A tool run directly.
    pub fn direct(path: impl Into<String>) -> Self {
        Self {
            program: vec![path.into()],
        }
    }

    /// An archive run through an interpreter.
    pub fn archive(interpreter: impl Into<String>, archive: &Path) -> Self {
        Self {
            program: vec![interpreter.into(), archive.display().to_string()],
        }
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program.join(" "))
    }
}

#[derive(Debug, Clone, Copy)]
enum Strategy {
    LocalArchive,
    PathLookup,
    VersionProbe,
    CommonPaths,
}

/// Lookup order; the first strategy that finds the tool wins.
const CHAIN: [Strategy; 4] = [
    Strategy::LocalArchive,
    Strategy::PathLookup,
    Strategy::VersionProbe,
    Strategy::CommonPaths,
];

/// Finds the external tool through a fixed fallback chain.
#[derive(Debug, Clone)]
pub struct ToolLocator {
    config: ToolConfig,
    project_root: PathBuf,
    search_path: Option<Vec<PathBuf>>,
}

impl ToolLocator {
    /// Create a locator for `config`, looking for local copies in `project_root`.
    pub fn new(config: ToolConfig, project_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            project_root: project_root.into(),
            search_path: None,
        }
    }

    /// Use `dirs` instead of `PATH` for the PATH lookup step.
    pub fn with_search_path(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_path = Some(dirs);
        self
    }

    /// Run the chain and return the first hit.
    pub async fn locate(&self) -> Option<ToolCommand> {
        for strategy in CHAIN {
            let found = match strategy {
                Strategy::LocalArchive => self.local_archive(),
                Strategy::PathLookup => self.path_lookup(),
                Strategy::VersionProbe => self.version_probe().await,
                Strategy::CommonPaths => self.common_paths(),
            };
            debug!(?strategy, found = found.is_some(), "tool lookup");
            if found.is_some() {
                return found;
            }
        }
        None
    }

    fn local_archive(&self) -> Option<ToolCommand> {
        let archive = self.project_root.join(&self.config.phar);
        archive
            .is_file()
            .then(|| ToolCommand::archive(&self.config.php_binary, &archive))
    }

    fn path_lookup(&self) -> Option<ToolCommand> {
        let dirs = match &self.search_path {
            Some(dirs) => dirs.clone(),
            None => std::env::var_os("PATH")
                .map(|path| std::env::split_paths(&path).collect())
                .unwrap_or_default(),
        };
        dirs.iter()
            .map(|dir| dir.join(&self.config.name))
            .find(|candidate| is_executable(candidate))
            .map(|path| ToolCommand::direct(path.display().to_string()))
    }

    async fn version_probe(&self) -> Option<ToolCommand> {
        let output = Command::new(&self.config.name)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .ok()?;
        let text = String::from_utf8_lossy(&output.stdout);
        text.contains(&self.config.version_marker)
            .then(|| ToolCommand::direct(&self.config.name))
    }

    fn common_paths(&self) -> Option<ToolCommand> {
        self.config
            .common_paths
            .iter()
            .find(|path| is_executable(path))
            .map(|path| ToolCommand::direct(path.display().to_string()))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Whether files can be created in `dir`.
pub(crate) async fn is_writable(dir: &Path) -> bool {
    let probe = dir.join(".webterm-write-probe");
    match tokio::fs::write(&probe, b"").await {
        Ok(()) => {
            let _ = tokio::fs::remove_file(&probe).await;
            true
        }
        Err(_) => false,
    }
}

/// Last-resort installer for the external tool.
#[async_trait]
pub trait ToolInstaller: Send + Sync + fmt::Debug {
    /// Install the tool into `project_root`, reporting progress to `transcript`.
    async fn install(
        &self,
        project_root: &Path,
        transcript: &mut Transcript,
    ) -> Result<ToolCommand, ProcessError>;
}

/// Downloads and runs the tool's official installer script.
///
/// The interpreter does the download itself, so no HTTP client is needed.
#[derive(Debug, Clone)]
pub struct PharInstaller {
    installer_url: String,
    php_binary: String,
    phar: String,
}

/// Installer script name, removed after the install attempt.
const SETUP_SCRIPT: &str = "composer-setup.php";

impl PharInstaller {
    /// Create an installer from tool configuration.
    pub fn new(config: &ToolConfig) -> Self {
        Self {
            installer_url: config.installer_url.clone(),
            php_binary: config.php_binary.clone(),
            phar: config.phar.clone(),
        }
    }

    async fn php(&self, project_root: &Path, args: &[&str]) -> Result<(), ProcessError> {
        let output = Command::new(&self.php_binary)
            .args(args)
            .current_dir(project_root)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProcessError::Spawn {
                program: self.php_binary.clone(),
                source,
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ProcessError::Install(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

#[async_trait]
impl ToolInstaller for PharInstaller {
    async fn install(
        &self,
        project_root: &Path,
        transcript: &mut Transcript,
    ) -> Result<ToolCommand, ProcessError> {
        let download = format!("copy('{}', '{}');", self.installer_url, SETUP_SCRIPT);
        let result = match self.php(project_root, &["-r", &download]).await {
            Ok(()) => self.php(project_root, &[SETUP_SCRIPT, "--quiet"]).await,
            Err(e) => Err(e),
        };
        let _ = tokio::fs::remove_file(project_root.join(SETUP_SCRIPT)).await;
        result?;

        let archive = project_root.join(&self.phar);
        if !archive.is_file() {
            return Err(ProcessError::Install(format!(
                "{} was not created",
                self.phar
            )));
        }
        transcript.line(format!("Successfully downloaded {}", self.phar));
        Ok(ToolCommand::archive(&self.php_binary, &archive))
    }
}
