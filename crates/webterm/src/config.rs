//! Terminal configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// The configuration file is not valid JSON for [`TerminalConfig`].
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        /// Path that was being parsed.
        path: PathBuf,
        /// Underlying serde error.
        source: serde_json::Error,
    },
}

/// Where session variables are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Process-local map; state is lost when the process exits.
    #[default]
    Memory,
    /// One JSON document per session under `dir`.
    File {
        /// Directory holding session documents.
        dir: PathBuf,
    },
}

/// How the external package tool is located and invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Executable name looked up on PATH.
    pub name: String,
    /// Archive name looked for in the project root.
    pub phar: String,
    /// Interpreter used to run the archive.
    pub php_binary: String,
    /// Text the `--version` probe output must contain.
    pub version_marker: String,
    /// Fallback install locations, checked in order.
    pub common_paths: Vec<PathBuf>,
    /// Installer script fetched when nothing else is found.
    pub installer_url: String,
    /// Whether to attempt the on-demand install.
    pub auto_install: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            name: "composer".to_string(),
            phar: "composer.phar".to_string(),
            php_binary: "php".to_string(),
            version_marker: "Composer".to_string(),
            common_paths: [
                "/usr/local/bin/composer",
                "/usr/bin/composer",
                "/bin/composer",
                "/opt/cpanel/composer/bin/composer",
                "/home/composer/composer.phar",
                "/opt/homebrew/bin/composer",
            ]
            .into_iter()
            .map(PathBuf::from)
            .collect(),
            installer_url: "https://getcomposer.org/installer".to_string(),
            auto_install: true,
        }
    }
}

/// The host console program that structured commands are dispatched to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Program and leading arguments, e.g. `["php", "artisan"]`.
    pub program: Vec<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            program: vec!["php".to_string(), "artisan".to_string()],
        }
    }
}

/// Top-level configuration for a terminal instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Directory every external command runs in.
    pub project_root: PathBuf,
    /// Width of the time bucket used to derive session keys.
    #[serde(with = "duration_secs")]
    pub session_window: Duration,
    /// How long stored variables live after the last write.
    #[serde(with = "duration_secs")]
    pub variable_ttl: Duration,
    /// Cap on output captured during a single evaluation.
    pub max_output_bytes: usize,
    /// Variable store backend.
    pub store: StoreConfig,
    /// External package tool.
    pub tool: ToolConfig,
    /// Host console program.
    pub console: ConsoleConfig,
    /// Values exposed to the evaluator's `config()` builtin.
    pub config_values: BTreeMap<String, serde_json::Value>,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            project_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            session_window: Duration::from_secs(5 * 60),
            variable_ttl: Duration::from_secs(60 * 60),
            max_output_bytes: 1024 * 1024,
            store: StoreConfig::default(),
            tool: ToolConfig::default(),
            console: ConsoleConfig::default(),
            config_values: BTreeMap::new(),
        }
    }
}

impl TerminalConfig {
    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Variable TTL in whole minutes, as shown in help text.
    pub fn ttl_minutes(&self) -> u64 {
        self.variable_ttl.as_secs() / 60
    }
}

/// Helper for serializing Duration as whole seconds
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
