//! Host command dispatch.
//!
//! The gateway hands every structured command to a [`CommandDispatcher`]
//! after normalization and validation. What a command actually does is the
//! host's business; the dispatcher only runs it and copies its output into
//! the transcript.
//!
//! - [`ProcessDispatcher`] runs the host console program as a child process.
//! - [`CommandTable`] is an in-process registry of closures, with built-in
//!   `list` and `help` commands.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::normalize::NormalizedCommand;
use crate::process::{ProcessRunner, ProcessSpec, exit_code_line};
use crate::transcript::Transcript;

/// Runs normalized console commands.
#[async_trait]
pub trait CommandDispatcher: Send + Sync + fmt::Debug {
    /// Run `command`, writing its output to `transcript`. Returns the exit code.
    async fn dispatch(
        &self,
        command: &NormalizedCommand,
        transcript: &mut Transcript,
    ) -> Result<i32, Error>;
}

/// Dispatches to an external console program, e.g. `php artisan`.
#[derive(Debug, Clone)]
pub struct ProcessDispatcher {
    program: Vec<String>,
    project_root: PathBuf,
    runner: ProcessRunner,
}

impl ProcessDispatcher {
    /// Create a dispatcher running `program` in `project_root`.
    pub fn new(program: Vec<String>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            program,
            project_root: project_root.into(),
            runner: ProcessRunner::new(),
        }
    }
}

#[async_trait]
impl CommandDispatcher for ProcessDispatcher {
    async fn dispatch(
        &self,
        command: &NormalizedCommand,
        transcript: &mut Transcript,
    ) -> Result<i32, Error> {
        let spec = ProcessSpec::buffered(&self.program, &command.text, &self.project_root);
        let code = self.runner.run_into(&spec, transcript).await?;
        if code != 0 {
            transcript.line(exit_code_line(code));
        }
        Ok(code)
    }
}

/// Handler for one in-process command: arguments after the verb, output sink.
pub type CommandFn = Arc<dyn Fn(&[String], &mut Transcript) -> Result<i32, Error> + Send + Sync>;

struct Registration {
    description: String,
    handler: CommandFn,
}

/// In-process command registry.
#[derive(Default, Clone)]
pub struct CommandTable {
    commands: BTreeMap<String, Arc<Registration>>,
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTable")
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CommandTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`. A later registration of the same name replaces it.
    pub fn register<F>(mut self, name: &str, description: &str, handler: F) -> Self
    where
        F: Fn(&[String], &mut Transcript) -> Result<i32, Error> + Send + Sync + 'static,
    {
        self.commands.insert(
            name.to_string(),
            Arc::new(Registration {
                description: description.to_string(),
                handler: Arc::new(handler),
            }),
        );
        self
    }

    fn list(&self, transcript: &mut Transcript) {
        transcript.line("Available commands:");
        let width = self
            .commands
            .keys()
            .map(String::len)
            .chain(["help".len(), "list".len()])
            .max()
            .unwrap_or(0);
        let builtin = [
            ("help", "Display help for a command"),
            ("list", "List commands"),
        ];
        let mut rows: Vec<(&str, &str)> = builtin.to_vec();
        rows.extend(
            self.commands
                .iter()
                .map(|(name, reg)| (name.as_str(), reg.description.as_str())),
        );
        rows.sort_by(|a, b| a.0.cmp(b.0));
        rows.dedup_by(|a, b| a.0 == b.0);
        for (name, description) in rows {
            transcript.line(format!("  {:width$}  {}", name, description, width = width));
        }
    }

    fn help(&self, topic: Option<&str>, transcript: &mut Transcript) -> Result<i32, Error> {
        match topic {
            None | Some("help") => {
                transcript.line("Usage: help <command>");
                Ok(0)
            }
            Some("list") => {
                transcript.line("list: List commands");
                Ok(0)
            }
            Some(name) => match self.commands.get(name) {
                Some(reg) => {
                    transcript.line(format!("{}: {}", name, reg.description));
                    Ok(0)
                }
                None => Err(undefined(name)),
            },
        }
    }
}

fn undefined(name: &str) -> Error {
    Error::Dispatch(format!("Command \"{}\" is not defined.", name))
}

#[async_trait]
impl CommandDispatcher for CommandTable {
    async fn dispatch(
        &self,
        command: &NormalizedCommand,
        transcript: &mut Transcript,
    ) -> Result<i32, Error> {
        let args = command.args();
        let (name, rest) = match args.split_first() {
            Some((name, rest)) => (name.as_str(), rest),
            None => ("list", &[][..]),
        };
        let positional = || rest.iter().find(|a| !a.starts_with('-')).map(String::as_str);

        if let Some(reg) = self.commands.get(name) {
            return (reg.handler)(rest, transcript);
        }
        match name {
            "list" => {
                self.list(transcript);
                Ok(0)
            }
            "help" => self.help(positional(), transcript),
            _ => Err(undefined(name)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::normalize::Normalizer;

    fn table() -> CommandTable {
        CommandTable::new()
            .register("greet", "Say hello", |args, transcript| {
                let who = args.iter().find(|a| !a.starts_with('-')).map_or("world", |s| s);
                transcript.line(format!("Hello, {}!", who));
                Ok(0)
            })
            .register("fail", "Always fails", |_, transcript| {
                transcript.line("nope");
                Ok(2)
            })
    }

    async fn run(table: &CommandTable, raw: &str) -> (Result<i32, Error>, Vec<String>) {
        let command = Normalizer::default().normalize(raw);
        let mut transcript = Transcript::new();
        let result = table.dispatch(&command, &mut transcript).await;
        (result, transcript.into_lines())
    }

    #[tokio::test]
    async fn test_registered_command_gets_args() {
        let (result, lines) = run(&table(), "greet 'Ada Lovelace'").await;
        assert_eq!(result.unwrap(), 0);
        assert_eq!(lines, ["Hello, Ada Lovelace!"]);
    }

    #[tokio::test]
    async fn test_exit_code_passes_through() {
        let (result, _) = run(&table(), "fail").await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_list_includes_builtins() {
        let (result, lines) = run(&table(), "").await;
        assert_eq!(result.unwrap(), 0);
        assert_eq!(lines[0], "Available commands:");
        let names: Vec<_> = lines[1..]
            .iter()
            .map(|l| l.split_whitespace().next().unwrap())
            .collect();
        assert_eq!(names, ["fail", "greet", "help", "list"]);
    }

    #[tokio::test]
    async fn test_help_for_command() {
        let (result, lines) = run(&table(), "help greet").await;
        assert_eq!(result.unwrap(), 0);
        assert_eq!(lines, ["greet: Say hello"]);
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (result, _) = run(&table(), "frobnicate").await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "dispatch error: Command \"frobnicate\" is not defined."
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_dispatcher_runs_program() {
        let root = tempfile::tempdir().unwrap();
        let dispatcher = ProcessDispatcher::new(vec!["echo".to_string()], root.path());
        let command = Normalizer::default().normalize("route:list");
        let mut transcript = Transcript::new();

        let code = dispatcher.dispatch(&command, &mut transcript).await.unwrap();
        assert_eq!(code, 0);
        assert_eq!(transcript.lines(), ["route:list --no-interaction"]);
    }
}
