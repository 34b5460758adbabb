//! Integration tests for package tool runs.
//!
//! A fake tool script stands in for the real package manager:
//! - Long-running verbs stream lines while the child is still running
//! - Other verbs are buffered and report non-zero exits
//! - Every run happens in the project root

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use webterm::process::{ToolLocator, ToolRunner};
use webterm::{ToolConfig, Transcript};

const TOOL_NAME: &str = "webterm-fake-tool";

/// `install` prints one line, waits for a `go` file in its working directory,
/// then finishes. Waiting on the marker proves the first line was delivered
/// before the process exited.
const FAKE_TOOL: &str = r#"#!/bin/sh
case "$1" in
  --version)
    echo "Fake Tool version 1.0"
    ;;
  install)
    echo "one"
    while [ ! -f go ]; do sleep 0.05; done
    echo "two"
    echo "warning: lockfile is stale" >&2
    ;;
  update)
    echo "updating"
    exit 3
    ;;
  where)
    pwd
    ;;
  fail)
    echo "bad things"
    exit 4
    ;;
esac
"#;

fn install_fake_tool(bin: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = bin.join(TOOL_NAME);
    std::fs::write(&path, FAKE_TOOL).expect("write tool");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

fn runner(root: &Path, bin: &Path) -> ToolRunner {
    let config = ToolConfig {
        name: TOOL_NAME.to_string(),
        common_paths: vec![],
        auto_install: false,
        ..ToolConfig::default()
    };
    let locator = ToolLocator::new(config.clone(), root).with_search_path(vec![bin.to_path_buf()]);
    ToolRunner::new(&config, root).with_locator(locator)
}

// =============================================================================
// Streamed Mode Tests
// =============================================================================

mod streamed {
    use super::*;

    #[tokio::test]
    async fn test_lines_arrive_before_exit() {
        let root = tempfile::tempdir().expect("root");
        let bin = tempfile::tempdir().expect("bin");
        install_fake_tool(bin.path());
        let runner = runner(root.path(), bin.path());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let mut transcript = Transcript::with_listener(tx);
            let code = runner.execute("install", &mut transcript).await;
            (code, transcript.into_lines())
        });

        let mut seen = Vec::new();
        loop {
            let line = timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("line before timeout")
                .expect("listener open");
            let done = line == "one";
            seen.push(line);
            if done {
                break;
            }
        }
        assert!(seen.contains(&"This may take a while...".to_string()));
        assert!(!task.is_finished(), "child should still be waiting");

        std::fs::write(root.path().join("go"), "").expect("marker");
        let (code, lines) = timeout(Duration::from_secs(10), task)
            .await
            .expect("finish before timeout")
            .expect("task");

        assert_eq!(code, 0);
        assert!(lines.contains(&"two".to_string()));
        assert!(lines.contains(&"[stderr] warning: lockfile is stale".to_string()));
        assert_eq!(lines.last().map(String::as_str), Some("Command completed"));
    }

    #[tokio::test]
    async fn test_streamed_exit_code_is_not_reported() {
        let root = tempfile::tempdir().expect("root");
        let bin = tempfile::tempdir().expect("bin");
        install_fake_tool(bin.path());

        let mut transcript = Transcript::new();
        let code = runner(root.path(), bin.path())
            .execute("update", &mut transcript)
            .await;

        assert_eq!(code, 0);
        assert!(transcript.lines().iter().any(|l| l == "updating"));
        assert_eq!(transcript.lines().last().map(String::as_str), Some("Command completed"));
    }
}

// =============================================================================
// Buffered Mode Tests
// =============================================================================

mod buffered {
    use super::*;

    #[tokio::test]
    async fn test_version_is_buffered() {
        let root = tempfile::tempdir().expect("root");
        let bin = tempfile::tempdir().expect("bin");
        let tool = install_fake_tool(bin.path());

        let mut transcript = Transcript::new();
        let code = runner(root.path(), bin.path())
            .execute("--version", &mut transcript)
            .await;

        assert_eq!(code, 0);
        assert_eq!(
            transcript.lines(),
            [
                format!("Using: {}", tool.display()),
                "Executing: --version".to_string(),
                format!("Working Directory: {}", root.path().display()),
                String::new(),
                "Fake Tool version 1.0".to_string(),
                "Command completed".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_reported() {
        let root = tempfile::tempdir().expect("root");
        let bin = tempfile::tempdir().expect("bin");
        install_fake_tool(bin.path());

        let mut transcript = Transcript::new();
        let code = runner(root.path(), bin.path())
            .execute("fail", &mut transcript)
            .await;

        assert_eq!(code, 4);
        let tail: Vec<_> = transcript.lines().iter().rev().take(2).rev().collect();
        assert_eq!(tail, ["bad things", "Command exited with code: 4"]);
    }

    #[tokio::test]
    async fn test_runs_in_project_root() {
        let root = tempfile::tempdir().expect("root");
        let bin = tempfile::tempdir().expect("bin");
        install_fake_tool(bin.path());
        let before = std::env::current_dir().expect("cwd");

        let mut transcript = Transcript::new();
        runner(root.path(), bin.path())
            .execute("where", &mut transcript)
            .await;

        let reported = PathBuf::from(&transcript.lines()[4]);
        assert_eq!(
            reported.canonicalize().expect("canonical"),
            root.path().canonicalize().expect("canonical")
        );
        assert_eq!(std::env::current_dir().expect("cwd"), before);
    }
}
