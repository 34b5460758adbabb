//! End-to-end tests for the execution gateway.
//!
//! These tests drive [`Gateway::handle`] the way a transport would:
//! - Validation short-circuits before anything runs
//! - REPL variables persist per caller and survive a gateway restart
//! - Variables expire after their TTL
//! - Evaluation errors stay inside the transcript
//! - Console and tool routes map exit codes to envelopes

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use webterm::gateway::{INTERNAL_ERROR, INVALID_REQUEST};
use webterm::process::{ToolLocator, ToolRunner};
use webterm::{
    CommandTable, ConsoleConfig, Gateway, ManualClock, RpcRequest, StoreConfig, TerminalConfig,
    ToolConfig,
};

fn config(root: &Path, store_dir: &Path) -> TerminalConfig {
    TerminalConfig {
        project_root: root.to_path_buf(),
        store: StoreConfig::File {
            dir: store_dir.to_path_buf(),
        },
        ..TerminalConfig::default()
    }
}

fn tinker(code: &str) -> RpcRequest {
    RpcRequest::new("tinker", vec![code.to_string()])
}

fn store_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

// =============================================================================
// Validation Tests
// =============================================================================

mod validation {
    use super::*;

    #[tokio::test]
    async fn test_denied_method_has_no_side_effects() {
        let root = tempfile::tempdir().expect("root");
        let store = tempfile::tempdir().expect("store");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let table = CommandTable::new().register("migrate", "Run migrations", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        });
        let gateway = Gateway::builder(config(root.path(), store.path()))
            .dispatcher(Arc::new(table))
            .build();

        let response = gateway
            .handle(&RpcRequest::new("migrate", vec![]).with_id(1), None)
            .await;

        let error = response.error.expect("error envelope");
        assert_eq!(error.code, INVALID_REQUEST);
        assert!(response.result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0, "dispatcher must not run");
        assert_eq!(store_entries(store.path()), 0, "store must be untouched");
    }

    #[tokio::test]
    async fn test_denied_prefix_family() {
        let root = tempfile::tempdir().expect("root");
        let store = tempfile::tempdir().expect("store");
        let gateway = Gateway::builder(config(root.path(), store.path()))
            .dispatcher(Arc::new(CommandTable::new()))
            .build();

        for method in ["migrate:fresh", "db:seed", "key:generate", "down", "up"] {
            let response = gateway.handle(&RpcRequest::new(method, vec![]), None).await;
            assert_eq!(
                response.error.map(|e| e.code),
                Some(INVALID_REQUEST),
                "{} should be denied",
                method
            );
        }
    }

    #[tokio::test]
    async fn test_id_is_echoed() {
        let root = tempfile::tempdir().expect("root");
        let store = tempfile::tempdir().expect("store");
        let gateway = Gateway::builder(config(root.path(), store.path()))
            .dispatcher(Arc::new(CommandTable::new()))
            .build();

        let ok = gateway.handle(&tinker("1 + 1").with_id("req-1"), None).await;
        assert_eq!(ok.id, Some(serde_json::json!("req-1")));

        let denied = gateway
            .handle(&RpcRequest::new("down", vec![]).with_id(99), None)
            .await;
        assert_eq!(denied.id, Some(serde_json::json!(99)));
    }
}

// =============================================================================
// REPL Persistence Tests
// =============================================================================

mod persistence {
    use super::*;

    #[tokio::test]
    async fn test_assignment_then_read() {
        let root = tempfile::tempdir().expect("root");
        let store = tempfile::tempdir().expect("store");
        let gateway = Gateway::from_config(config(root.path(), store.path()));

        let first = gateway.handle(&tinker("$x = 42"), Some("10.1.1.1")).await;
        assert_eq!(first.result.as_deref(), Some(">>> $x = 42\n=> 42"));

        let second = gateway.handle(&tinker("$x"), Some("10.1.1.1")).await;
        assert_eq!(second.result.as_deref(), Some(">>> $x\n=> 42"));

        let vars = gateway.handle(&tinker("vars"), Some("10.1.1.1")).await;
        assert_eq!(
            vars.result.as_deref(),
            Some("Stored Variables:\n  $x (integer) = 42")
        );
    }

    #[tokio::test]
    async fn test_state_survives_new_gateway() {
        let root = tempfile::tempdir().expect("root");
        let store = tempfile::tempdir().expect("store");
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let gateway = Gateway::builder(config(root.path(), store.path()))
            .clock(clock.clone())
            .build();
        gateway
            .handle(&tinker("$items = collect([1, 2, 3])"), Some("cli"))
            .await;
        drop(gateway);

        let restarted = Gateway::builder(config(root.path(), store.path()))
            .clock(clock)
            .build();
        let response = restarted
            .handle(&tinker("$items->sum()"), Some("cli"))
            .await;
        assert_eq!(response.result.as_deref(), Some(">>> $items->sum()\n=> 6"));
    }

    #[tokio::test]
    async fn test_callers_are_isolated() {
        let root = tempfile::tempdir().expect("root");
        let store = tempfile::tempdir().expect("store");
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let gateway = Gateway::builder(config(root.path(), store.path()))
            .clock(clock)
            .build();

        gateway.handle(&tinker("$secret = 'a'"), Some("alice")).await;
        let response = gateway.handle(&tinker("vars"), Some("bob")).await;
        assert_eq!(response.result.as_deref(), Some("No variables stored yet."));
    }

    #[tokio::test]
    async fn test_variables_expire_after_ttl() {
        let root = tempfile::tempdir().expect("root");
        let store = tempfile::tempdir().expect("store");
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .expect("valid date");
        let clock = Arc::new(ManualClock::new(start));
        let config = TerminalConfig {
            session_window: Duration::from_secs(24 * 60 * 60),
            variable_ttl: Duration::from_secs(60 * 60),
            ..config(root.path(), store.path())
        };
        let gateway = Gateway::builder(config).clock(clock.clone()).build();

        gateway.handle(&tinker("$x = 42"), None).await;

        clock.advance(Duration::from_secs(59 * 60));
        let alive = gateway.handle(&tinker("$x"), None).await;
        assert_eq!(alive.result.as_deref(), Some(">>> $x\n=> 42"));

        clock.advance(Duration::from_secs(2 * 60));
        let expired = gateway.handle(&tinker("$x"), None).await;
        assert_eq!(
            expired.result.as_deref(),
            Some(">>> $x\nErrorException: Undefined variable $x")
        );
    }

    #[tokio::test]
    async fn test_clear_removes_variables() {
        let root = tempfile::tempdir().expect("root");
        let store = tempfile::tempdir().expect("store");
        let gateway = Gateway::from_config(config(root.path(), store.path()));

        gateway.handle(&tinker("$x = 1"), None).await;
        let cleared = gateway.handle(&tinker("clear"), None).await;
        assert_eq!(cleared.result.as_deref(), Some("Variables cleared!"));

        let vars = gateway.handle(&tinker("vars"), None).await;
        assert_eq!(vars.result.as_deref(), Some("No variables stored yet."));
    }
}

// =============================================================================
// Error Containment Tests
// =============================================================================

mod errors {
    use super::*;

    #[tokio::test]
    async fn test_evaluation_error_is_a_transcript() {
        let root = tempfile::tempdir().expect("root");
        let store = tempfile::tempdir().expect("store");
        let gateway = Gateway::from_config(config(root.path(), store.path()));

        let response = gateway.handle(&tinker("$y = nope()"), None).await;
        assert!(response.is_success(), "REPL errors are not envelope errors");
        assert_eq!(
            response.result.as_deref(),
            Some(">>> $y = nope()\nError: Call to undefined function nope()")
        );

        let vars = gateway.handle(&tinker("vars"), None).await;
        assert_eq!(vars.result.as_deref(), Some("No variables stored yet."));
    }

    #[tokio::test]
    async fn test_division_by_zero() {
        let root = tempfile::tempdir().expect("root");
        let store = tempfile::tempdir().expect("store");
        let gateway = Gateway::from_config(config(root.path(), store.path()));

        let response = gateway.handle(&tinker("1 / 0"), None).await;
        assert_eq!(
            response.result.as_deref(),
            Some(">>> 1 / 0\nDivisionByZeroError: Division by zero")
        );
    }

    #[tokio::test]
    async fn test_undefined_console_command_is_internal_error() {
        let root = tempfile::tempdir().expect("root");
        let store = tempfile::tempdir().expect("store");
        let gateway = Gateway::builder(config(root.path(), store.path()))
            .dispatcher(Arc::new(CommandTable::new()))
            .build();

        let response = gateway
            .handle(&RpcRequest::new("artisan", vec!["make:thing".into()]), None)
            .await;
        let error = response.error.expect("error envelope");
        assert_eq!(error.code, INTERNAL_ERROR);
        assert!(error.data.unwrap_or_default().contains("make:thing"));
    }
}

// =============================================================================
// Routing Tests
// =============================================================================

mod routing {
    use super::*;

    #[tokio::test]
    async fn test_console_method_lists_commands() {
        let root = tempfile::tempdir().expect("root");
        let store = tempfile::tempdir().expect("store");
        let table = CommandTable::new().register("about", "Show details", |_, t| {
            t.line("webterm test app");
            Ok(0)
        });
        let gateway = Gateway::builder(config(root.path(), store.path()))
            .dispatcher(Arc::new(table))
            .build();

        let listed = gateway.handle(&RpcRequest::new("artisan", vec![]), None).await;
        let text = listed.result.expect("success");
        assert!(text.starts_with("Available commands:"));
        assert!(text.contains("about"));

        let about = gateway.handle(&RpcRequest::new("about", vec![]), None).await;
        assert_eq!(about.result.as_deref(), Some("webterm test app"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_console_program_exit_code_is_reported() {
        let root = tempfile::tempdir().expect("root");
        let store = tempfile::tempdir().expect("store");
        let config = TerminalConfig {
            console: ConsoleConfig {
                program: vec!["sh".into(), "-c".into(), "echo partial; exit 3".into()],
            },
            ..config(root.path(), store.path())
        };
        let gateway = Gateway::from_config(config);

        let response = gateway
            .handle(&RpcRequest::new("artisan", vec!["about".into()]).with_id(3), None)
            .await;
        let error = response.error.expect("error envelope");
        assert_eq!(error.code, INVALID_REQUEST);
        assert_eq!(
            error.data.as_deref(),
            Some("partial\nCommand exited with code: 3")
        );

        let result = gateway
            .call("about", &[], None)
            .await
            .expect("dispatched");
        assert_eq!(result.exit_code, 3);
    }

    #[tokio::test]
    async fn test_missing_tool_is_invalid_request_with_remediation() {
        let root = tempfile::tempdir().expect("root");
        let store = tempfile::tempdir().expect("store");
        let tool = ToolConfig {
            name: "webterm-missing-tool".to_string(),
            common_paths: vec![],
            auto_install: false,
            ..ToolConfig::default()
        };
        let locator = ToolLocator::new(tool.clone(), root.path()).with_search_path(vec![]);
        let gateway = Gateway::builder(config(root.path(), store.path()))
            .tools(ToolRunner::new(&tool, root.path()).with_locator(locator))
            .build();

        let response = gateway
            .handle(&RpcRequest::new("composer", vec!["show".into()]), None)
            .await;
        let error = response.error.expect("error envelope");
        assert_eq!(error.code, INVALID_REQUEST);
        let data = error.data.unwrap_or_default();
        assert!(data.starts_with("webterm-missing-tool not found"));
        assert!(data.contains("For Local Development:"));
    }
}
