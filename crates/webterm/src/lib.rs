//! Webterm: execution gateway for browser-hosted terminals
//!
//! Webterm takes command text typed into a web terminal and runs it safely
//! against a host application. It covers three routes:
//!
//! - **Console commands** are normalized (quote stripping, namespace and
//!   quote repair, required flags), checked against an allow/deny policy and
//!   handed to a pluggable [`CommandDispatcher`].
//! - **REPL code** is evaluated by a sandboxed interpreter. Variables assigned
//!   in one request are persisted per caller session and replayed into the
//!   next, so a stateless request/response transport behaves like a REPL.
//! - **Package tool commands** locate (or install) an external tool and run
//!   it in the project root, streaming output line by line for long
//!   operations.
//!
//! [`Gateway`] is the single entry point; it turns every outcome into a
//! transcript or a JSON-RPC error envelope.
//!
//! ## Example
//!
//! ```rust,no_run
//! use webterm::{Gateway, RpcRequest, TerminalConfig};
//!
//! # async fn demo() {
//! let gateway = Gateway::from_config(TerminalConfig::default());
//! let request = RpcRequest::new("tinker", vec!["$x = 40 + 2".to_string()]);
//! let response = gateway.handle(&request, Some("10.0.0.1")).await;
//! assert_eq!(response.result.as_deref(), Some(">>> $x = 40 + 2\n=> 42"));
//! # }
//! ```

mod error;

pub mod config;
pub mod dispatch;
pub mod evaluator;
pub mod gateway;
pub mod limits;
pub mod normalize;
pub mod policy;
pub mod process;
pub mod script;
pub mod session;
pub mod store;
pub mod transcript;

pub use config::{ConfigError, ConsoleConfig, StoreConfig, TerminalConfig, ToolConfig};
pub use dispatch::{CommandDispatcher, CommandTable, ProcessDispatcher};
pub use error::Error;
pub use evaluator::Evaluator;
pub use gateway::{Gateway, GatewayBuilder, RpcError, RpcRequest, RpcResponse};
pub use limits::TRUNCATION_MARKER;
pub use normalize::{NormalizedCommand, Normalizer};
pub use policy::{PolicyDecision, PolicyHandler};
pub use session::{Clock, ManualClock, SessionKey, SystemClock};
pub use store::VariableStore;
pub use transcript::{ExecutionResult, ExecutionStats, Transcript};
