//! Execution gateway.
//!
//! The single entry point for terminal requests. A request is a method name
//! plus string parameters. The method is checked against the endpoint policy
//! first; a denied or empty method never reaches anything that could run.
//! Allowed requests are routed:
//!
//! | method | route |
//! |---|---|
//! | `tinker` | REPL evaluation; the first parameter is the code |
//! | `composer` | external package tool; parameters form its command |
//! | `artisan` | host console; parameters form the command line |
//! | anything else | host console; the method is the verb |
//!
//! Console commands are normalized and checked against the console policy
//! before they are dispatched. Every outcome becomes either a transcript or a
//! JSON-RPC error envelope; no error escapes [`Gateway::handle`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::TerminalConfig;
use crate::dispatch::{CommandDispatcher, ProcessDispatcher};
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::normalize::{Normalizer, escape_arg, verb_of};
use crate::policy::{PolicyDecision, PolicyHandler, console_policy, endpoint_policy};
use crate::process::ToolRunner;
use crate::script::{Sandbox, ScriptBackend};
use crate::session::{Clock, SessionKey, SystemClock};
use crate::store::VariableStore;
use crate::transcript::{ExecutionResult, ExecutionStats, Transcript};

/// JSON-RPC code for a request line that is not valid JSON.
pub const PARSE_ERROR: i64 = -32700;

/// JSON-RPC code for requests that fail validation or exit non-zero.
pub const INVALID_REQUEST: i64 = -32600;

/// JSON-RPC code for failures while executing.
pub const INTERNAL_ERROR: i64 = -32603;

/// Method routed to the REPL evaluator.
pub const REPL_METHOD: &str = "tinker";

/// Method routed to the external package tool.
pub const TOOL_METHOD: &str = "composer";

/// Method whose parameters form a console command line.
pub const CONSOLE_METHOD: &str = "artisan";

/// A JSON-RPC request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Protocol version, echoed back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    /// Correlation id, echoed back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    /// Method name.
    #[serde(default)]
    pub method: String,
    /// Positional string parameters.
    #[serde(default)]
    pub params: Vec<String>,
}

impl RpcRequest {
    /// Build a request without an id.
    pub fn new(method: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            jsonrpc: Some("2.0".to_string()),
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Attach a correlation id.
    pub fn with_id(mut self, id: impl Into<serde_json::Value>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Error member of an [`RpcResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// [`INVALID_REQUEST`] or [`INTERNAL_ERROR`].
    pub code: i64,
    /// Short message.
    pub message: String,
    /// Transcript or error detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// A JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Protocol version.
    pub jsonrpc: String,
    /// Correlation id from the request.
    pub id: Option<serde_json::Value>,
    /// Transcript, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Error, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    fn envelope(request: &RpcRequest) -> Self {
        Self {
            jsonrpc: request.jsonrpc.clone().unwrap_or_else(|| "2.0".to_string()),
            id: request.id.clone(),
            result: None,
            error: None,
        }
    }

    /// A success envelope for `request`.
    pub fn success(request: &RpcRequest, result: String) -> Self {
        Self {
            result: Some(result),
            ..Self::envelope(request)
        }
    }

    /// An error envelope for `request`.
    pub fn failure(request: &RpcRequest, code: i64, message: &str, data: String) -> Self {
        Self {
            error: Some(RpcError {
                code,
                message: message.to_string(),
                data: Some(data),
            }),
            ..Self::envelope(request)
        }
    }

    /// Whether this is a success envelope.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Quote a parameter for a command line, leaving plain tokens bare.
///
/// Keeping plain tokens bare keeps the verb recognizable to policy and flag
/// rules; anything with spaces, quotes or shell syntax is single-quoted.
fn quote_param(param: &str) -> String {
    let plain = !param.is_empty()
        && param
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if plain {
        param.to_string()
    } else {
        escape_arg(param)
    }
}

fn command_line<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(quote_param)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Routes terminal requests.
#[derive(Clone)]
pub struct Gateway {
    normalizer: Normalizer,
    endpoint_policy: Arc<dyn PolicyHandler>,
    console_policy: Arc<dyn PolicyHandler>,
    evaluator: Evaluator,
    dispatcher: Arc<dyn CommandDispatcher>,
    tools: ToolRunner,
    clock: Arc<dyn Clock>,
    session_window: Duration,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("evaluator", &self.evaluator)
            .field("dispatcher", &self.dispatcher)
            .field("session_window", &self.session_window)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Start building a gateway from `config`.
    pub fn builder(config: TerminalConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// A gateway with every default collaborator for `config`.
    pub fn from_config(config: TerminalConfig) -> Self {
        GatewayBuilder::new(config).build()
    }

    /// The REPL evaluator.
    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Handle a JSON-RPC request from the caller at `identity`.
    pub async fn handle(&self, request: &RpcRequest, identity: Option<&str>) -> RpcResponse {
        self.handle_with(request, identity, Transcript::new()).await
    }

    /// Like [`Gateway::handle`], writing lines to `transcript` as they are produced.
    pub async fn handle_with(
        &self,
        request: &RpcRequest,
        identity: Option<&str>,
        transcript: Transcript,
    ) -> RpcResponse {
        let outcome = self
            .call_with(&request.method, &request.params, identity, transcript)
            .await;
        match outcome {
            Ok(result) if result.success() || verb_of(&request.method) == REPL_METHOD => {
                RpcResponse::success(request, result.text())
            }
            Ok(result) => {
                RpcResponse::failure(request, INVALID_REQUEST, "Invalid Request", result.text())
            }
            Err(e) if e.is_validation() => {
                RpcResponse::failure(request, INVALID_REQUEST, "Invalid Request", e.to_string())
            }
            Err(e) => RpcResponse::failure(request, INTERNAL_ERROR, "Internal Error", e.to_string()),
        }
    }

    /// Validate and run `method` with `params`.
    pub async fn call(
        &self,
        method: &str,
        params: &[String],
        identity: Option<&str>,
    ) -> Result<ExecutionResult, Error> {
        self.call_with(method, params, identity, Transcript::new())
            .await
    }

    /// Like [`Gateway::call`], writing lines to `transcript` as they are produced.
    pub async fn call_with(
        &self,
        method: &str,
        params: &[String],
        identity: Option<&str>,
        mut transcript: Transcript,
    ) -> Result<ExecutionResult, Error> {
        let method = method.trim();
        if method.is_empty() {
            return Err(Error::InvalidRequest("method is required".to_string()));
        }
        let verb = verb_of(method);
        if let PolicyDecision::Deny(reason) = self.endpoint_policy.check_verb(&verb) {
            info!(%verb, %reason, "request denied");
            return Err(Error::CommandDenied { verb, reason });
        }

        let start = Instant::now();
        let params: Vec<&str> = params.iter().map(String::as_str).collect();
        let mut value = None;
        let mut truncated = false;

        let exit_code = match verb.as_str() {
            REPL_METHOD => {
                let code = self
                    .normalizer
                    .normalize_code(params.first().copied().unwrap_or_default());
                let session = SessionKey::for_caller(identity, self.clock.now(), self.session_window);
                let result = self.evaluator.evaluate(&code, &session).await;
                for line in &result.output {
                    transcript.line(line.as_str());
                }
                value = result.value;
                truncated = result.truncated;
                result.exit_code
            }
            TOOL_METHOD => {
                let command = command_line(params);
                self.tools.execute(&command, &mut transcript).await
            }
            CONSOLE_METHOD => self.console(&command_line(params), &mut transcript).await?,
            _ => {
                let line = command_line(std::iter::once(method).chain(params));
                self.console(&line, &mut transcript).await?
            }
        };

        debug!(%verb, exit_code, "request finished");
        let mut result = ExecutionResult::from_transcript(exit_code, transcript);
        result.value = value;
        result.truncated = truncated;
        result.stats = ExecutionStats {
            wall_time_ms: start.elapsed().as_millis() as u64,
        };
        Ok(result)
    }

    async fn console(&self, line: &str, transcript: &mut Transcript) -> Result<i32, Error> {
        let command = self.normalizer.normalize(line);
        match self.normalizer.validate(&command, &*self.console_policy) {
            Ok(()) => self.dispatcher.dispatch(&command, transcript).await,
            Err(Error::CommandDenied { verb, reason }) => {
                transcript.line(format!(
                    "Command \"{}\" is not supported in web terminal.",
                    verb
                ));
                transcript.line(format!("Reason: {}", reason));
                Ok(1)
            }
            Err(e) => Err(e),
        }
    }
}

/// Builder for [`Gateway`]. Unset collaborators are derived from the config.
pub struct GatewayBuilder {
    config: TerminalConfig,
    clock: Option<Arc<dyn Clock>>,
    backend: Option<Arc<dyn ScriptBackend>>,
    store: Option<VariableStore>,
    dispatcher: Option<Arc<dyn CommandDispatcher>>,
    tools: Option<ToolRunner>,
    normalizer: Option<Normalizer>,
}

impl fmt::Debug for GatewayBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GatewayBuilder {
    /// Start from `config`.
    pub fn new(config: TerminalConfig) -> Self {
        Self {
            config,
            clock: None,
            backend: None,
            store: None,
            dispatcher: None,
            tools: None,
            normalizer: None,
        }
    }

    /// Clock used for session keys, the store and `date()`.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Scripting backend; defaults to a [`Sandbox`].
    pub fn backend(mut self, backend: Arc<dyn ScriptBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Variable store; defaults to the one `config.store` describes.
    pub fn store(mut self, store: VariableStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Console dispatcher; defaults to a [`ProcessDispatcher`] for `config.console`.
    pub fn dispatcher(mut self, dispatcher: Arc<dyn CommandDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Package tool runner; defaults to one built from `config.tool`.
    pub fn tools(mut self, tools: ToolRunner) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Command normalizer; defaults to [`Normalizer::default`].
    pub fn normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Assemble the gateway.
    pub fn build(self) -> Gateway {
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self
            .store
            .unwrap_or_else(|| VariableStore::from_config(&config, clock.clone()));
        let backend = self.backend.unwrap_or_else(|| {
            Arc::new(
                Sandbox::new()
                    .with_config(config.config_values.clone())
                    .with_clock(clock.clone()),
            )
        });
        let dispatcher = self.dispatcher.unwrap_or_else(|| {
            Arc::new(ProcessDispatcher::new(
                config.console.program.clone(),
                config.project_root.clone(),
            ))
        });
        let tools = self
            .tools
            .unwrap_or_else(|| ToolRunner::new(&config.tool, config.project_root.clone()));

        Gateway {
            normalizer: self.normalizer.unwrap_or_default(),
            endpoint_policy: Arc::new(endpoint_policy()),
            console_policy: Arc::new(console_policy()),
            evaluator: Evaluator::new(backend, store).with_max_output_bytes(config.max_output_bytes),
            dispatcher,
            tools,
            clock,
            session_window: config.session_window,
        }
    }
}
