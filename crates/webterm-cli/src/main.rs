//! Webterm CLI
//!
//! Usage:
//!   webterm run <method> [params...]   Run one request and print its transcript
//!   webterm rpc                        Serve JSON-RPC requests, one per stdin line
//!
//! Logs go to stderr so stdout carries only transcripts and responses.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use webterm::gateway::PARSE_ERROR;
use webterm::{Gateway, RpcRequest, RpcResponse, StoreConfig, TerminalConfig, Transcript};

/// Webterm - execution gateway for web terminals
#[derive(Parser, Debug)]
#[command(name = "webterm")]
#[command(about = "Run console, REPL and package tool commands for a web terminal")]
struct Args {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory commands run in
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,

    /// Caller identity the REPL session is derived from
    #[arg(long, global = true)]
    identity: Option<String>,

    /// Keep REPL variables in this directory between invocations
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one request and print its transcript
    Run {
        /// tinker, composer, artisan, or a console verb
        method: String,
        /// Request parameters
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        params: Vec<String>,
    },
    /// Serve JSON-RPC requests, one per stdin line
    Rpc,
}

impl Args {
    fn terminal_config(&self) -> anyhow::Result<TerminalConfig> {
        let mut config = match &self.config {
            Some(path) => TerminalConfig::from_file(path)?,
            None => TerminalConfig::default(),
        };
        if let Some(root) = &self.project_root {
            config.project_root = root.clone();
        }
        if let Some(dir) = &self.store_dir {
            config.store = StoreConfig::File { dir: dir.clone() };
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Stderr only; stdout is the protocol channel
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let gateway = Gateway::from_config(args.terminal_config()?);
    let identity = args.identity.as_deref();

    match args.command {
        Command::Run { method, params } => {
            let code = run(&gateway, &method, &params, identity).await?;
            std::process::exit(code);
        }
        Command::Rpc => serve(&gateway, identity).await,
    }
}

/// Run one request, printing transcript lines as they are produced.
async fn run(
    gateway: &Gateway,
    method: &str,
    params: &[String],
    identity: Option<&str>,
) -> anyhow::Result<i32> {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let outcome = gateway
        .call_with(method, params, identity, Transcript::with_listener(tx))
        .await;
    printer
        .await
        .context("output task failed")?
        .context("failed to write to stdout")?;

    match outcome {
        Ok(result) => Ok(result.exit_code),
        Err(e) => {
            eprintln!("webterm: {}", e);
            Ok(1)
        }
    }
}

/// Answer JSON-RPC requests read from stdin until EOF.
async fn serve(gateway: &Gateway, identity: Option<&str>) -> anyhow::Result<()> {
    tracing::info!("serving JSON-RPC on stdio");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => gateway.handle(&request, identity).await,
            Err(e) => RpcResponse::failure(
                &RpcRequest::default(),
                PARSE_ERROR,
                "Parse error",
                e.to_string(),
            ),
        };

        let mut text = serde_json::to_string(&response)?;
        text.push('\n');
        stdout.write_all(text.as_bytes()).await?;
        stdout.flush().await?;
    }

    tracing::info!("stdin closed, shutting down");
    Ok(())
}
