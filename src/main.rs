//! snippet-gate command-line entry point.

use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use snippet_gate::config::GatewayConfig;
use snippet_gate::gateway::{Gateway, Submission};
use snippet_gate::normalize::ExecutionResult;
use snippet_gate::validator::ValidationResult;

/// Validation and execution dispatch gateway for learner code snippets.
#[derive(Debug, Parser)]
#[command(name = "snippet-gate", version, about)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate and execute one snippet, printing the result as JSON.
    Run(SnippetArgs),
    /// Validate one snippet without executing it.
    Check(SnippetArgs),
    /// Probe the sandbox health endpoint.
    Health,
    /// List supported languages.
    Languages,
    /// Serve JSON-lines requests from stdin until EOF or Ctrl-C.
    Serve {
        /// Also write JSON logs to this directory (daily rotation).
        #[arg(long)]
        logs_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct SnippetArgs {
    /// Language key (e.g. python, cpp, javascript).
    #[arg(long, short)]
    language: String,
    /// Source text inline.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    code: Option<String>,
    /// Read source text from a file.
    #[arg(long)]
    file: Option<PathBuf>,
}

impl SnippetArgs {
    fn source(&self) -> Result<String> {
        match (&self.code, &self.file) {
            (Some(code), _) => Ok(code.clone()),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display())),
            (None, None) => anyhow::bail!("either --code or --file is required"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let config = GatewayConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    let _guard = match &cli.command {
        Command::Serve {
            logs_dir: Some(dir),
        } => Some(snippet_gate::logging::init_service(dir, &config.logging.level)?),
        _ => {
            snippet_gate::logging::init_console(&config.logging.level);
            None
        }
    };

    match cli.command {
        Command::Languages => {
            let registry = snippet_gate::build_registry(&config)?;
            for language in registry.languages() {
                let rules = registry.rules_for(language.as_str()).map_or(0, |rules| rules.len());
                println!("{language}\t{rules} rules");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Check(args) => {
            let registry = Arc::new(snippet_gate::build_registry(&config)?);
            let validator = snippet_gate::validator::Validator::new(registry);
            match validator.check(&args.language, &args.source()?)? {
                ValidationResult::Valid => {
                    println!("ok");
                    Ok(ExitCode::SUCCESS)
                }
                ValidationResult::Blocked(rule) => {
                    println!("blocked: {}", rule.message());
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Run(args) => {
            let gateway = snippet_gate::build_gateway(&config)?;
            let submission = Submission::new(args.language.clone(), args.source()?);
            let result = gateway.submit(submission).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(exit_code(&result))
        }
        Command::Health => {
            let gateway = snippet_gate::build_gateway(&config)?;
            let status = gateway.health().await;
            println!("{}", status.details());
            Ok(if status.is_healthy() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Serve { .. } => {
            let gateway = Arc::new(snippet_gate::build_gateway(&config)?);
            serve(gateway).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_code(result: &ExecutionResult) -> ExitCode {
    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// One JSON-lines request.
#[derive(Debug, Deserialize)]
struct ServeRequest {
    #[serde(default)]
    id: Option<Value>,
    #[serde(flatten)]
    submission: Submission,
}

/// One JSON-lines response.
#[derive(Debug, Serialize)]
struct ServeResponse {
    id: Option<Value>,
    #[serde(flatten)]
    result: ExecutionResult,
}

/// Read requests from stdin, run each as its own task, write responses in
/// completion order.
///
/// EOF drains in-flight requests; Ctrl-C aborts them without replying.
async fn serve(gateway: Arc<Gateway>) -> Result<()> {
    info!("serving JSON-lines requests on stdin");

    let (out_tx, out_rx) = mpsc::channel::<String>(64);
    let writer = tokio::spawn(write_lines(out_rx));

    let mut lines = spawn_stdin_reader();
    let mut tasks = JoinSet::new();
    let mut interrupted = false;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else {
                    break;
                };
                let line = line.context("failed to read stdin")?;
                if line.trim().is_empty() {
                    continue;
                }
                let gateway = Arc::clone(&gateway);
                let out_tx = out_tx.clone();
                tasks.spawn(async move {
                    let reply = handle_line(&gateway, &line).await;
                    if out_tx.send(reply).await.is_err() {
                        warn!("response writer closed, dropping reply");
                    }
                });
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "request task failed");
                }
            }
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for shutdown signal");
                }
                info!(in_flight = tasks.len(), "received shutdown signal, cancelling in-flight requests");
                interrupted = true;
                break;
            }
        }
    }

    if interrupted {
        tasks.shutdown().await;
    } else {
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "request task failed");
            }
        }
    }

    drop(out_tx);
    writer.await.context("response writer panicked")??;
    info!(interrupted, "serve loop finished");
    Ok(())
}

/// Forward stdin lines from a detached thread.
///
/// A blocked stdin read must not keep the runtime from shutting down after
/// Ctrl-C, so the read stays off the runtime's blocking pool.
fn spawn_stdin_reader() -> mpsc::Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel(64);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}

async fn handle_line(gateway: &Gateway, line: &str) -> String {
    let reply = match serde_json::from_str::<ServeRequest>(line) {
        Ok(request) => {
            let result = gateway.submit(request.submission).await;
            serde_json::to_value(ServeResponse {
                id: request.id,
                result,
            })
        }
        Err(e) => Ok(serde_json::json!({
            "id": null,
            "success": false,
            "output": "",
            "error": format!("invalid request: {e}"),
        })),
    };
    match reply {
        Ok(value) => value.to_string(),
        Err(e) => {
            warn!(error = %e, "failed to encode response");
            r#"{"id":null,"success":false,"output":"","error":"internal error"}"#.to_owned()
        }
    }
}

async fn write_lines(mut rx: mpsc::Receiver<String>) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(line) = rx.recv().await {
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}
