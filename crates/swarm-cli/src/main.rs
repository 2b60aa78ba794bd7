//! `swarm`: run coordination commands against a local swarm store.
//!
//! Commands are JSON objects tagged by `op`, executed either one at a time
//! (`swarm exec`) or as a line-delimited request loop (`swarm stdio`).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use swarm_collective::{Collective, Command, ErrorKind};
use swarm_config::{LogFormat, LoggingConfig, SwarmConfig};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "swarm")]
#[command(about = "Coordinate a swarm of agents: consensus, conflicts, profiles, proofs and patterns")]
#[command(version)]
struct Cli {
    /// Configuration file (default: $SWARM_CONFIG, then the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Record store directory, overriding `storage.root`
    #[arg(long = "data-dir", global = true)]
    data_dir: Option<PathBuf>,

    /// Log level, overriding `logging.level` (RUST_LOG wins over both)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one JSON command, read from the argument or stdin
    Exec {
        /// e.g. '{"op": "active_intents"}'
        request: Option<String>,
    },
    /// Answer one JSON command per input line with one JSON response line
    Stdio,
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = SwarmConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(dir) = cli.data_dir {
        config.storage.root = Some(dir);
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging);

    if let Commands::Config = cli.command {
        print!("{}", config.to_toml().context("failed to render configuration")?);
        return Ok(ExitCode::SUCCESS);
    }

    let collective = Collective::open(&config).context("failed to open swarm store")?;
    info!("Swarm store ready at {}", config.storage_root().display());

    match cli.command {
        Commands::Exec { request } => {
            let request = match request {
                Some(request) => request,
                None => {
                    let mut buffer = String::new();
                    tokio::io::stdin()
                        .read_to_string(&mut buffer)
                        .await
                        .context("failed to read request from stdin")?;
                    buffer
                }
            };
            let response = handle(&collective, &request).await;
            let ok = response["ok"].as_bool().unwrap_or(false);
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Commands::Stdio => {
            serve_stdio(&collective).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config => Ok(ExitCode::SUCCESS),
    }
}

/// Logs go to stderr; stdout carries responses only.
fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match config.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn serve_stdio(collective: &Collective) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    info!("Serving requests on stdio");

    while let Some(line) = lines.next_line().await.context("failed to read request")? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle(collective, &line).await;
        let mut encoded = serde_json::to_string(&response)?;
        encoded.push('\n');
        stdout.write_all(encoded.as_bytes()).await?;
        stdout.flush().await?;
    }
    debug!("stdin closed");
    Ok(())
}

async fn handle(collective: &Collective, request: &str) -> Value {
    let command: Command = match serde_json::from_str(request) {
        Ok(command) => command,
        Err(e) => return failure(ErrorKind::InvalidArgument, &format!("malformed request: {}", e)),
    };
    respond(collective.execute(command).await)
}

fn respond(result: swarm_collective::Result<Value>) -> Value {
    match result {
        Ok(result) => json!({ "ok": true, "result": result }),
        Err(e) => {
            if e.kind() == ErrorKind::Internal {
                error!("Command failed: {}", e);
            }
            failure(e.kind(), &e.to_string())
        }
    }
}

fn failure(kind: ErrorKind, message: &str) -> Value {
    json!({ "ok": false, "error": { "kind": kind, "message": message } })
}
