//! rate-dispatch - send one rate-limited API call from the command line
//!
//! Configuration comes from `--config` or from `RATE_DISPATCH_*` environment
//! variables (a `.env` file is honoured).

#![allow(missing_docs)]

use clap::Parser;
use rate_dispatch::utils::logging::init_logging;
use rate_dispatch::{DispatchError, DispatchOptions, Dispatcher, DispatcherConfig, Method};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error};

const LONG_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

#[derive(Debug, Parser)]
#[command(name = "rate-dispatch", version, long_version = LONG_VERSION, about)]
struct Cli {
    /// YAML configuration file; environment variables are used when absent
    #[arg(short, long, env = "RATE_DISPATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Default log level when RATE_DISPATCH_LOG and RUST_LOG are unset
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// HTTP method, e.g. GET
    method: String,

    /// Endpoint path relative to the base URL
    path: String,

    /// Query parameter as key=value; may be repeated
    #[arg(short, long = "query", value_parser = parse_query_pair)]
    query: Vec<(String, String)>,

    /// JSON request body
    #[arg(short, long)]
    body: Option<String>,
}

fn parse_query_pair(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level, cli.json_logs) {
        eprintln!("Error: {}", e);
        return ExitCode::from(2);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(kind = e.kind().as_str(), "dispatch failed");
            eprintln!("Error [{}]: {}", e.kind().as_str(), e);
            if let Some(retry_after) = e.retry_after() {
                eprintln!("Retry after: {:.1}s", retry_after.as_secs_f64());
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> rate_dispatch::Result<()> {
    let config = match &cli.config {
        Some(path) => DispatcherConfig::from_file(path).await?,
        None => DispatcherConfig::from_env()?,
    };

    let method = Method::from_bytes(cli.method.to_ascii_uppercase().as_bytes()).map_err(|_| {
        DispatchError::invalid_config(format!("Invalid HTTP method '{}'", cli.method))
    })?;

    let mut options = DispatchOptions::new();
    for (key, value) in cli.query {
        options = options.query(key, value);
    }
    if let Some(body) = &cli.body {
        let body = serde_json::from_str(body).map_err(|e| {
            DispatchError::invalid_config(format!("Request body is not valid JSON: {}", e))
        })?;
        options = options.body(body);
    }

    let dispatcher = Dispatcher::from_config(config)?;
    debug!(group = dispatcher.classifier().classify(&cli.path), "dispatching");

    let result = dispatcher.dispatch(method, &cli.path, options).await;
    dispatcher.shutdown().await;
    let response = result?;

    let rendered = serde_json::to_string_pretty(&response.data).map_err(|e| {
        DispatchError::invalid_config(format!("Failed to render response: {}", e))
    })?;
    println!("{}", rendered);
    Ok(())
}
