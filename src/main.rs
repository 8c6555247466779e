#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # bsctl
//!
//! Command-line front end for the backup server integration layer. Every
//! subcommand prints pretty JSON on stdout; logs go to stderr.
//!
//! ## Subcommands
//!
//! - `bsctl session` — acquire (or reuse) a session and report its lifetime
//! - `bsctl call <action> [key=value ...]` — run one control-API action
//! - `bsctl activity [--snapshot jobs.json]` — reconciled running activity
//! - `bsctl status` — online and backup-health status per client

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use bsctl::clients::{classify_all, ClientRecord};
use bsctl::config::ConfigError;
use bsctl::store::{JobStore, SnapshotStore, StoreError};
use bsctl::transport::TransportError;
use bsctl::{ApiError, AppState, Config};

/// Backup server control-API client.
#[derive(Parser)]
#[command(name = "bsctl", version)]
struct Cli {
    /// Path to TOML config file.
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire or reuse an authenticated session.
    Session,
    /// Run one control-API action with `key=value` parameters.
    Call {
        action: String,
        params: Vec<String>,
    },
    /// List running backups from the job snapshot, live progress and log tail.
    Activity {
        /// JSON export of the client and job tables.
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Classify every client reported by the server.
    Status,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
    #[error("invalid parameter '{0}', expected key=value")]
    Param(String),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("bsctl: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .init();

    info!("bsctl v{} targeting {}", env!("CARGO_PKG_VERSION"), config.server.url);
    if config.server.password.is_empty() {
        warn!("No password configured — set BSCTL_PASSWORD or update config");
    }

    let store: Arc<dyn JobStore> = match &cli.command {
        Commands::Activity {
            snapshot: Some(path),
        } => Arc::new(SnapshotStore::from_file(path)?),
        _ => Arc::new(SnapshotStore::default()),
    };
    let state = AppState::new(config, store)?;

    match cli.command {
        Commands::Session => {
            let session = state.sessions.ensure_session().await?;
            let remaining = session
                .expires_at
                .saturating_duration_since(tokio::time::Instant::now());
            print_json(&json!({
                "authenticated": true,
                "expires_in_secs": remaining.as_secs(),
            }))
        }
        Commands::Call { action, params } => {
            let pairs = parse_params(&params)?;
            let borrowed: Vec<(&str, &str)> =
                pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            let value = state.gateway.call(&action, &borrowed).await?;
            print_json(&value)
        }
        Commands::Activity { .. } => {
            let activities = state.reconciler.current_activities().await?;
            print_json(&activities)
        }
        Commands::Status => {
            let entries = state.gateway.status().await?;
            let clients: Vec<ClientRecord> =
                entries.iter().map(ClientRecord::from_status_entry).collect();
            let statuses = classify_all(
                &clients,
                &entries,
                chrono::Utc::now(),
                state.config.status.online_window_secs,
            );
            print_json(&statuses)
        }
    }
}

/// Split `key=value` arguments. The value may itself contain `=`.
fn parse_params(params: &[String]) -> Result<Vec<(String, String)>, CliError> {
    params
        .iter()
        .map(|p| {
            p.split_once('=')
                .filter(|(k, _)| !k.is_empty())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| CliError::Param(p.clone()))
        })
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params() {
        let pairs = parse_params(&["sa=general".into(), "filter=a=b".into()]).unwrap();
        assert_eq!(pairs[0], ("sa".to_string(), "general".to_string()));
        assert_eq!(pairs[1], ("filter".to_string(), "a=b".to_string()));
    }

    #[test]
    fn test_parse_params_rejects_bare_words() {
        assert!(matches!(
            parse_params(&["general".into()]),
            Err(CliError::Param(_))
        ));
        assert!(parse_params(&["=x".into()]).is_err());
    }

    #[test]
    fn test_cli_parses_call() {
        let cli = Cli::try_parse_from(["bsctl", "call", "settings", "sa=general"]).unwrap();
        match cli.command {
            Commands::Call { action, params } => {
                assert_eq!(action, "settings");
                assert_eq!(params, vec!["sa=general"]);
            }
            _ => panic!("expected call"),
        }
    }
}
