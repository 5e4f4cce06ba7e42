//! `plugsyncd` - plugin acquisition and install reconciliation for one node.
//!
//! A thin entry point over the plugsync crates. It loads the layered
//! configuration, sets up logging, indexes the plugin cache, starts the
//! metadata sweeper and runs one subcommand:
//!
//! - `meta <id> [version]` resolves metadata through the provider chain
//! - `acquire` downloads and loads every `preinstall` entry
//! - `sync` registers `preinstall` entries as install records and
//!   reconciles them, children included

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod commands;
mod registry;
mod wiring;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use plugsync_config::Config;
use plugsync_telemetry::LogConfig;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::commands::Runtime;
use crate::registry::NodeRegistry;

/// Plugsync daemon - plugin acquisition for one node.
#[derive(Parser)]
#[command(name = "plugsyncd")]
#[command(
    author,
    version,
    about = "Plugsync daemon - plugin metadata, acquisition and install reconciliation"
)]
struct Args {
    /// Configuration file, layered over user and system config.
    #[arg(short, long, global = true, env = "PLUGSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Override `node.name`.
    #[arg(long, global = true)]
    node_name: Option<String>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve plugin metadata through the provider chain.
    Meta {
        /// Plugin ID.
        id: String,
        /// Version; latest when omitted.
        version: Option<String>,
    },
    /// Download and load every `preinstall` entry.
    Acquire,
    /// Register `preinstall` entries as install records and reconcile them.
    Sync,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(name) = args.node_name {
        if name.trim().is_empty() {
            bail!("--node-name must not be empty");
        }
        config.node.name = name;
    }

    let mut log_config = LogConfig::from(&config.logging);
    if args.verbose {
        log_config.level = "debug".to_string();
    }
    if let Err(e) = plugsync_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let registry = Arc::new(NodeRegistry::new());
    let cache_dir = config.cache_dir()?;
    registry.scan_cache(&cache_dir).await?;

    let providers = Arc::new(wiring::build_providers(&config, registry.clone())?);
    let acquisition = wiring::build_acquisition(&config)?;

    let cancel = CancellationToken::new();
    let sweeper = providers.spawn_sweeper(config.providers.sweep_interval(), cancel.clone());
    info!(
        node = %config.node.name,
        namespace = %config.node.namespace,
        cache = %cache_dir.display(),
        "plugsyncd started"
    );

    let rt = Runtime {
        config,
        registry,
        providers,
        acquisition,
    };
    let outcome = tokio::select! {
        result = run(&rt, args.command) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            Ok(())
        },
    };

    cancel.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "metadata sweeper did not stop cleanly");
    }
    outcome
}

async fn run(rt: &Runtime, command: Command) -> Result<()> {
    match command {
        Command::Meta { id, version } => {
            commands::meta(rt, &id, version.as_deref().unwrap_or_default()).await
        },
        Command::Acquire => commands::acquire(rt).await,
        Command::Sync => commands::sync(rt).await,
    }
}
