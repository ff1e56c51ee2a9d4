//! # Submission Sweeper
//!
//! Re-polls documents still awaiting a tax authority verdict and applies
//! the effects of accepted notes, on a fixed interval, until Ctrl+C or
//! SIGTERM.
//!
//! ## Usage
//! ```bash
//! # Default config location (see EngineConfig::default_config_path)
//! cargo run -p facturo-engine --bin facturo-sweeper
//!
//! # Explicit config file, one pass and exit
//! cargo run -p facturo-engine --bin facturo-sweeper -- --config ./facturo.toml --once
//! ```
//!
//! ## Log Levels
//! - `RUST_LOG=debug` - Show debug messages
//! - Default: `info,facturo=debug,sqlx=warn`

use std::env;
use std::path::PathBuf;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use facturo_db::Database;
use facturo_engine::{Engine, EngineConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut once = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--once" => once = true,
            "--help" | "-h" => {
                println!("Facturo Submission Sweeper");
                println!();
                println!("Usage: facturo-sweeper [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Config file (default: platform config dir)");
                println!("      --once           Run a single sweep and exit");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => warn!(argument = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let config = EngineConfig::load(config_path)?;
    let db = Database::new(config.db_config()).await?;
    let engine = Engine::from_config(&config, db.clone())?;

    if once {
        let report = engine.sweep_once().await?;
        info!(?report, "Single sweep finished");
        db.close().await;
        return Ok(());
    }

    if !config.sweep.enabled {
        info!("Sweep disabled in configuration, nothing to do");
        db.close().await;
        return Ok(());
    }

    let (sweeper, handle) = engine.sweeper(config.sweep_interval());
    let task = tokio::spawn(sweeper.run());

    shutdown_signal().await;

    handle.shutdown().await?;
    task.await?;
    db.close().await;

    info!("Sweeper shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,facturo=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(?e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping sweeper");
}
