//! # VAST Runner
//!
//! Spawns an in-process relay mesh, lets every node find and join its nearest
//! relay, and feeds joined nodes into a shared spatial neighbor engine.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration (creates vast.toml if missing)
//! vast
//!
//! # Bigger mesh, JSON logs, stop after 5000 ticks
//! vast --nodes 64 --relays 8 --json-logs --max-ticks 5000
//! ```
//!
//! The runner stops on SIGINT/SIGTERM or when `max_ticks` is reached.

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;
use tracing::error;

pub use app::RunSummary;
pub use config::{LoggingSettings, SimulationSettings};

/// Parses arguments, sets up logging and runs the application to completion.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}
