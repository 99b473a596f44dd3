//! fxnews - An economic calendar watcher with offline cache and timed alerts.
//!
//! This is the main entry point for fxnews. It loads the configuration, runs
//! the [`Engine`] until Ctrl-C and logs every message the engine sends.
//!
//! # Usage
//!
//! ```bash
//! fxnews --config config.yaml --data ./data
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (default: `info`)

use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use tokio::sync::mpsc::UnboundedReceiver;

use fxnews::{
    config::Config,
    engine::Engine,
    feed::group_events_by_day,
    messages::EngineMessage,
};

/// Command-line arguments for fxnews.
///
/// # Examples
///
/// ```bash
/// fxnews --config config.yaml --data ./data
/// ```
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file.
    ///
    /// Every key is optional. See the `fxnews::config` module for the expected format.
    #[arg(short, long)]
    config: String,

    /// Path to the directory for storing persistent data.
    ///
    /// This directory will contain `latest_calendar.json`, the last calendar
    /// downloaded successfully.
    #[arg(short, long)]
    data: String,
}

/// Logs every message the engine sends until the engine is dropped.
async fn drain_messages(mut messages: UnboundedReceiver<EngineMessage>) {
    while let Some(message) = messages.recv().await {
        match &message {
            EngineMessage::RefreshCompleted { snapshot, .. } => {
                info!("{}", message);
                for (day, events) in group_events_by_day(&snapshot.events) {
                    info!("{}: {} events", day, events.len());
                }
            }
            EngineMessage::DiffComputed(diff) => {
                info!("{}", message);
                for (key, fields) in diff.changed() {
                    let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
                    info!("revised {}: {}", key, fields.join(", "));
                }
            }
            EngineMessage::RefreshFailed { .. } => warn!("{}", message),
            EngineMessage::AlertDue(_) => info!("{}", message),
        }
    }
}

/// Main entry point for fxnews.
///
/// 1. **Logging Setup**: `info` level by default, overridable with `RUST_LOG`
/// 2. **Argument Parsing**: Parses command-line arguments using `clap`
/// 3. **Configuration Loading**: Reads the YAML file and environment overrides
/// 4. **Bootstrap**: Restores the cached calendar, or forces a refresh without one
/// 5. **Execution**: Runs the refresh and alert workers until Ctrl-C
#[tokio::main]
async fn main() {
    // Put logger at info level by default
    let env = Env::default().filter_or("RUST_LOG", "info");
    env_logger::init_from_env(env);

    info!("Starting fxnews {}...", env!("CARGO_PKG_VERSION"));

    // Parse command line arguments
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load config file: {}", e);
            return;
        }
    };

    let (mut engine, messages) = match Engine::new(config, &args.data) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to initialize engine: {}", e);
            return;
        }
    };
    let drain = tokio::spawn(drain_messages(messages));

    engine.bootstrap().await;
    engine.start();

    for entry in engine.pending_alerts().await {
        info!("armed alert {}", entry);
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    let status = engine.refresh_status().await;
    match status.last_success {
        Some(fetched_at) => info!("calendar last fetched at {}", fetched_at),
        None => warn!("calendar was never fetched"),
    }

    engine.shutdown().await;

    // Dropping the engine closes the message channel
    drop(engine);
    if let Err(e) = drain.await {
        error!("Message drain ended abnormally: {}", e);
    }
}
