//! # Scooter Dash
//!
//! Terminal dashboard for the scooter telemetry core.
//!
//! Connects to the HC-06 sensor link, merges engine frames with GPS fixes and
//! journals trips. Commands are read line by line from stdin.
//!
//! # Usage
//!
//! ```bash
//! scooter-dash [config.toml]
//! ```
//!
//! Without an argument `config/default.toml` is used; if that file does not
//! exist the built-in defaults apply.
//!
//! # Commands
//!
//! | Command | Effect |
//! |---------|--------|
//! | `connect` | Open the session |
//! | `disconnect` | Close the session |
//! | `reset` | Save the current trip and start a new one |
//! | `trips` | List saved trips |
//! | `delete <id>` | Remove a saved trip |
//! | `send <text>` | Send a raw command to the scooter |
//! | `status` | Print the live reading |
//! | `quit` | Exit |

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scooter_telemetry::config::Config;
use scooter_telemetry::link::TokioSerialBridge;
use scooter_telemetry::notify::TracingNotifier;
use scooter_telemetry::position::{shared, NmeaPositionProvider, NoPositionProvider, SharedPositionProvider};
use scooter_telemetry::store::FileStore;
use scooter_telemetry::TelemetrySession;

/// Config file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Seconds between status log lines while connected
const STATUS_INTERVAL_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => load_config(Path::new(&path), false)?,
        None => load_config(Path::new(DEFAULT_CONFIG_PATH), true)?,
    };

    // Keep the guard alive so buffered log lines are flushed on exit
    let _log_guard = init_logging(&config);

    info!("Scooter Dash v{} starting...", env!("CARGO_PKG_VERSION"));

    let store = FileStore::open(&config.storage.data_dir)
        .with_context(|| format!("Failed to open data dir {}", config.storage.data_dir))?;
    let bridge = TokioSerialBridge::new(config.link.clone());
    let position = position_provider(&config);

    let mut session = TelemetrySession::new(
        config,
        Arc::new(store),
        Arc::new(bridge),
        position,
        Arc::new(TracingNotifier),
    );

    if let Err(e) = session.connect().await {
        warn!("Initial connect failed: {}. Type 'connect' to retry", e);
    }

    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    let mut status = interval(Duration::from_secs(STATUS_INTERVAL_SECS));
    status.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Type a command (connect, disconnect, reset, trips, delete <id>, send <text>, status, quit)");

    loop {
        tokio::select! {
            Some(event) = session.next_event() => {
                session.handle_event(event);
            }

            line = commands.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !run_command(&mut session, line.trim()).await {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("stdin closed, shutting down...");
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to read command: {}", e);
                        break;
                    }
                }
            }

            _ = status.tick() => {
                if session.is_connected() {
                    print_status(&session);
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    session.disconnect();
    info!("Odometer at exit: {:.2} km", session.live_reading().odometer);
    Ok(())
}

/// Load the config file; a missing file yields defaults when `allow_missing`
fn load_config(path: &Path, allow_missing: bool) -> Result<Config> {
    if allow_missing && !path.exists() {
        return Ok(Config::default());
    }
    Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Split a command line into the command word and its trimmed argument
fn split_command(line: &str) -> (&str, &str) {
    match line.trim().split_once(' ') {
        Some((command, arg)) => (command, arg.trim()),
        None => (line.trim(), ""),
    }
}

/// Console logging, plus a daily rolling file when enabled
fn init_logging(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.file_enabled {
        let appender = tracing_appender::rolling::daily(&config.logging.dir, "scooter-dash.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        None
    }
}

fn position_provider(config: &Config) -> SharedPositionProvider {
    if config.position.port.is_empty() {
        info!("No GPS port configured, speed will be simulated");
        shared(NoPositionProvider)
    } else {
        shared(NmeaPositionProvider::new(
            config.position.port.clone(),
            config.position.baud_rate,
        ))
    }
}

/// Execute one stdin command; returns `false` to exit
async fn run_command(session: &mut TelemetrySession, line: &str) -> bool {
    let (command, arg) = split_command(line);

    match command {
        "" => {}
        "connect" => {
            if let Err(e) = session.connect().await {
                warn!("Connect failed: {}", e);
            }
        }
        "disconnect" => session.disconnect(),
        "reset" => match session.reset_trip() {
            Ok(Some(record)) => info!("Saved {} ({})", record.name, record.id),
            Ok(None) => info!("Trip reset, nothing to save"),
            Err(e) => warn!("Trip reset failed: {}", e),
        },
        "trips" => {
            let archive = session.trip_archive();
            if archive.is_empty() {
                info!("No saved trips");
            }
            for trip in archive.iter() {
                info!(
                    "{} {} {}: {:.2} km, avg {:.1} km/h, max {:.0} km/h, avg {:.0} rpm, {} s",
                    trip.id,
                    trip.date.format("%Y-%m-%d %H:%M"),
                    trip.name,
                    trip.distance_km,
                    trip.avg_speed,
                    trip.max_speed,
                    trip.avg_rpm,
                    trip.duration_seconds
                );
            }
        }
        "delete" if !arg.is_empty() => match session.delete_trip(arg) {
            Ok(true) => {}
            Ok(false) => warn!("No trip with id {}", arg),
            Err(e) => warn!("Delete failed: {}", e),
        },
        "send" if !arg.is_empty() => {
            if let Err(e) = session.send_command(arg).await {
                warn!("Send failed: {}", e);
            }
        }
        "status" => print_status(session),
        "quit" | "exit" => return false,
        other => warn!("Unknown command: {}", other),
    }
    true
}

fn print_status(session: &TelemetrySession) {
    let reading = session.live_reading();
    let (position, sensor) = session.stream_states();
    info!(
        "{:?} | {:.0} km/h ({:?}) | {} rpm, {}% ({:?}) | {:.2} km",
        session.state(),
        reading.speed,
        position,
        reading.rpm,
        reading.acceleration,
        sensor,
        reading.odometer
    );
}
