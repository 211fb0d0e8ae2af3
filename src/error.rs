//! # Error Types
//!
//! Custom error types for the scooter telemetry core using `thiserror`.
//!
//! Only `ConnectionTimeout` and `DeviceNotFound` ever reach a `connect()` caller,
//! and `LinkWrite` reaches a `send_command()` caller. `MalformedFrame` and
//! `PositionUnavailable` are recovered inside the session by falling back to
//! synthetic data.

use thiserror::Error;

/// Main error type for the telemetry core
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The link handshake did not complete within the configured timeout
    #[error("Connection timed out after {0} ms")]
    ConnectionTimeout(u64),

    /// No paired device matched the configured name prefix
    #[error("No paired device matching '{0}' found")]
    DeviceNotFound(String),

    /// An outbound command could not be written to the link
    #[error("Failed to write to link: {0}")]
    LinkWrite(String),

    /// A sensor frame could not be decoded
    #[error("Malformed sensor frame: {0}")]
    MalformedFrame(String),

    /// The position provider has no fix to offer
    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    /// `connect()` was called while a session is connecting or connected
    #[error("A session is already {0}")]
    SessionBusy(&'static str),

    /// Operation requires an open session
    #[error("Not connected")]
    NotConnected,

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// Durable storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// JSON encode/decode errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the telemetry core
pub type Result<T> = std::result::Result<T, TelemetryError>;
