//! # Scooter Telemetry Library
//!
//! Live engine and GPS telemetry for a scooter, read over an HC-06 serial link.
//!
//! The core merges two unreliable streams (sensor frames and position fixes)
//! into one live reading, substitutes synthetic values when either goes quiet,
//! and journals finished trips to durable storage.

pub mod config;
pub mod error;
pub mod frame;
pub mod freshness;
pub mod geo;
pub mod link;
pub mod merger;
pub mod notify;
pub mod position;
pub mod session;
pub mod store;
pub mod synthetic;
pub mod trip;

pub use error::{Result, TelemetryError};
pub use session::{ConnectionState, SessionEvent, TelemetrySession};
