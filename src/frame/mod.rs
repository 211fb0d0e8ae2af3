//! # Sensor Frame Module
//!
//! Decoding of the text frames the scooter's microcontroller sends over the
//! HC-06 link.
//!
//! This module handles:
//! - Reassembling delimiter-terminated lines from a raw byte stream
//! - Validating each line into a `SensorFrame`
//! - Clamping rpm and acceleration to their physical ranges

pub mod decoder;
pub mod framer;

pub use decoder::{decode_frame, SensorFrame};
pub use framer::LineFramer;

/// Highest rpm a frame may report
pub const MAX_RPM: u16 = 9000;

/// Highest throttle percentage a frame may report
pub const MAX_ACCELERATION: u8 = 100;

/// Longest line accepted before it is discarded as malformed
pub const MAX_LINE_LEN: usize = 256;
