//! # Sensor Frame Decoder
//!
//! Decodes one line of sensor text into a validated `SensorFrame`.
//!
//! Frames are compact JSON objects, for example `{"rpm":3200,"acceleration":45}`.
//! `accel` and `throttle` are accepted as aliases of `acceleration`. Unknown
//! fields are ignored; a missing field keeps the previous value.

use serde_json::{Map, Value};
use tracing::debug;

use super::{MAX_ACCELERATION, MAX_RPM};
use crate::error::{Result, TelemetryError};

/// Result of decoding one sensor line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorFrame {
    /// A well-formed frame; `None` fields were absent
    Valid {
        rpm: Option<u16>,
        acceleration: Option<u8>,
    },
    /// The raw text that failed validation
    Malformed(String),
}

impl SensorFrame {
    /// Fill absent fields from the previous reading
    ///
    /// Returns `None` for a malformed frame.
    ///
    /// # Examples
    ///
    /// ```
    /// use scooter_telemetry::frame::decode_frame;
    ///
    /// let frame = decode_frame(r#"{"rpm":4100}"#);
    /// assert_eq!(frame.resolve(1000, 35), Some((4100, 35)));
    /// ```
    pub fn resolve(&self, previous_rpm: u16, previous_acceleration: u8) -> Option<(u16, u8)> {
        match self {
            SensorFrame::Valid { rpm, acceleration } => Some((
                rpm.unwrap_or(previous_rpm),
                acceleration.unwrap_or(previous_acceleration),
            )),
            SensorFrame::Malformed(_) => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, SensorFrame::Valid { .. })
    }
}

/// Keys accepted for the throttle percentage, in order of preference
const ACCELERATION_KEYS: [&str; 3] = ["acceleration", "accel", "throttle"];

/// Decode a single frame line
///
/// # Arguments
///
/// * `line` - One frame without its delimiter
///
/// # Returns
///
/// `SensorFrame::Valid` when the line is a JSON object with at least one
/// non-negative numeric `rpm` / `acceleration` field, otherwise
/// `SensorFrame::Malformed` carrying the raw text.
pub fn decode_frame(line: &str) -> SensorFrame {
    match parse_fields(line) {
        Ok((rpm, acceleration)) => SensorFrame::Valid { rpm, acceleration },
        Err(e) => {
            debug!("{}", e);
            SensorFrame::Malformed(line.to_string())
        }
    }
}

/// Validate a frame and extract its known fields
///
/// # Errors
///
/// `MalformedFrame` naming the first problem found.
fn parse_fields(line: &str) -> Result<(Option<u16>, Option<u8>)> {
    let value: Value = serde_json::from_str(line.trim())
        .map_err(|e| TelemetryError::MalformedFrame(format!("not JSON ({})", e)))?;
    let Value::Object(fields) = value else {
        return Err(TelemetryError::MalformedFrame("not a JSON object".to_string()));
    };

    let rpm = field(&fields, "rpm", f64::from(MAX_RPM))?.map(|v| v as u16);
    let acceleration = ACCELERATION_KEYS
        .iter()
        .find(|key| !matches!(fields.get(**key), None | Some(Value::Null)))
        .map(|key| field(&fields, key, f64::from(MAX_ACCELERATION)))
        .transpose()?
        .flatten()
        .map(|v| v as u8);

    if rpm.is_none() && acceleration.is_none() {
        return Err(TelemetryError::MalformedFrame("no rpm or acceleration field".to_string()));
    }
    Ok((rpm, acceleration))
}

/// Read `key` as a number rounded and clamped to `[0, max]`
///
/// Absent and `null` read as `None`; negative, non-finite or non-numeric
/// values are rejected.
fn field(fields: &Map<String, Value>, key: &str, max: f64) -> Result<Option<f64>> {
    let raw = match fields.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(raw) => raw,
    };
    match raw.as_f64() {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(Some(v.round().min(max))),
        _ => Err(TelemetryError::MalformedFrame(format!("bad {} value {}", key, raw))),
    }
}
