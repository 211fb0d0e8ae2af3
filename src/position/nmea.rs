//! # NMEA Position Provider
//!
//! Reads a serial GPS receiver and parses GPRMC/GNRMC sentences.
//!
//! Format: `$GPRMC,hhmmss.ss,A,ddmm.mmmm,N,dddmm.mmmm,E,speed,course,ddmmyy,,,*checksum`

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tokio::io::AsyncReadExt;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, trace};

use super::{PositionProvider, WatchOptions};
use crate::error::{Result, TelemetryError};
use crate::frame::framer::{FramedLine, LineFramer};
use crate::geo::GeoFix;

/// Knots to m/s
const KNOTS_TO_MPS: f64 = 0.514444;

/// GPS receiver on a serial port
pub struct NmeaPositionProvider {
    path: String,
    baud_rate: u32,
    port: Option<SerialStream>,
    framer: LineFramer,
}

impl std::fmt::Debug for NmeaPositionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NmeaPositionProvider")
            .field("path", &self.path)
            .field("open", &self.port.is_some())
            .finish_non_exhaustive()
    }
}

impl NmeaPositionProvider {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            port: None,
            framer: LineFramer::new(b'\n'),
        }
    }

    /// Whether the receiver port is currently open
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

#[async_trait]
impl PositionProvider for NmeaPositionProvider {
    async fn start(&mut self, options: &WatchOptions) -> Result<()> {
        if options.high_accuracy {
            debug!("NMEA receivers report at their native accuracy");
        }

        // Reopen on every watch so no stale sentence survives a reconnect
        self.port = None;
        self.framer = LineFramer::new(b'\n');

        let port = tokio_serial::new(&self.path, self.baud_rate)
            .open_native_async()
            .map_err(|e| TelemetryError::PositionUnavailable(format!("Failed to open {}: {}", self.path, e)))?;
        info!("GPS receiver opened at {}", self.path);
        self.port = Some(port);
        Ok(())
    }

    async fn next_fix(&mut self) -> Result<GeoFix> {
        let mut buf = [0u8; 128];
        loop {
            while let Some(framed) = self.framer.next_line() {
                if let FramedLine::Line(line) = framed {
                    if let Some(fix) = parse_rmc(&line) {
                        return Ok(fix);
                    }
                }
            }

            let port = self
                .port
                .as_mut()
                .ok_or_else(|| TelemetryError::PositionUnavailable("receiver not started".to_string()))?;
            let n = port.read(&mut buf).await?;
            if n == 0 {
                self.port = None;
                return Err(TelemetryError::PositionUnavailable("receiver closed".to_string()));
            }
            self.framer.extend(&buf[..n]);
        }
    }

    fn stop(&mut self) {
        if self.port.take().is_some() {
            info!("GPS receiver at {} closed", self.path);
        }
        self.framer = LineFramer::new(b'\n');
    }
}


/// Parse an RMC sentence into a fix; `None` for other sentences or no fix
pub fn parse_rmc(line: &str) -> Option<GeoFix> {
    let line = line.trim();
    if !(line.starts_with("$GPRMC") || line.starts_with("$GNRMC")) {
        return None;
    }
    if !checksum_ok(line) {
        trace!("Dropping NMEA sentence with bad checksum: {}", line);
        return None;
    }

    let body = line.split('*').next()?;
    let fields: Vec<&str> = body.split(',').collect();
    if fields.len() < 10 {
        return None;
    }

    // Field 2: Status (A=valid, V=invalid)
    if fields[2] != "A" {
        return None;
    }

    let latitude = parse_coordinate(fields[3], fields[4])?;
    let longitude = parse_coordinate(fields[5], fields[6])?;
    let speed_mps = fields[7].parse::<f64>().ok().map(|knots| knots * KNOTS_TO_MPS);
    let timestamp = parse_timestamp(fields[1], fields[9]).unwrap_or_else(Utc::now);

    Some(GeoFix {
        latitude,
        longitude,
        speed_mps,
        timestamp,
    })
}

/// XOR of the bytes between `$` and `*`; sentences without a checksum pass
fn checksum_ok(line: &str) -> bool {
    let Some((body, sum)) = line.split_once('*') else {
        return true;
    };
    let Ok(expected) = u8::from_str_radix(sum.trim(), 16) else {
        return false;
    };
    let actual = body.bytes().skip(1).fold(0u8, |acc, b| acc ^ b);
    actual == expected
}

/// Parse NMEA coordinate field (ddmm.mmmm or dddmm.mmmm)
fn parse_coordinate(coord_str: &str, dir_str: &str) -> Option<f64> {
    if coord_str.is_empty() || dir_str.is_empty() {
        return None;
    }

    let value = coord_str.parse::<f64>().ok()?;
    let degrees = (value / 100.0).floor();
    let minutes = value - (degrees * 100.0);
    let decimal = degrees + (minutes / 60.0);

    match dir_str {
        "N" | "E" => Some(decimal),
        "S" | "W" => Some(-decimal),
        _ => None,
    }
}

/// Combine hhmmss.ss and ddmmyy into a UTC timestamp
fn parse_timestamp(time_str: &str, date_str: &str) -> Option<DateTime<Utc>> {
    let time = NaiveTime::parse_from_str(time_str.get(..6)?, "%H%M%S").ok()?;
    let date = NaiveDate::parse_from_str(date_str, "%d%m%y").ok()?;
    Some(date.and_time(time).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    const VALID: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";

    #[test]
    fn test_parse_valid_rmc() {
        let fix = parse_rmc(VALID).expect("valid sentence");
        assert!((fix.latitude - 48.1173).abs() < 0.0001);
        assert!((fix.longitude - 11.516_666).abs() < 0.0001);
        assert!((fix.speed_mps.unwrap() - 22.4 * KNOTS_TO_MPS).abs() < 1e-9);
        assert_eq!(fix.timestamp.year(), 1994);
        assert_eq!(fix.timestamp.month(), 3);
        assert_eq!(fix.timestamp.hour(), 12);
        assert_eq!(fix.timestamp.minute(), 35);
    }

    #[test]
    fn test_southern_western_hemisphere() {
        let fix = parse_rmc("$GNRMC,101500,A,2333.030,S,04637.998,W,0.0,0.0,010125,,").unwrap();
        assert!((fix.latitude - (-23.5505)).abs() < 0.0001);
        assert!((fix.longitude - (-46.6333)).abs() < 0.0001);
        assert_eq!(fix.speed_mps, Some(0.0));
    }

    #[test]
    fn test_missing_speed_is_none() {
        let fix = parse_rmc("$GPRMC,123519,A,4807.038,N,01131.000,E,,,230394,,").unwrap();
        assert_eq!(fix.speed_mps, None);
    }

    #[test]
    fn test_void_status_rejected() {
        assert!(parse_rmc("$GPRMC,123519,V,4807.038,N,01131.000,E,022.4,084.4,230394,,").is_none());
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let corrupted = VALID.replace("*6A", "*00");
        assert!(parse_rmc(&corrupted).is_none());
    }

    #[test]
    fn test_other_sentences_ignored() {
        assert!(parse_rmc("$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47").is_none());
        assert!(parse_rmc("garbage").is_none());
    }

    #[test]
    fn test_bad_timestamp_falls_back_to_now() {
        let before = Utc::now();
        let fix = parse_rmc("$GPRMC,xx,A,4807.038,N,01131.000,E,1.0,0.0,zz,,").unwrap();
        assert!(fix.timestamp >= before);
    }

    #[tokio::test]
    async fn test_start_with_missing_port_is_unavailable() {
        let mut provider = NmeaPositionProvider::new("/dev/nonexistent_gps_12345", 9600);
        let options = WatchOptions::from(&crate::config::PositionConfig::default());
        match provider.start(&options).await {
            Err(TelemetryError::PositionUnavailable(msg)) => assert!(msg.contains("nonexistent_gps")),
            other => panic!("Expected PositionUnavailable, got: {:?}", other),
        }
        assert!(matches!(provider.next_fix().await, Err(TelemetryError::PositionUnavailable(_))));
    }

    #[test]
    fn test_stop_without_port_is_harmless() {
        let mut provider = NmeaPositionProvider::new("/dev/ttyGPS", 9600);
        provider.stop();
        assert!(!provider.is_open());
    }
}
