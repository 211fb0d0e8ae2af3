//! # Live Reading Merger
//!
//! Fuses GPS-derived speed and distance with rpm and acceleration from the
//! sensor link into one `LiveReading`, substituting synthetic data per stream
//! whenever that stream has gone stale.
//!
//! Real updates only change the reading. Trip samples are produced by `tick`,
//! exactly once per tick, so two streams firing within one interval never
//! count twice.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::freshness::{StreamFreshness, StreamState};
use crate::frame::{decode_frame, SensorFrame};
use crate::geo::GeoFix;
use crate::store::{load_odometer, save_odometer, KeyValueStore};
use crate::synthetic::SyntheticGenerator;

/// Current values shown on the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LiveReading {
    /// Engine rpm, 0..=9000
    pub rpm: u16,
    /// Throttle percentage, 0..=100
    pub acceleration: u8,
    /// km/h
    pub speed: f64,
    /// Cumulative km since the last trip reset
    pub odometer: f64,
}

/// The one sample a tick contributes to the trip
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSample {
    /// Speed held before this tick's update
    pub speed: f64,
    pub rpm: u16,
    pub acceleration: u8,
    pub speed_synthetic: bool,
    pub sensor_synthetic: bool,
}

pub struct LiveReadingMerger {
    reading: LiveReading,
    last_fix: Option<GeoFix>,
    position: StreamFreshness,
    sensor: StreamFreshness,
    synthetic: SyntheticGenerator,
    tick_interval: Duration,
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for LiveReadingMerger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveReadingMerger")
            .field("reading", &self.reading)
            .field("position", &self.position.state())
            .field("sensor", &self.sensor.state())
            .finish_non_exhaustive()
    }
}

impl LiveReadingMerger {
    /// Create a merger with the odometer restored from `store`
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        synthetic: SyntheticGenerator,
        staleness: Duration,
        tick_interval: Duration,
    ) -> Self {
        let odometer = load_odometer(store.as_ref());
        debug!("Restored odometer: {:.3} km", odometer);
        Self {
            reading: LiveReading {
                odometer,
                ..LiveReading::default()
            },
            last_fix: None,
            position: StreamFreshness::new(staleness),
            sensor: StreamFreshness::new(staleness),
            synthetic,
            tick_interval,
            store,
        }
    }

    pub fn reading(&self) -> LiveReading {
        self.reading
    }

    pub fn position_state(&self) -> StreamState {
        self.position.state()
    }

    pub fn sensor_state(&self) -> StreamState {
        self.sensor.state()
    }

    pub fn last_fix(&self) -> Option<&GeoFix> {
        self.last_fix.as_ref()
    }

    /// Accept a position fix
    ///
    /// Distance accrues only against a previous fix and only while the
    /// provider reports forward motion.
    pub fn apply_fix(&mut self, fix: GeoFix, now: Instant) {
        if let Some(prev) = &self.last_fix {
            if fix.is_moving() {
                let km = fix.distance_from(prev);
                self.add_distance(km);
            }
        }
        self.reading.speed = fix.speed_kmh();
        self.last_fix = Some(fix);
        self.position.mark_live(now);
        trace!("Fix applied, speed {} km/h", self.reading.speed);
    }

    /// The position provider has nothing to offer
    pub fn position_unavailable(&mut self) {
        self.position.mark_unavailable();
    }

    /// Accept one line from the sensor link
    ///
    /// Returns `false` for a malformed frame, which is logged and dropped.
    pub fn apply_frame(&mut self, line: &str, now: Instant) -> bool {
        let frame = decode_frame(line);
        match frame.resolve(self.reading.rpm, self.reading.acceleration) {
            Some((rpm, acceleration)) => {
                self.reading.rpm = rpm;
                self.reading.acceleration = acceleration;
                self.sensor.mark_live(now);
                true
            }
            None => {
                if let SensorFrame::Malformed(raw) = frame {
                    warn!("Discarding malformed sensor frame: {:?}", raw);
                }
                false
            }
        }
    }

    /// The sensor link failed or closed
    pub fn sensor_unavailable(&mut self) {
        self.sensor.mark_unavailable();
    }

    /// Fill stale streams with synthetic data and produce this tick's sample
    pub fn tick(&mut self, now: Instant) -> TickSample {
        let prev_speed = self.reading.speed;

        let speed_synthetic = self.position.tick(now);
        if speed_synthetic {
            let speed = self.synthetic.speed();
            self.reading.speed = speed;
            self.add_distance(speed * self.tick_interval.as_secs_f64() / 3600.0);
            // Real accrual restarts from the next fix, not from one before the gap
            self.last_fix = None;
        }

        let sensor_synthetic = self.sensor.tick(now);
        if sensor_synthetic {
            self.reading.rpm = self.synthetic.rpm();
            self.reading.acceleration = self.synthetic.acceleration();
        }

        TickSample {
            speed: prev_speed,
            rpm: self.reading.rpm,
            acceleration: self.reading.acceleration,
            speed_synthetic,
            sensor_synthetic,
        }
    }

    /// Session closed: zero the motion fields, keep the odometer
    pub fn stop(&mut self) {
        self.reading = LiveReading {
            odometer: self.reading.odometer,
            ..LiveReading::default()
        };
        self.last_fix = None;
        self.position.reset();
        self.sensor.reset();
    }

    /// Trip reset: clear the odometer
    pub fn reset_odometer(&mut self) {
        self.reading.odometer = 0.0;
        self.persist_odometer();
    }

    fn add_distance(&mut self, km: f64) {
        if km > 0.0 && km.is_finite() {
            self.reading.odometer += km;
            self.persist_odometer();
        }
    }

    fn persist_odometer(&self) {
        if let Err(e) = save_odometer(self.store.as_ref(), self.reading.odometer) {
            warn!("Failed to persist odometer: {}", e);
        }
    }
}
