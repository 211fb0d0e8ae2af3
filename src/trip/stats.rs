//! Running statistics for the active trip

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::archive::TripArchive;
use super::record::TripRecord;

/// Accumulator for the active trip
///
/// `sample_count` is the number of samples recorded since the last reset and
/// every sum only grows between resets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripStats {
    max_speed: f64,
    speed_sum: f64,
    rpm_sum: u64,
    acceleration_sum: u64,
    sample_count: u64,
    start: Option<DateTime<Utc>>,
}

impl TripStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate one sample
    pub fn record_sample(&mut self, speed: f64, rpm: u16, acceleration: u8) {
        let speed = if speed.is_finite() { speed.max(0.0) } else { 0.0 };
        self.sample_count += 1;
        self.max_speed = self.max_speed.max(speed);
        self.speed_sum += speed;
        self.rpm_sum += u64::from(rpm);
        self.acceleration_sum += u64::from(acceleration);
    }

    /// Start the trip clock at `now` unless the trip already has samples
    pub fn seed_start(&mut self, now: DateTime<Utc>) {
        if self.sample_count == 0 || self.start.is_none() {
            self.start = Some(now);
        }
    }

    /// Close the trip
    ///
    /// Emits a record only when `odometer_km > 0` and at least one sample was
    /// recorded. Either way the accumulators are cleared and a new trip starts
    /// at `now`.
    ///
    /// # Arguments
    ///
    /// * `odometer_km` - Distance covered during the trip
    /// * `archive` - Used for the `Trip N` display name and a unique id
    /// * `now` - Finalize time
    pub fn finalize(
        &mut self,
        odometer_km: f64,
        archive: &TripArchive,
        now: DateTime<Utc>,
    ) -> Option<TripRecord> {
        let record = if odometer_km > 0.0 && self.sample_count > 0 {
            let n = self.sample_count as f64;
            let duration_seconds = self
                .start
                .map(|start| (now - start).num_seconds().max(0) as u64)
                .unwrap_or(0);

            let record = TripRecord {
                id: archive.next_id(now),
                name: format!("Trip {}", archive.len() + 1),
                date: now,
                distance_km: odometer_km,
                avg_speed: self.speed_sum / n,
                max_speed: self.max_speed,
                avg_rpm: self.rpm_sum as f64 / n,
                avg_acceleration: self.acceleration_sum as f64 / n,
                duration_seconds,
            };
            info!(
                "Finalized {}: {:.2} km over {} s, {} samples",
                record.name, record.distance_km, record.duration_seconds, self.sample_count
            );
            Some(record)
        } else {
            debug!(
                "Nothing to save (odometer {:.3} km, {} samples)",
                odometer_km, self.sample_count
            );
            None
        };

        *self = Self {
            start: Some(now),
            ..Self::default()
        };
        record
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    pub fn speed_sum(&self) -> f64 {
        self.speed_sum
    }

    pub fn rpm_sum(&self) -> u64 {
        self.rpm_sum
    }

    pub fn acceleration_sum(&self) -> u64 {
        self.acceleration_sum
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn empty_archive() -> TripArchive {
        TripArchive::load(Arc::new(MemoryStore::new()))
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 10, 18, 0, 0).unwrap()
    }

    #[test]
    fn test_averages_from_three_frames() {
        let mut stats = TripStats::new();
        stats.seed_start(t0());
        stats.record_sample(20.0, 1000, 10);
        stats.record_sample(20.0, 3000, 50);
        stats.record_sample(20.0, 5000, 90);
        assert_eq!(stats.sample_count(), 3);

        let record = stats
            .finalize(1.5, &empty_archive(), t0() + Duration::seconds(3))
            .expect("record");
        assert_eq!(record.avg_rpm, 3000.0);
        assert_eq!(record.avg_acceleration, 50.0);
        assert_eq!(record.avg_speed, 20.0);
        assert_eq!(record.max_speed, 20.0);
        assert_eq!(record.distance_km, 1.5);
        assert_eq!(record.duration_seconds, 3);
        assert_eq!(record.name, "Trip 1");
    }

    #[test]
    fn test_avg_speed_is_exact_mean() {
        let speeds = [0.0, 12.0, 33.0, 47.0, 98.0, 5.0, 61.0];
        let mut stats = TripStats::new();
        for &s in &speeds {
            stats.record_sample(s, 0, 0);
        }
        let record = stats.finalize(0.4, &empty_archive(), t0()).unwrap();
        let expected: f64 = speeds.iter().sum::<f64>() / speeds.len() as f64;
        assert_eq!(record.avg_speed, expected);
        assert_eq!(record.max_speed, 98.0);
    }

    #[test]
    fn test_no_record_without_distance() {
        let mut stats = TripStats::new();
        stats.record_sample(10.0, 2000, 20);
        assert!(stats.finalize(0.0, &empty_archive(), t0()).is_none());
    }

    #[test]
    fn test_no_record_without_samples() {
        let mut stats = TripStats::new();
        assert!(stats.finalize(3.2, &empty_archive(), t0()).is_none());
    }

    #[test]
    fn test_finalize_resets_and_restarts() {
        let mut stats = TripStats::new();
        stats.seed_start(t0());
        stats.record_sample(30.0, 4000, 60);

        let later = t0() + Duration::minutes(10);
        stats.finalize(2.0, &empty_archive(), later).unwrap();

        assert_eq!(stats.sample_count(), 0);
        assert_eq!(stats.speed_sum(), 0.0);
        assert_eq!(stats.rpm_sum(), 0);
        assert_eq!(stats.acceleration_sum(), 0);
        assert_eq!(stats.max_speed(), 0.0);
        assert_eq!(stats.start(), Some(later));
    }

    #[test]
    fn test_duration_without_start_is_zero() {
        let mut stats = TripStats::new();
        stats.record_sample(10.0, 1000, 10);
        let record = stats.finalize(1.0, &empty_archive(), t0()).unwrap();
        assert_eq!(record.duration_seconds, 0);
    }

    #[test]
    fn test_seed_start_keeps_trip_with_samples() {
        let mut stats = TripStats::new();
        stats.seed_start(t0());
        stats.record_sample(12.0, 2000, 20);
        stats.seed_start(t0() + Duration::hours(1));
        assert_eq!(stats.start(), Some(t0()));
    }

    #[test]
    fn test_seed_start_restarts_empty_trip() {
        let mut stats = TripStats::new();
        stats.seed_start(t0());
        stats.seed_start(t0() + Duration::hours(1));
        assert_eq!(stats.start(), Some(t0() + Duration::hours(1)));
    }

    #[test]
    fn test_name_follows_archive_length() {
        let mut archive = empty_archive();
        let mut stats = TripStats::new();
        for i in 0..3 {
            stats.record_sample(10.0, 1000, 10);
            let record = stats.finalize(1.0, &archive, t0() + Duration::seconds(i)).unwrap();
            assert_eq!(record.name, format!("Trip {}", i + 1));
            archive.append(record).unwrap();
        }
    }

    #[test]
    fn test_sums_never_decrease() {
        let mut stats = TripStats::new();
        let mut last = (0.0, 0, 0);
        for i in 0..500u16 {
            stats.record_sample(f64::from(i % 99), i * 18 % 9000, (i % 100) as u8);
            let now = (stats.speed_sum(), stats.rpm_sum(), stats.acceleration_sum());
            assert!(now.0 >= last.0 && now.1 >= last.1 && now.2 >= last.2);
            last = now;
        }
        assert_eq!(stats.sample_count(), 500);
    }

    #[test]
    fn test_negative_speed_is_ignored() {
        let mut stats = TripStats::new();
        stats.record_sample(-4.0, 0, 0);
        assert_eq!(stats.speed_sum(), 0.0);
        assert_eq!(stats.sample_count(), 1);
    }
}
