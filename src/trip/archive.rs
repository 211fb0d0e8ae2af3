//! Durable newest-first trip archive

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::record::TripRecord;
use crate::error::{Result, TelemetryError};
use crate::store::{KeyValueStore, TRIP_HISTORY_KEY};

/// Ordered trip history, persisted whole on every change
pub struct TripArchive {
    trips: Vec<TripRecord>,
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for TripArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TripArchive")
            .field("trips", &self.trips.len())
            .finish_non_exhaustive()
    }
}

impl TripArchive {
    /// Load the archive from `store`
    ///
    /// Absent data yields an empty archive. Unreadable data is logged and also
    /// yields an empty archive; it is only overwritten by the next change.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let trips = match store.get(TRIP_HISTORY_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<TripRecord>>(&raw) {
                Ok(trips) => trips,
                Err(e) => {
                    warn!("Ignoring unreadable trip history: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read trip history: {}", e);
                Vec::new()
            }
        };
        info!("Loaded {} trips", trips.len());
        Self { trips, store }
    }

    /// Prepend `record` and persist
    ///
    /// # Errors
    ///
    /// - `Storage` if a trip with the same id already exists
    /// - Any store error; the in-memory archive is left unchanged
    pub fn append(&mut self, record: TripRecord) -> Result<()> {
        if self.get(&record.id).is_some() {
            return Err(TelemetryError::Storage(format!("Duplicate trip id {}", record.id)));
        }

        let mut next = Vec::with_capacity(self.trips.len() + 1);
        next.push(record);
        next.extend(self.trips.iter().cloned());
        self.persist(&next)?;
        self.trips = next;
        Ok(())
    }

    /// Remove the trip with `id` and persist
    ///
    /// Returns `false` without touching storage when no such trip exists.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        if self.get(id).is_none() {
            return Ok(false);
        }

        let next: Vec<TripRecord> = self.trips.iter().filter(|t| t.id != id).cloned().collect();
        self.persist(&next)?;
        self.trips = next;
        Ok(true)
    }

    fn persist(&self, trips: &[TripRecord]) -> Result<()> {
        let json = serde_json::to_string(trips)?;
        self.store.set(TRIP_HISTORY_KEY, &json)
    }

    pub fn get(&self, id: &str) -> Option<&TripRecord> {
        self.trips.iter().find(|t| t.id == id)
    }

    /// Trips whose ids are in `ids`, in archive order
    pub fn select(&self, ids: &[&str]) -> Vec<&TripRecord> {
        self.trips.iter().filter(|t| ids.contains(&t.id.as_str())).collect()
    }

    /// A time-derived id not yet used by any trip
    pub fn next_id(&self, now: DateTime<Utc>) -> String {
        let mut millis = now.timestamp_millis();
        while self.get(&millis.to_string()).is_some() {
            millis += 1;
        }
        millis.to_string()
    }

    pub fn trips(&self) -> &[TripRecord] {
        &self.trips
    }

    pub fn iter(&self) -> impl Iterator<Item = &TripRecord> {
        self.trips.iter()
    }

    pub fn len(&self) -> usize {
        self.trips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }
}
