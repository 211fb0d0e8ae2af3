//! Finalized trip record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A completed trip; never mutated after creation
///
/// Serialized with the field names the dashboard has always stored, so an
/// existing archive keeps loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripRecord {
    /// Epoch milliseconds at finalize time, as a string
    pub id: String,
    /// Display name, `Trip N`
    pub name: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "distance")]
    pub distance_km: f64,
    pub avg_speed: f64,
    pub max_speed: f64,
    pub avg_rpm: f64,
    pub avg_acceleration: f64,
    #[serde(rename = "duration", default)]
    pub duration_seconds: u64,
}
