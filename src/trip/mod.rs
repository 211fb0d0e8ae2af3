//! # Trip Module
//!
//! Per-trip statistics and the durable trip journal.
//!
//! This module handles:
//! - Accumulating one sample per tick over the active trip
//! - Finalizing an immutable `TripRecord` on trip reset
//! - Persisting the newest-first archive of finalized trips

pub mod archive;
pub mod record;
pub mod stats;

pub use archive::TripArchive;
pub use record::TripRecord;
pub use stats::TripStats;
