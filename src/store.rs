//! # Durable Store Module
//!
//! Key-value persistence for the odometer and the trip archive.
//!
//! Writes are synchronous and write-through: every `set` reaches disk before it
//! returns, so an abrupt shutdown loses nothing that was already reported.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Result, TelemetryError};

/// Odometer value, stored as a plain decimal string
pub const ODOMETER_KEY: &str = "scooter_odometer";

/// Trip archive, stored as a JSON array, newest first
pub const TRIP_HISTORY_KEY: &str = "scooter_trip_history";

/// Durable string key-value store
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// One file per key under a data directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create the store, creating `dir` if needed
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(TelemetryError::Storage(format!("Invalid key: {:?}", key)));
        }
        Ok(self.dir.join(key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(value.as_bytes())?;
        // Contents must be on disk before the rename makes them visible
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &path)?;
        debug!("Stored {} ({} bytes)", key, value.len());
        Ok(())
    }
}

/// In-memory store, for tests and setups without a writable disk
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.values
            .lock()
            .map_err(|_| TelemetryError::Storage("memory store poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Read the persisted odometer; missing or corrupt values read as 0
pub fn load_odometer(store: &dyn KeyValueStore) -> f64 {
    match store.get(ODOMETER_KEY) {
        Ok(Some(raw)) => match raw.trim().parse::<f64>() {
            Ok(km) if km.is_finite() && km >= 0.0 => km,
            _ => {
                warn!("Ignoring corrupt odometer value {:?}", raw);
                0.0
            }
        },
        Ok(None) => 0.0,
        Err(e) => {
            warn!("Failed to read odometer: {}", e);
            0.0
        }
    }
}

/// Persist the odometer as a plain decimal string
pub fn save_odometer(store: &dyn KeyValueStore, km: f64) -> Result<()> {
    store.set(ODOMETER_KEY, &km.to_string())
}
