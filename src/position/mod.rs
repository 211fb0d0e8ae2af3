//! # Position Module
//!
//! Position providers and the watch loop that turns them into a stream of
//! updates for the session.
//!
//! This module handles:
//! - The `PositionProvider` seam (NMEA receiver, none, test doubles)
//! - Per-fix timeout and retry backoff
//! - Reporting provider failures as `PositionUpdate::Unavailable`

pub mod nmea;

pub use nmea::NmeaPositionProvider;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::config::PositionConfig;
use crate::error::{Result, TelemetryError};
use crate::geo::GeoFix;

/// Options handed to a provider when a watch starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    /// Oldest cached fix a provider may return; zero disables caching
    pub maximum_age: Duration,
    /// Longest wait for a single fix
    pub timeout: Duration,
}

impl From<&PositionConfig> for WatchOptions {
    fn from(config: &PositionConfig) -> Self {
        Self {
            high_accuracy: config.high_accuracy,
            maximum_age: Duration::from_millis(config.maximum_age_ms),
            timeout: Duration::from_millis(config.fix_timeout_ms),
        }
    }
}

/// One event from a position watch
#[derive(Debug, Clone, PartialEq)]
pub enum PositionUpdate {
    Fix(GeoFix),
    Unavailable(String),
}

/// A source of position fixes
#[async_trait]
pub trait PositionProvider: Send {
    /// Prepare a fresh watch; any cached data is dropped
    async fn start(&mut self, options: &WatchOptions) -> Result<()>;

    /// Wait for the next fix
    async fn next_fix(&mut self) -> Result<GeoFix>;

    /// Release the underlying device; called whenever a watch ends
    fn stop(&mut self) {}
}

/// Shared handle so successive sessions can reuse one provider
pub type SharedPositionProvider = Arc<Mutex<Box<dyn PositionProvider>>>;

/// Wrap a provider for use by a session
pub fn shared(provider: impl PositionProvider + 'static) -> SharedPositionProvider {
    Arc::new(Mutex::new(Box::new(provider)))
}

/// Provider for setups without a GPS receiver
#[derive(Debug, Default)]
pub struct NoPositionProvider;

#[async_trait]
impl PositionProvider for NoPositionProvider {
    async fn start(&mut self, _options: &WatchOptions) -> Result<()> {
        Err(TelemetryError::PositionUnavailable("no GPS receiver configured".to_string()))
    }

    async fn next_fix(&mut self) -> Result<GeoFix> {
        Err(TelemetryError::PositionUnavailable("no GPS receiver configured".to_string()))
    }
}

/// Holds a provider for the length of a watch and stops it when dropped,
/// including when the watch task is aborted
struct ActiveWatch<'a> {
    provider: MutexGuard<'a, Box<dyn PositionProvider>>,
}

impl Drop for ActiveWatch<'_> {
    fn drop(&mut self) {
        self.provider.stop();
        debug!("Position watch stopped");
    }
}

/// Run a position watch until `on_update` returns `false` or the task is aborted
///
/// Holds the provider lock for the whole watch, so aborting the task is what
/// releases the provider for the next session. The provider is stopped either
/// way.
pub async fn run_watch<F>(
    provider: SharedPositionProvider,
    options: WatchOptions,
    retry_backoff: Duration,
    mut on_update: F,
) where
    F: FnMut(PositionUpdate) -> bool + Send,
{
    let mut watch = ActiveWatch {
        provider: provider.lock().await,
    };
    let provider = &mut watch.provider;

    loop {
        if let Err(e) = provider.start(&options).await {
            warn!("Position watch failed to start: {}", e);
            if !on_update(PositionUpdate::Unavailable(e.to_string())) {
                return;
            }
            tokio::time::sleep(retry_backoff).await;
            continue;
        }
        debug!("Position watch started ({:?})", options);

        loop {
            let update = match tokio::time::timeout(options.timeout, provider.next_fix()).await {
                Ok(Ok(fix)) => PositionUpdate::Fix(fix),
                Ok(Err(e)) => {
                    warn!("Position provider error: {}", e);
                    if !on_update(PositionUpdate::Unavailable(e.to_string())) {
                        return;
                    }
                    tokio::time::sleep(retry_backoff).await;
                    break;
                }
                Err(_) => PositionUpdate::Unavailable(format!(
                    "no fix within {} ms",
                    options.timeout.as_millis()
                )),
            };

            if !on_update(update) {
                return;
            }
        }
    }
}
