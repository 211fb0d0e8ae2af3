//! Trait abstraction for the sensor link so the transport stays pluggable

use async_trait::async_trait;
use std::io;

use crate::error::Result;

/// A device the platform reports as paired
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedDevice {
    /// Human-readable name, matched against the configured prefix
    pub name: String,
    /// Transport address (a port path for serial links)
    pub address: String,
}

/// An opened link, split so reads and writes can live on different tasks
pub struct LinkChannel {
    pub reader: Box<dyn FrameReader>,
    pub writer: Box<dyn CommandWriter>,
}

impl std::fmt::Debug for LinkChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkChannel").finish_non_exhaustive()
    }
}

/// Discovery and opening of the physical link
#[async_trait]
pub trait SerialBridge: Send + Sync {
    /// Whether the platform has a usable transport at all
    fn is_available(&self) -> bool;

    /// Enumerate paired devices
    async fn paired_devices(&self) -> Result<Vec<PairedDevice>>;

    /// Open a channel to `device`
    async fn open(&self, device: &PairedDevice) -> Result<LinkChannel>;
}

/// Inbound half of a link
#[async_trait]
pub trait FrameReader: Send {
    /// Read raw bytes into `buf`; `Ok(0)` means the link closed
    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Outbound half of a link
#[async_trait]
pub trait CommandWriter: Send {
    /// Write all data to the link
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;
}

/// Pick the first device whose name starts with `prefix`
pub fn find_target<'a>(devices: &'a [PairedDevice], prefix: &str) -> Option<&'a PairedDevice> {
    devices.iter().find(|d| d.name.starts_with(prefix))
}
