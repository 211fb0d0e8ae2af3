//! # Serial Link Module
//!
//! Handles the serial link to the scooter's HC-06 module.
//!
//! This module handles:
//! - Enumerating serial ports the OS exposes for paired devices
//! - Matching the target device by name prefix
//! - Opening the port at the HC-06's baud rate (8N1)
//! - Splitting the stream into a frame reader and a command writer
//!
//! On Linux the HC-06 shows up as an RFCOMM tty (`/dev/rfcomm0`) once bound
//! and is offered under the configured device name. USB serial adapters
//! report a product string that is matched instead.

pub mod port_trait;

pub use port_trait::{find_target, CommandWriter, FrameReader, LinkChannel, PairedDevice, SerialBridge};

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_serial::{SerialPortBuilderExt, SerialPortType, SerialStream};
use tracing::{debug, info};

use crate::config::LinkConfig;
use crate::error::{Result, TelemetryError};

/// Serial bridge backed by `tokio-serial`
#[derive(Debug, Clone)]
pub struct TokioSerialBridge {
    config: LinkConfig,
}

impl TokioSerialBridge {
    pub fn new(config: LinkConfig) -> Self {
        Self { config }
    }

    /// Open a specific serial port with HC-06 settings
    fn open_port(path: &str, baud_rate: u32) -> Result<SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| TelemetryError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }
}

/// Whether `port_name` is a Bluetooth RFCOMM tty
fn is_rfcomm(port_name: &str, port_type: &SerialPortType) -> bool {
    matches!(port_type, SerialPortType::BluetoothPort) || port_name.contains("rfcomm")
}

/// Name a port the way a user would recognise it
///
/// An RFCOMM tty is bound to a single remote address (`rfcomm bind`) and the
/// kernel does not expose the remote's name, so a bound port is offered under
/// the configured device name with its path appended.
fn device_name(port_name: &str, port_type: &SerialPortType, configured_name: &str) -> String {
    if is_rfcomm(port_name, port_type) {
        return format!("{} ({})", configured_name, port_name);
    }
    match port_type {
        SerialPortType::UsbPort(usb) => usb.product.clone().unwrap_or_else(|| port_name.to_string()),
        _ => port_name.to_string(),
    }
}

#[async_trait]
impl SerialBridge for TokioSerialBridge {
    fn is_available(&self) -> bool {
        !self.config.port.is_empty() || tokio_serial::available_ports().is_ok()
    }

    async fn paired_devices(&self) -> Result<Vec<PairedDevice>> {
        // An explicit port is trusted to be the target device
        if !self.config.port.is_empty() {
            return Ok(vec![PairedDevice {
                name: self.config.device_name_prefix.clone(),
                address: self.config.port.clone(),
            }]);
        }

        let ports = tokio_serial::available_ports()
            .map_err(|e| TelemetryError::Serial(format!("Failed to enumerate ports: {}", e)))?;

        let devices: Vec<PairedDevice> = ports
            .iter()
            .map(|p| PairedDevice {
                name: device_name(&p.port_name, &p.port_type, &self.config.device_name_prefix),
                address: p.port_name.clone(),
            })
            .collect();

        debug!("Found {} serial devices", devices.len());
        Ok(devices)
    }

    async fn open(&self, device: &PairedDevice) -> Result<LinkChannel> {
        let stream = Self::open_port(&device.address, self.config.baud_rate)?;
        info!("Opened link to {} at {}", device.name, device.address);

        let (reader, writer) = tokio::io::split(stream);
        Ok(LinkChannel {
            reader: Box::new(SerialFrameReader { port: reader }),
            writer: Box::new(SerialCommandWriter { port: writer }),
        })
    }
}

/// Read half of a `SerialStream`
pub struct SerialFrameReader {
    port: ReadHalf<SerialStream>,
}

#[async_trait]
impl FrameReader for SerialFrameReader {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf).await
    }
}

/// Write half of a `SerialStream`
pub struct SerialCommandWriter {
    port: WriteHalf<SerialStream>,
}

#[async_trait]
impl CommandWriter for SerialCommandWriter {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.port.flush().await
    }
}
