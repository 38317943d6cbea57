//! Serial port adapter for the LED dome (tokio-serial)

use super::Adapter;
use crate::error::{CaptureError, CaptureResult};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::debug;

/// Serial adapter for the dome's USB-serial line
///
/// Wraps a `tokio-serial` stream configured 8N1 without flow control, as
/// the dome controller expects.
pub struct SerialAdapter {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    port_name: String,

    /// Baud rate (e.g., 9600)
    baud_rate: u32,

    port: SerialStream,
}

impl SerialAdapter {
    /// Open a serial port
    ///
    /// # Arguments
    /// * `port_name` - Serial port path (e.g., "/dev/ttyUSB0", "COM3")
    /// * `baud_rate` - Communication speed (the dome uses 9600)
    ///
    /// # Errors
    /// Returns `CaptureError::Transport` if the port cannot be opened
    pub fn open(port_name: &str, baud_rate: u32) -> CaptureResult<Self> {
        let port = tokio_serial::new(port_name, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                CaptureError::Transport(format!(
                    "Failed to open serial port '{}' at {} baud: {}",
                    port_name, baud_rate, e
                ))
            })?;

        debug!("Serial port '{}' opened at {} baud", port_name, baud_rate);

        Ok(Self {
            port_name: port_name.to_string(),
            baud_rate,
            port,
        })
    }

    /// Port this adapter was opened on
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Configured baud rate
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

#[async_trait]
impl Adapter for SerialAdapter {
    async fn write(&mut self, bytes: &[u8]) -> CaptureResult<()> {
        self.port.write_all(bytes).await.map_err(|e| {
            CaptureError::Transport(format!("Failed to write to '{}': {}", self.port_name, e))
        })?;
        self.port.flush().await.map_err(|e| {
            CaptureError::Transport(format!("Failed to flush '{}': {}", self.port_name, e))
        })
    }

    async fn read(&mut self, buffer: &mut [u8]) -> CaptureResult<usize> {
        self.port.read(buffer).await.map_err(|e| {
            CaptureError::Transport(format!("Serial read error on '{}': {}", self.port_name, e))
        })
    }

    async fn clear_input(&mut self) -> CaptureResult<()> {
        self.port.clear(ClearBuffer::Input).map_err(|e| {
            CaptureError::Transport(format!(
                "Failed to clear input on '{}': {}",
                self.port_name, e
            ))
        })
    }
}

/// Names of the serial ports present on this machine.
pub fn available_ports() -> CaptureResult<Vec<String>> {
    tokio_serial::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .map_err(|e| CaptureError::Transport(format!("Cannot enumerate serial ports: {}", e)))
}
