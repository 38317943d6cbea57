//! Byte-level adapters for the dome's serial line
//!
//! The dome protocol only needs raw writes and single-byte reads, so the
//! adapter trait stays at that level. `SerialAdapter` talks to a real port,
//! `MockAdapter` simulates the dome controller for tests.

use crate::error::CaptureResult;
use async_trait::async_trait;

pub mod mock;
#[cfg(feature = "instrument_serial")]
pub mod serial_adapter;

pub use mock::MockAdapter;
#[cfg(feature = "instrument_serial")]
pub use serial_adapter::SerialAdapter;

/// Generic async adapter trait for hardware communication
#[async_trait]
pub trait Adapter: Send {
    /// Write all bytes to the link.
    async fn write(&mut self, bytes: &[u8]) -> CaptureResult<()>;

    /// Read available bytes into `buffer`, returning how many were read.
    /// Waits until at least one byte arrives; `Ok(0)` means the link closed.
    async fn read(&mut self, buffer: &mut [u8]) -> CaptureResult<usize>;

    /// Discard anything received but not yet read.
    async fn clear_input(&mut self) -> CaptureResult<()> {
        Ok(())
    }
}
