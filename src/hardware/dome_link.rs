//! Serial framing for the LED dome controller
//!
//! Protocol Overview:
//! - Format: `0x42` followed by exactly 8 data bytes, one per 8-LED segment
//! - Completion: the controller answers with a single `0x01`; any other byte
//!   received while waiting is discarded
//! - Timing: half-duplex, one frame in flight. The controller drops frames
//!   sent too soon after the line opens, so a settle interval is observed
//!   before the first frame.
//!
//! The acknowledgment wait has no timeout: a controller that never answers
//! blocks the caller until the link reports an error or closes.

use crate::adapters::Adapter;
use crate::error::{CaptureError, CaptureResult};
use std::time::Duration;
use tracing::{debug, trace};

/// Command byte opening every frame
pub const FRAME_COMMAND: u8 = 0x42;
/// Byte the controller sends once a frame has been applied
pub const FRAME_ACK: u8 = 0x01;
/// Data bytes per frame
pub const FRAME_LEN: usize = 8;

/// Frame-level link to the dome controller
pub struct LedDomeLink<A: Adapter> {
    adapter: A,
}

impl<A: Adapter> LedDomeLink<A> {
    /// Take ownership of an opened adapter and wait out the settle interval.
    pub async fn open(adapter: A, settle: Duration) -> Self {
        if !settle.is_zero() {
            debug!("Waiting {:?} for dome controller to settle", settle);
            tokio::time::sleep(settle).await;
        }
        Self { adapter }
    }

    /// Send one 8-byte LED frame and wait for the acknowledgment.
    ///
    /// # Errors
    /// - `CaptureError::Length` if `frame` is not 8 bytes; nothing is sent
    /// - `CaptureError::Transport` if the link fails or closes while waiting
    pub async fn send(&mut self, frame: &[u8]) -> CaptureResult<()> {
        if frame.len() != FRAME_LEN {
            return Err(CaptureError::Length { len: frame.len() });
        }

        self.adapter.clear_input().await?;

        let mut packet = [0u8; FRAME_LEN + 1];
        packet[0] = FRAME_COMMAND;
        packet[1..].copy_from_slice(frame);
        self.adapter.write(&packet).await?;
        debug!("Sent LED frame {:02X?}, awaiting acknowledgment", frame);

        let mut byte = [0u8; 1];
        loop {
            let n = self.adapter.read(&mut byte).await?;
            if n == 0 {
                return Err(CaptureError::Transport(
                    "Dome link closed while awaiting acknowledgment".to_string(),
                ));
            }
            if byte[0] == FRAME_ACK {
                break;
            }
            trace!("Discarding byte 0x{:02X} while awaiting acknowledgment", byte[0]);
        }

        debug!("LED frame acknowledged");
        Ok(())
    }

    /// Release the adapter.
    pub fn into_inner(self) -> A {
        self.adapter
    }
}
