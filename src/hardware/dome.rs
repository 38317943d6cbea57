//! 64-LED light dome controller
//!
//! The dome is an 8x8 LED matrix. A frame carries one byte per segment
//! (`index / 8`), and each byte addresses its 8 LEDs MSB first: LED
//! `index % 8 == 0` is bit `0x80`, LED 7 is bit `0x01`.
//!
//! # Example Usage
//!
//! ```no_run
//! use rticap::config::DomeSettings;
//! use rticap::hardware::capabilities::Illuminator;
//! use rticap::hardware::dome::LedDomeController;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut dome = LedDomeController::open_serial(&DomeSettings::default()).await?;
//!     dome.all_off().await?;
//!     for _ in 0..64 {
//!         dome.advance().await?;
//!     }
//!     Ok(())
//! }
//! ```

use super::capabilities::Illuminator;
use super::dome_link::{LedDomeLink, FRAME_LEN};
use crate::adapters::Adapter;
use crate::error::{CaptureError, CaptureResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Number of addressable LEDs
pub const LED_COUNT: usize = 64;
/// LEDs per segment byte
pub const LEDS_PER_SEGMENT: usize = 8;

/// Index of one LED, guaranteed to be in `0..64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LightIndex(u8);

impl LightIndex {
    /// Validate a raw index.
    ///
    /// # Errors
    /// `CaptureError::OutOfRange` for 64 and above
    pub fn new(index: usize) -> CaptureResult<Self> {
        if index >= LED_COUNT {
            return Err(CaptureError::OutOfRange { index });
        }
        Ok(Self(index as u8))
    }

    /// Raw index
    pub fn get(self) -> usize {
        self.0 as usize
    }

    /// Segment (frame byte) holding this LED
    pub fn segment(self) -> usize {
        self.get() / LEDS_PER_SEGMENT
    }

    /// Position of this LED within its segment byte
    pub fn bit_position(self) -> usize {
        self.get() % LEDS_PER_SEGMENT
    }

    /// Frame lighting only this LED
    pub fn frame(self) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        frame[self.segment()] = 0x80 >> self.bit_position();
        frame
    }
}

impl fmt::Display for LightIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the dome was last told to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LitState {
    /// All LEDs off (also the state before the first frame)
    None,
    /// Exactly one LED lit
    Single(LightIndex),
    /// Every LED lit
    All,
}

/// Stateful dome controller owning the serial link.
///
/// Not safe for concurrent callers; one controller per physical dome.
pub struct LedDomeController<A: Adapter> {
    link: LedDomeLink<A>,
    cursor: usize,
    lit: LitState,
}

impl<A: Adapter> LedDomeController<A> {
    /// Open a controller over an adapter, waiting `settle` before returning.
    pub async fn new(adapter: A, settle: Duration) -> Self {
        Self {
            link: LedDomeLink::open(adapter, settle).await,
            cursor: 0,
            lit: LitState::None,
        }
    }

    /// Light exactly one LED by raw index.
    ///
    /// # Errors
    /// `CaptureError::OutOfRange` for 64 and above; no frame is sent
    pub async fn activate_single(&mut self, index: usize) -> CaptureResult<()> {
        let index = LightIndex::new(index)?;
        self.activate(index).await
    }

    /// Next LED `advance` will light
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Last state sent to the dome
    pub fn lit(&self) -> LitState {
        self.lit
    }

    /// Release the underlying adapter.
    pub fn into_adapter(self) -> A {
        self.link.into_inner()
    }
}

#[cfg(feature = "instrument_serial")]
impl LedDomeController<crate::adapters::SerialAdapter> {
    /// Open the dome on the configured serial port.
    pub async fn open_serial(settings: &crate::config::DomeSettings) -> CaptureResult<Self> {
        let adapter = crate::adapters::SerialAdapter::open(&settings.port, settings.baud_rate)?;
        Ok(Self::new(adapter, settings.settle()).await)
    }
}

#[async_trait]
impl<A: Adapter> Illuminator for LedDomeController<A> {
    async fn activate(&mut self, index: LightIndex) -> CaptureResult<()> {
        debug!("Activating LED {}", index);
        self.link.send(&index.frame()).await?;
        self.lit = LitState::Single(index);
        Ok(())
    }

    async fn all_on(&mut self) -> CaptureResult<()> {
        self.cursor = 0;
        self.link.send(&[0xFF; FRAME_LEN]).await?;
        self.lit = LitState::All;
        Ok(())
    }

    async fn all_off(&mut self) -> CaptureResult<()> {
        self.cursor = 0;
        self.link.send(&[0x00; FRAME_LEN]).await?;
        self.lit = LitState::None;
        Ok(())
    }

    async fn advance(&mut self) -> CaptureResult<LightIndex> {
        let index = LightIndex::new(self.cursor)?;
        self.activate(index).await?;
        self.cursor = (self.cursor + 1) % LED_COUNT;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAdapter;

    async fn controller() -> (LedDomeController<MockAdapter>, MockAdapter) {
        let wire = MockAdapter::new();
        (LedDomeController::new(wire.clone(), Duration::ZERO).await, wire)
    }

    #[test]
    fn test_every_index_sets_one_bit() {
        for raw in 0..LED_COUNT {
            let frame = LightIndex::new(raw).unwrap().frame();
            let ones: u32 = frame.iter().map(|b| b.count_ones()).sum();
            assert_eq!(ones, 1, "index {}", raw);
            assert_eq!(frame[raw / 8], 0x80 >> (raw % 8), "index {}", raw);
        }
    }

    #[test]
    fn test_frame_examples() {
        assert_eq!(LightIndex::new(0).unwrap().frame(), [0x80, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(LightIndex::new(9).unwrap().frame(), [0, 0x40, 0, 0, 0, 0, 0, 0]);
        assert_eq!(LightIndex::new(63).unwrap().frame(), [0, 0, 0, 0, 0, 0, 0, 0x01]);
    }

    #[tokio::test]
    async fn test_out_of_range_sends_nothing() {
        let (mut dome, wire) = controller().await;
        for raw in [64, 65, 255, 1000] {
            let err = dome.activate_single(raw).await.unwrap_err();
            assert!(matches!(err, CaptureError::OutOfRange { index } if index == raw));
        }
        assert!(wire.writes().is_empty());
        assert_eq!(dome.lit(), LitState::None);
    }

    #[tokio::test]
    async fn test_advance_visits_every_light_then_wraps() {
        let (mut dome, wire) = controller().await;

        for expected in 0..LED_COUNT {
            let lit = dome.advance().await.unwrap();
            assert_eq!(lit.get(), expected);
        }
        assert_eq!(dome.cursor(), 0);
        assert_eq!(dome.advance().await.unwrap().get(), 0);

        let writes = wire.writes();
        assert_eq!(writes.len(), LED_COUNT + 1);
        for (i, packet) in writes.iter().take(LED_COUNT).enumerate() {
            assert_eq!(packet[0], 0x42);
            assert_eq!(&packet[1..], &LightIndex::new(i).unwrap().frame());
        }
    }

    #[tokio::test]
    async fn test_bulk_frames_reset_rotation() {
        let (mut dome, wire) = controller().await;
        dome.advance().await.unwrap();
        dome.advance().await.unwrap();
        assert_eq!(dome.cursor(), 2);

        dome.all_on().await.unwrap();
        assert_eq!(dome.cursor(), 0);
        assert_eq!(dome.lit(), LitState::All);

        dome.advance().await.unwrap();
        dome.all_off().await.unwrap();
        assert_eq!(dome.cursor(), 0);
        assert_eq!(dome.lit(), LitState::None);

        let writes = wire.writes();
        assert_eq!(&writes[2][1..], &[0xFF; 8]);
        assert_eq!(&writes[4][1..], &[0x00; 8]);
    }

    #[tokio::test]
    async fn test_single_activation_tracks_state() {
        let (mut dome, _wire) = controller().await;
        dome.activate_single(17).await.unwrap();
        assert_eq!(dome.lit(), LitState::Single(LightIndex::new(17).unwrap()));
        assert_eq!(dome.cursor(), 0);
    }
}
