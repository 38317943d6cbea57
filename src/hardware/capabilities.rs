//! Capability traits for the capture rig
//!
//! The sequencer only talks to these traits, so any camera family or light
//! source that implements them can drive a sequence.
//!
//! - `Illuminator` - light source with single-light rotation
//! - `CaptureDevice` - camera that can focus, fire and hand over objects

use crate::error::CaptureResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use super::dome::LightIndex;

/// Device-assigned identifier of an image stored on the camera.
///
/// The image stays on the camera until the handle is deleted; every handle
/// produced by [`CaptureDevice::capture`] must be deleted exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaptureHandle(pub u32);

impl CaptureHandle {
    /// Raw object id
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CaptureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Light source addressed one light at a time or all at once.
#[async_trait]
pub trait Illuminator: Send {
    /// Light exactly one source.
    async fn activate(&mut self, index: LightIndex) -> CaptureResult<()>;

    /// Light every source and reset the rotation.
    async fn all_on(&mut self) -> CaptureResult<()>;

    /// Switch every source off and reset the rotation.
    async fn all_off(&mut self) -> CaptureResult<()>;

    /// Light the next source in rotation, returning the index lit.
    async fn advance(&mut self) -> CaptureResult<LightIndex>;
}

/// Camera capable of host-triggered capture.
#[async_trait]
pub trait CaptureDevice: Send {
    /// Put the camera into host-controlled shooting mode. Idempotent.
    async fn activate_mode(&mut self) -> CaptureResult<()>;

    /// Flash off (`false`) or auto (`true`).
    async fn set_flash(&mut self, enabled: bool) -> CaptureResult<()>;

    /// Stop the camera from refocusing.
    async fn lock_focus(&mut self) -> CaptureResult<()>;

    /// Allow the camera to focus again.
    async fn unlock_focus(&mut self) -> CaptureResult<()>;

    /// Focus on the current scene. Focus must be unlocked.
    async fn autofocus(&mut self) -> CaptureResult<()>;

    /// Fire the shutter and return the handle of the new image.
    async fn capture(&mut self) -> CaptureResult<CaptureHandle>;

    /// Write the image named by `handle` to `destination`, replacing any
    /// existing file.
    async fn download(&mut self, handle: CaptureHandle, destination: &Path) -> CaptureResult<()>;

    /// Remove the image from camera storage.
    async fn delete(&mut self, handle: CaptureHandle) -> CaptureResult<()>;

    /// Whether focus is currently locked.
    fn focus_locked(&self) -> bool;
}
