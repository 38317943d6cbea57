//! Camera driven through on-camera Lua scripts
//!
//! Every camera operation is a short Lua script run through
//! [`ScriptProtocol`] and waited on until it stops. Object transfer uses the
//! plain PTP session underneath.
//!
//! # Example Usage
//!
//! ```no_run
//! use rticap::config::CameraSettings;
//! use rticap::hardware::capabilities::CaptureDevice;
//! use rticap::hardware::script_camera::ScriptCamera;
//! use rticap::ptp::{DeviceIdentity, MockPtpTransport, PtpSession};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = PtpSession::new(MockPtpTransport::new(), 1);
//!     let mut camera = ScriptCamera::new(session, DeviceIdentity::default(), &CameraSettings::default());
//!
//!     let handle = camera.capture().await?;
//!     camera.download(handle, "frame.jpg".as_ref()).await?;
//!     camera.delete(handle).await?;
//!     Ok(())
//! }
//! ```

use super::capabilities::{CaptureDevice, CaptureHandle};
use crate::config::CameraSettings;
use crate::error::{CaptureError, CaptureResult};
use crate::ptp::{
    event_code, DeviceIdentity, PtpSession, PtpTransport, ScriptLanguage, ScriptProtocol,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, trace, warn};

/// Switch to USB-controlled record mode and spin on the camera until the
/// mode change has taken effect.
const ACTIVATE_SHOOTING_MODE: &str = "
switch_mode_usb(1)
rec,vid,mode=get_mode()
while rec == false do
    rec,vid,mode=get_mode()
end
";
const LOCK_FOCUS: &str = "set_aflock(1)";
const UNLOCK_FOCUS: &str = "set_aflock(0)";
const HALF_PRESS: &str = "press('shoot_half')";
const SHOOT: &str = "shoot()";

/// Camera controlled through the scripting extension.
///
/// Owns the session for its whole lifetime; one instance per camera.
pub struct ScriptCamera<T: PtpTransport> {
    script: ScriptProtocol<T>,
    identity: DeviceIdentity,
    flash_property: u16,
    flash_off_value: i32,
    flash_auto_value: i32,
    autofocus_settle: Duration,
    focus_locked: bool,
}

impl<T: PtpTransport> ScriptCamera<T> {
    /// Wrap an opened session.
    pub fn new(session: PtpSession<T>, identity: DeviceIdentity, settings: &CameraSettings) -> Self {
        info!(
            "Camera ready: model '{}', serial '{}', vendor extension 0x{:08X}",
            identity.model, identity.serial_number, identity.vendor_extension_id
        );
        Self {
            script: ScriptProtocol::new(
                session,
                settings.response_retry.clone(),
                settings.status_poll(),
            ),
            identity,
            flash_property: settings.flash_property,
            flash_off_value: settings.flash_off_value,
            flash_auto_value: settings.flash_auto_value,
            autofocus_settle: settings.autofocus_settle(),
            focus_locked: false,
        }
    }

    /// Informational device data
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Script layer, for running custom scripts
    pub fn script_protocol(&mut self) -> &mut ScriptProtocol<T> {
        &mut self.script
    }

    async fn run(&mut self, script: &str) -> CaptureResult<()> {
        self.script
            .execute(script, ScriptLanguage::Lua, true)
            .await
            .map(|_| ())
    }

    async fn wait_for_new_object(&mut self) -> CaptureResult<CaptureHandle> {
        let transport = self.script.session_mut().transport_mut();
        loop {
            let event = transport
                .check_for_event()
                .await?
                .ok_or(CaptureError::CaptureIncomplete)?;
            if event.code == event_code::OBJECT_ADDED {
                let id = event
                    .params
                    .first()
                    .copied()
                    .ok_or(CaptureError::CaptureIncomplete)?;
                return Ok(CaptureHandle(id));
            }
            trace!("Skipping event 0x{:04X} while waiting for capture", event.code);
        }
    }

    async fn fetch_object(&mut self, handle: CaptureHandle, path: &Path) -> CaptureResult<u64> {
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| CaptureError::Storage {
                handle: handle.id(),
                reason: format!("cannot create {}: {}", path.display(), e),
            })?;
        let bytes = self
            .script
            .session_mut()
            .transport_mut()
            .get_object(handle.id(), &mut file)
            .await?;
        file.flush().await.map_err(|e| CaptureError::Storage {
            handle: handle.id(),
            reason: format!("cannot flush {}: {}", path.display(), e),
        })?;
        Ok(bytes)
    }
}

/// Sibling of `destination` that receives the transfer before it is renamed
/// into place.
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[async_trait]
impl<T: PtpTransport> CaptureDevice for ScriptCamera<T> {
    async fn activate_mode(&mut self) -> CaptureResult<()> {
        self.run(ACTIVATE_SHOOTING_MODE).await
    }

    async fn set_flash(&mut self, enabled: bool) -> CaptureResult<()> {
        self.activate_mode().await?;
        let value = if enabled {
            self.flash_auto_value
        } else {
            self.flash_off_value
        };
        debug!(
            "Setting flash {} (property {} = {})",
            if enabled { "auto" } else { "off" },
            self.flash_property,
            value
        );
        let script = format!("set_prop({},{})", self.flash_property, value);
        self.run(&script).await
    }

    async fn lock_focus(&mut self) -> CaptureResult<()> {
        self.activate_mode().await?;
        self.run(LOCK_FOCUS).await?;
        self.focus_locked = true;
        Ok(())
    }

    async fn unlock_focus(&mut self) -> CaptureResult<()> {
        self.activate_mode().await?;
        self.run(UNLOCK_FOCUS).await?;
        self.focus_locked = false;
        Ok(())
    }

    async fn autofocus(&mut self) -> CaptureResult<()> {
        self.activate_mode().await?;
        self.run(HALF_PRESS).await?;
        // Locking focus before the half-press settles can hang the camera.
        tokio::time::sleep(self.autofocus_settle).await;
        Ok(())
    }

    async fn capture(&mut self) -> CaptureResult<CaptureHandle> {
        self.activate_mode().await?;
        debug!("Firing shutter");
        self.run(SHOOT).await?;
        let handle = self.wait_for_new_object().await?;
        debug!("Capture stored as object {}", handle);
        Ok(handle)
    }

    async fn download(&mut self, handle: CaptureHandle, destination: &Path) -> CaptureResult<()> {
        let partial = partial_path(destination);
        let bytes = match self.fetch_object(handle, &partial).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!("Could not remove {}: {}", partial.display(), cleanup);
                    }
                }
                return Err(e);
            }
        };
        tokio::fs::rename(&partial, destination)
            .await
            .map_err(|e| CaptureError::Storage {
                handle: handle.id(),
                reason: format!("cannot move image to {}: {}", destination.display(), e),
            })?;
        debug!(
            "Downloaded object {} ({} bytes) to {}",
            handle,
            bytes,
            destination.display()
        );
        Ok(())
    }

    async fn delete(&mut self, handle: CaptureHandle) -> CaptureResult<()> {
        self.script
            .session_mut()
            .transport_mut()
            .delete_object(handle.id())
            .await?;
        debug!("Deleted object {}", handle);
        Ok(())
    }

    fn focus_locked(&self) -> bool {
        self.focus_locked
    }
}
