//! Mock Hardware Implementations
//!
//! Simulated rig devices for testing without physical hardware. Both mocks
//! append to one shared [`RigLog`], so tests can check the interleaving of
//! light and camera operations across devices.
//!
//! # Available Mocks
//!
//! - `MockDome` - light source that records every frame it would send
//! - `MockCamera` - camera that hands out sequential handles and writes
//!   placeholder image files

use super::capabilities::{CaptureDevice, CaptureHandle, Illuminator};
use super::dome::{LightIndex, LED_COUNT};
use crate::error::{CaptureError, CaptureResult};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// One observable rig operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RigEvent {
    /// Every LED switched off
    AllOff,
    /// Every LED switched on
    AllOn,
    /// One LED lit
    Light(usize),
    /// Camera entered shooting mode
    ModeActivated,
    /// Flash set (true = auto)
    Flash(bool),
    /// Focus locked
    FocusLocked,
    /// Focus unlocked
    FocusUnlocked,
    /// Half-press focus
    Autofocus,
    /// Shutter fired, producing a handle
    Captured(CaptureHandle),
    /// Object written to a path
    Downloaded(CaptureHandle, PathBuf),
    /// Object removed from the card
    Deleted(CaptureHandle),
}

/// Shared, ordered record of rig operations
#[derive(Clone, Default)]
pub struct RigLog {
    events: Arc<Mutex<Vec<RigEvent>>>,
}

impl RigLog {
    /// Empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events so far
    pub fn events(&self) -> Vec<RigEvent> {
        self.lock().clone()
    }

    /// Number of events matching a predicate
    pub fn count(&self, predicate: impl Fn(&RigEvent) -> bool) -> usize {
        self.lock().iter().filter(|e| predicate(e)).count()
    }

    fn push(&self, event: RigEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RigEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// =============================================================================
// MockDome - Simulated light dome
// =============================================================================

/// Mock dome with the same rotation rules as the real controller
pub struct MockDome {
    log: RigLog,
    cursor: usize,
}

impl MockDome {
    /// Create a dome writing to `log`
    pub fn new(log: RigLog) -> Self {
        Self { log, cursor: 0 }
    }
}

#[async_trait]
impl Illuminator for MockDome {
    async fn activate(&mut self, index: LightIndex) -> CaptureResult<()> {
        self.log.push(RigEvent::Light(index.get()));
        Ok(())
    }

    async fn all_on(&mut self) -> CaptureResult<()> {
        self.cursor = 0;
        self.log.push(RigEvent::AllOn);
        Ok(())
    }

    async fn all_off(&mut self) -> CaptureResult<()> {
        self.cursor = 0;
        self.log.push(RigEvent::AllOff);
        Ok(())
    }

    async fn advance(&mut self) -> CaptureResult<LightIndex> {
        let index = LightIndex::new(self.cursor)?;
        self.activate(index).await?;
        self.cursor = (self.cursor + 1) % LED_COUNT;
        Ok(index)
    }
}

// =============================================================================
// MockCamera - Simulated camera
// =============================================================================

/// Mock camera with failure injection
///
/// Handles start at 1 and increase by one per capture.
pub struct MockCamera {
    log: RigLog,
    next_handle: u32,
    stored: BTreeSet<CaptureHandle>,
    focus_locked: bool,
    fail_capture_at: Option<u32>,
    fail_download_of: Option<CaptureHandle>,
    fail_delete_of: Option<CaptureHandle>,
}

impl MockCamera {
    /// Create a camera writing to `log`
    pub fn new(log: RigLog) -> Self {
        Self {
            log,
            next_handle: 1,
            stored: BTreeSet::new(),
            focus_locked: false,
            fail_capture_at: None,
            fail_download_of: None,
            fail_delete_of: None,
        }
    }

    /// The `n`th capture (1-based) fails with `CaptureIncomplete`.
    pub fn fail_capture_at(mut self, n: u32) -> Self {
        self.fail_capture_at = Some(n);
        self
    }

    /// Downloading this handle fails with a storage error.
    pub fn fail_download_of(mut self, handle: CaptureHandle) -> Self {
        self.fail_download_of = Some(handle);
        self
    }

    /// Deleting this handle fails with a storage error.
    pub fn fail_delete_of(mut self, handle: CaptureHandle) -> Self {
        self.fail_delete_of = Some(handle);
        self
    }

    /// Handles still on the simulated card
    pub fn stored(&self) -> Vec<CaptureHandle> {
        self.stored.iter().copied().collect()
    }
}

#[async_trait]
impl CaptureDevice for MockCamera {
    async fn activate_mode(&mut self) -> CaptureResult<()> {
        self.log.push(RigEvent::ModeActivated);
        Ok(())
    }

    async fn set_flash(&mut self, enabled: bool) -> CaptureResult<()> {
        self.log.push(RigEvent::Flash(enabled));
        Ok(())
    }

    async fn lock_focus(&mut self) -> CaptureResult<()> {
        self.focus_locked = true;
        self.log.push(RigEvent::FocusLocked);
        Ok(())
    }

    async fn unlock_focus(&mut self) -> CaptureResult<()> {
        self.focus_locked = false;
        self.log.push(RigEvent::FocusUnlocked);
        Ok(())
    }

    async fn autofocus(&mut self) -> CaptureResult<()> {
        if self.focus_locked {
            return Err(CaptureError::Transport(
                "MockCamera: autofocus with focus locked".to_string(),
            ));
        }
        self.log.push(RigEvent::Autofocus);
        Ok(())
    }

    async fn capture(&mut self) -> CaptureResult<CaptureHandle> {
        let n = self.next_handle;
        if self.fail_capture_at == Some(n) {
            return Err(CaptureError::CaptureIncomplete);
        }
        self.next_handle += 1;
        let handle = CaptureHandle(n);
        self.stored.insert(handle);
        self.log.push(RigEvent::Captured(handle));
        Ok(handle)
    }

    async fn download(&mut self, handle: CaptureHandle, destination: &Path) -> CaptureResult<()> {
        if self.fail_download_of == Some(handle) || !self.stored.contains(&handle) {
            return Err(CaptureError::Storage {
                handle: handle.id(),
                reason: "download failed".to_string(),
            });
        }
        tokio::fs::write(destination, format!("mock image {}", handle.id())).await?;
        self.log
            .push(RigEvent::Downloaded(handle, destination.to_path_buf()));
        Ok(())
    }

    async fn delete(&mut self, handle: CaptureHandle) -> CaptureResult<()> {
        if self.fail_delete_of == Some(handle) || !self.stored.remove(&handle) {
            return Err(CaptureError::Storage {
                handle: handle.id(),
                reason: "delete failed".to_string(),
            });
        }
        self.log.push(RigEvent::Deleted(handle));
        Ok(())
    }

    fn focus_locked(&self) -> bool {
        self.focus_locked
    }
}
