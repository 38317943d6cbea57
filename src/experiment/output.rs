//! Output directory allocation for capture sequences

use crate::error::{CaptureError, CaptureResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Prefix of per-sequence directories (`capture0`, `capture1`, ...)
pub const CAPTURE_DIR_PREFIX: &str = "capture";

/// Create the first free `captureN` directory under `root`.
///
/// `root` is created if missing. Probing creates the directory directly, so
/// two sequences racing for the same root never share a directory.
pub async fn allocate_capture_dir(root: &Path) -> CaptureResult<PathBuf> {
    tokio::fs::create_dir_all(root).await?;

    for n in 0..u32::MAX {
        let candidate = root.join(format!("{}{}", CAPTURE_DIR_PREFIX, n));
        match tokio::fs::create_dir(&candidate).await {
            Ok(()) => {
                debug!("Allocated output directory {}", candidate.display());
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(CaptureError::Configuration(format!(
        "No free capture directory left under {}",
        root.display()
    )))
}
