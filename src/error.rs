//! Custom error types for the capture rig.
//!
//! `CaptureError` is the single error type for the library. It groups the
//! failure modes of the two device links and of the sequencer:
//!
//! - **Transport**: opening, writing or reading a link failed (`Transport`,
//!   `Io`, `TransportTimeout`). `TransportTimeout` is the only variant the
//!   script layer treats as transient.
//! - **`ResponseTimeout`**: a script call kept timing out until its retry
//!   budget ran out.
//! - **`Protocol`**: the camera answered a script request with a non-OK
//!   response code.
//! - **`Length`** / **`OutOfRange`**: a malformed dome frame or light index.
//!   Nothing is sent when either is raised.
//! - **`CaptureIncomplete`**: the camera's event stream ended before it
//!   reported a new object.
//! - **`Storage`**: downloading or deleting an object on the camera failed.
//! - **`LightPositions`**: the light-position rewrite rejected its inputs.
//! - **`Config`** / **`Configuration`**: settings could not be loaded, or
//!   loaded but failed validation.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type CaptureResult<T> = std::result::Result<T, CaptureError>;

/// Errors raised by the dome link, the camera and the capture sequencer.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out waiting for a device response")]
    TransportTimeout,

    #[error("No script response after {attempts} attempts ({elapsed:?})")]
    ResponseTimeout { attempts: u32, elapsed: Duration },

    #[error("Script response code indicates failure: 0x{code:04X}")]
    Protocol { code: u16 },

    #[error("LED frame must be exactly 8 bytes, got {len}")]
    Length { len: usize },

    #[error("LED index {index} out of range (0-63)")]
    OutOfRange { index: usize },

    #[error("Capture did not complete: event stream ended before an object was added")]
    CaptureIncomplete,

    #[error("Storage error for object 0x{handle:08X}: {reason}")]
    Storage { handle: u32, reason: String },

    #[error("Light position file error: {0}")]
    LightPositions(#[from] LightPositionError),
}

/// Failures of the light-position file rewrite.
#[derive(Error, Debug)]
pub enum LightPositionError {
    #[error("Cannot read base file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Base file {path} does not start with a light count")]
    MissingCount { path: PathBuf },

    #[error("Base file declares {declared} lights but {supplied} images were supplied")]
    CountMismatch { declared: usize, supplied: usize },

    #[error("Base file ends after {found} of {declared} light lines")]
    Truncated { declared: usize, found: usize },

    #[error("Cannot write output file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
