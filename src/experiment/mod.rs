//! Capture sequence orchestration
//!
//! - `sequencer` - the `CaptureSequencer` state machine driving the dome
//!   and the camera through a full light rotation
//! - `output` - per-sequence output directory allocation

pub mod output;
pub mod sequencer;

pub use output::allocate_capture_dir;
pub use sequencer::{
    CaptureSequencer, ProgressHooks, SequenceOptions, SequenceReport, SequenceState,
};
