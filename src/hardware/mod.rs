//! Hardware drivers and capability traits
//!
//! - `capabilities` - the `Illuminator` and `CaptureDevice` seams the
//!   sequencer depends on
//! - `dome_link` / `dome` - serial LED dome framing and its stateful controller
//! - `script_camera` - camera driven through on-camera scripts over PTP
//! - `mock` - simulated devices sharing an ordered event log

pub mod capabilities;
pub mod dome;
pub mod dome_link;
pub mod mock;
pub mod script_camera;

pub use capabilities::{CaptureDevice, CaptureHandle, Illuminator};
pub use dome::{LedDomeController, LightIndex, LitState};
pub use dome_link::LedDomeLink;
pub use script_camera::ScriptCamera;
