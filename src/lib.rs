//! Core library for the rticap capture controller.
//!
//! Drives single-light RTI capture on a rig made of a scripting-capable
//! camera (controlled over PTP) and a 64-LED serial dome. The library holds
//! the device drivers, the capture sequencer and the light-position file
//! handling; the `rticap` binary wraps them in a command-line tool.
//!
//! # Layout
//!
//! - [`adapters`] - byte transports (serial line, in-memory mock)
//! - [`hardware`] - dome controller, script-driven camera, capability traits
//! - [`ptp`] - PTP session and the scripting extension on top of it
//! - [`experiment`] - capture sequencer and output directory allocation
//! - [`data`] - light-position file rewrite
//! - [`config`] - layered settings (defaults, TOML, environment)

pub mod adapters;
pub mod config;
pub mod data;
pub mod error;
pub mod error_recovery;
pub mod experiment;
pub mod hardware;
pub mod ptp;
