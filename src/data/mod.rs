//! Data files produced alongside captured images.

pub mod light_positions;
