//! Integration tests for the stereo weaving demo
//!
//! Everything runs against the simulated runtime and the software backend.

pub mod app;
pub mod display;
pub mod lifecycle;
pub mod render;
