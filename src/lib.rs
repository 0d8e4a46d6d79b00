//! LeiaSR stereoscopic weaving demo
//!
//! Acquires an SR context with retry, resolves the SR display, renders a
//! scene side by side for both eyes with off-axis projections and hands the
//! result to a weaver each frame. A `ContextInvalid` event from the runtime
//! tears everything down and rebuilds it on the next frame.
//!
//! The vendor runtime sits behind the traits in [`runtime`], [`display`] and
//! [`weaver`]; [`runtime::simulated`] implements them in-process on top of the
//! software backend in [`render`].

pub mod app;
pub mod config;
pub mod display;
pub mod error;
pub mod eyes;
pub mod lifecycle;
pub mod plugin;
pub mod poll;
pub mod projection;
pub mod render;
pub mod runtime;
pub mod scene;
pub mod weaver;
pub mod window;

pub use app::{AppControl, FrameReport, Platform, SceneSource, SimulatedPlatform, StereoApp};
pub use config::AppConfig;
pub use error::{AppError, AppResult, ExitStatus};
pub use plugin::StereoWeavePlugin;
