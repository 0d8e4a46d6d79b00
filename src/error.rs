use std::fmt;
use thiserror::Error;

use crate::lifecycle::LifecycleError;
use crate::render::RenderError;
use crate::scene::SceneError;

/// Process exit codes reported by the demo binary
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    Success = 0,
    ServiceUnavailable = 1,
    WindowClassRegistration = 2,
    WindowCreation = 3,
    MonitorDpiQuery = 4,
    GraphicsInit = 5,
    RuntimeInit = 6,
    SceneLoad = 7,
    ContextRebuild = 8,
    BackbufferResize = 9,
}

impl ExitStatus {
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn is_success(self) -> bool {
        self == ExitStatus::Success
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExitStatus::Success => "success",
            ExitStatus::ServiceUnavailable => "SR service not available",
            ExitStatus::WindowClassRegistration => "failed to register window class",
            ExitStatus::WindowCreation => "failed to create window",
            ExitStatus::MonitorDpiQuery => "failed to query monitor DPI",
            ExitStatus::GraphicsInit => "failed to initialize graphics",
            ExitStatus::RuntimeInit => "failed to initialize SR runtime",
            ExitStatus::SceneLoad => "failed to load scene",
            ExitStatus::ContextRebuild => "failed to re-initialize SR after context destruction",
            ExitStatus::BackbufferResize => "failed to resize buffers",
        };
        write!(f, "{} (exit code {})", label, self.code())
    }
}

impl From<ExitStatus> for bevy::app::AppExit {
    fn from(status: ExitStatus) -> Self {
        bevy::app::AppExit::from_code(status.code())
    }
}

/// Fatal application error carrying the exit status it maps to
#[derive(Debug, Error)]
pub enum AppError {
    #[error("SR context could not be acquired: {0}")]
    Startup(#[source] LifecycleError),

    #[error("SR runtime installation failed: {0}")]
    Install(#[source] LifecycleError),

    #[error("SR context rebuild failed: {0}")]
    Rebuild(#[source] LifecycleError),

    #[error("graphics initialization failed: {0}")]
    Graphics(#[source] RenderError),

    #[error("backbuffer resize failed: {0}")]
    Resize(#[source] RenderError),

    #[error("scene load failed: {0}")]
    Scene(#[from] SceneError),
}

impl AppError {
    /// Exit status the process terminates with for this error
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            AppError::Startup(_) => ExitStatus::ServiceUnavailable,
            AppError::Install(_) => ExitStatus::RuntimeInit,
            AppError::Rebuild(_) => ExitStatus::ContextRebuild,
            AppError::Graphics(_) => ExitStatus::GraphicsInit,
            AppError::Resize(_) => ExitStatus::BackbufferResize,
            AppError::Scene(_) => ExitStatus::SceneLoad,
        }
    }
}

/// Result type for application bring-up and the frame loop
pub type AppResult<T> = Result<T, AppError>;
