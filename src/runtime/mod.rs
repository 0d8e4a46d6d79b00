//! SR runtime contracts
//!
//! The vendor runtime is a black box to this crate. These traits capture the
//! slice of it the stereo core depends on: context construction, display
//! lookup, system events and the eye-pair stream. [`simulated`] provides an
//! in-process implementation used by the demo binary and the tests.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;
use thiserror::Error;

use crate::display::{DisplayManager, DisplayManagerProbe, LegacyDisplay};
use crate::eyes::EyePair;

pub mod events;
pub mod simulated;

pub use events::{SystemEvent, SystemEventListener, SystemEventType};

/// Errors surfaced by the runtime bindings
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    /// The SR service is not running (yet); callers may retry
    #[error("SR service not available")]
    ServiceUnavailable,

    #[error("SR runtime rejected the request: {0}")]
    Rejected(String),

    #[error("weaver creation failed: {0}")]
    WeaverCreation(String),

    #[error("failed to open {stream} stream: {reason}")]
    Stream { stream: &'static str, reason: String },
}

impl RuntimeError {
    #[inline]
    pub fn is_retriable(&self) -> bool {
        matches!(self, RuntimeError::ServiceUnavailable)
    }
}

/// Callback invoked by the runtime for every system event
pub type SystemEventCallback = Arc<dyn Fn(&SystemEvent) + Send + Sync>;

/// Callback invoked by the runtime for every tracked eye pair
pub type EyePairCallback = Arc<dyn Fn(&EyePair) + Send + Sync>;

/// Opaque subscription handle returned when a stream is opened
///
/// Dropping the token closes the stream.
pub struct StreamToken {
    close: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl StreamToken {
    pub fn new(close: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            close: Some(Box::new(close)),
        }
    }

    /// Token for a stream that needs no explicit shutdown
    pub fn detached() -> Self {
        Self { close: None }
    }
}

impl Drop for StreamToken {
    fn drop(&mut self) {
        if let Some(close) = self.close.take() {
            close();
        }
    }
}

impl fmt::Debug for StreamToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamToken")
            .field("open", &self.close.is_some())
            .finish()
    }
}

/// Entry point of the runtime: builds contexts
pub trait SrRuntime: Send + Sync {
    /// Construct a new context; `ServiceUnavailable` while the service starts
    fn create_context(&self) -> Result<Box<dyn SrContext>, RuntimeError>;

    /// How this runtime exposes the modern display manager, if at all
    fn display_probe(&self) -> Arc<dyn DisplayManagerProbe>;
}

/// A live connection to the SR service
///
/// Dropping the box deletes the context. Objects created from it (weaver,
/// listeners, displays) must be released first.
pub trait SrContext: Send + Sync {
    /// Native handle passed to late-bound runtime entry points
    fn raw_handle(&self) -> *mut c_void {
        std::ptr::null_mut()
    }

    /// Wrap a manager pointer returned by a late-bound entry point
    fn adopt_display_manager(&self, _raw: NonNull<c_void>) -> Option<Box<dyn DisplayManager>> {
        None
    }

    /// Per-context display object of runtimes without a display manager
    fn legacy_display(&self) -> Option<Box<dyn LegacyDisplay>>;

    fn open_system_event_stream(
        &self,
        callback: SystemEventCallback,
    ) -> Result<StreamToken, RuntimeError>;

    fn open_eye_pair_stream(&self, callback: EyePairCallback) -> Result<StreamToken, RuntimeError>;

    /// Finalize the context; must come after the weaver has been created
    fn initialize(&self);
}
