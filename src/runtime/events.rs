//! System events delivered by the SR runtime
//!
//! The runtime pushes tagged events from its own threads. Only
//! `ContextInvalid` changes application behaviour; every other kind is logged.

use bevy::prelude::{debug, info, warn};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{RuntimeError, SrContext, StreamToken, SystemEventCallback};

/// Kind of a runtime system event, numbered as on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemEventType {
    Info,
    ContextInvalid,
    SrUnavailable,
    SrRestored,
    UsbNotConnected,
    UsbNotConnectedResolved,
    DisplayNotConnected,
    DisplayNotConnectedResolved,
    Duplicated,
    DuplicatedResolved,
    NonNativeResolution,
    NonNativeResolutionResolved,
    DeviceConnectedAndReady,
    DeviceDisconnected,
    LensOn,
    LensOff,
    UserFound,
    UserLost,
    Unknown(u64),
}

impl SystemEventType {
    pub fn from_raw(raw: u64) -> Self {
        use SystemEventType::*;
        match raw {
            0 => Info,
            1 => ContextInvalid,
            2 => SrUnavailable,
            3 => SrRestored,
            4 => UsbNotConnected,
            5 => UsbNotConnectedResolved,
            6 => DisplayNotConnected,
            7 => DisplayNotConnectedResolved,
            8 => Duplicated,
            9 => DuplicatedResolved,
            10 => NonNativeResolution,
            11 => NonNativeResolutionResolved,
            12 => DeviceConnectedAndReady,
            13 => DeviceDisconnected,
            14 => LensOn,
            15 => LensOff,
            16 => UserFound,
            17 => UserLost,
            other => Unknown(other),
        }
    }

    pub fn raw(self) -> u64 {
        use SystemEventType::*;
        match self {
            Info => 0,
            ContextInvalid => 1,
            SrUnavailable => 2,
            SrRestored => 3,
            UsbNotConnected => 4,
            UsbNotConnectedResolved => 5,
            DisplayNotConnected => 6,
            DisplayNotConnectedResolved => 7,
            Duplicated => 8,
            DuplicatedResolved => 9,
            NonNativeResolution => 10,
            NonNativeResolutionResolved => 11,
            DeviceConnectedAndReady => 12,
            DeviceDisconnected => 13,
            LensOn => 14,
            LensOff => 15,
            UserFound => 16,
            UserLost => 17,
            Unknown(raw) => raw,
        }
    }

    /// Whether the core has to act on this event
    #[inline]
    pub fn is_action_bearing(self) -> bool {
        self == SystemEventType::ContextInvalid
    }

    pub fn name(self) -> &'static str {
        use SystemEventType::*;
        match self {
            Info => "Info",
            ContextInvalid => "ContextInvalid",
            SrUnavailable => "SRUnavailable",
            SrRestored => "SRRestored",
            UsbNotConnected => "USBNotConnected",
            UsbNotConnectedResolved => "USBNotConnectedResolved",
            DisplayNotConnected => "DisplayNotConnected",
            DisplayNotConnectedResolved => "DisplayNotConnectedResolved",
            Duplicated => "Duplicated",
            DuplicatedResolved => "DuplicatedResolved",
            NonNativeResolution => "NonNativeResolution",
            NonNativeResolutionResolved => "NonNativeResolutionResolved",
            DeviceConnectedAndReady => "DeviceConnectedAndReady",
            DeviceDisconnected => "DeviceDisconnected",
            LensOn => "LensOn",
            LensOff => "LensOff",
            UserFound => "UserFound",
            UserLost => "UserLost",
            Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for SystemEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single event: wall-clock time in microseconds, kind and message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemEvent {
    pub timestamp_us: u64,
    pub event_type: SystemEventType,
    pub message: String,
}

impl SystemEvent {
    pub fn new(timestamp_us: u64, event_type: SystemEventType, message: impl Into<String>) -> Self {
        Self {
            timestamp_us,
            event_type,
            message: message.into(),
        }
    }

    /// Event equivalent to the runtime's own `ContextInvalid`, stamped now
    pub fn synthetic_context_invalid() -> Self {
        Self::new(
            now_micros(),
            SystemEventType::ContextInvalid,
            "ContextInvalidEvent",
        )
    }
}

/// Microseconds since the Unix epoch
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Subscription to the runtime's system event stream
///
/// Every event goes through [`SystemEventListener::accept`], whether it came
/// from the runtime thread or was injected by the application. Dropping the
/// listener closes the stream before the handler is released.
pub struct SystemEventListener {
    stream: Option<StreamToken>,
    handler: SystemEventCallback,
}

impl SystemEventListener {
    /// Open the event stream of `context` and route it into `handler`
    pub fn open(
        context: &dyn SrContext,
        handler: SystemEventCallback,
    ) -> Result<Self, RuntimeError> {
        let routed = Arc::clone(&handler);
        let callback: SystemEventCallback = Arc::new(move |event: &SystemEvent| {
            log_event(event);
            routed(event);
        });
        let stream = context.open_system_event_stream(callback)?;
        Ok(Self {
            stream: Some(stream),
            handler,
        })
    }

    /// Entry point shared by runtime-delivered and synthetic events
    pub fn accept(&self, event: &SystemEvent) {
        log_event(event);
        (self.handler)(event);
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for SystemEventListener {
    fn drop(&mut self) {
        // Close the stream first so no callback can observe a half-dropped handler.
        self.stream.take();
    }
}

fn log_event(event: &SystemEvent) {
    match event.event_type {
        SystemEventType::ContextInvalid => {
            warn!("System Event: ContextInvalid ({})", event.message)
        }
        SystemEventType::Unknown(raw) => info!("System Event: Unknown ({})", raw),
        SystemEventType::Info => debug!("System Event: Info ({})", event.message),
        other => info!("System Event: {}", other),
    }
}
