//! Weaver adapter
//!
//! The weaver is the runtime component that interleaves the side-by-side view
//! texture into the panel's native sub-pixel pattern. Modern weavers are
//! released through their own `destroy` call, legacy ones are simply dropped;
//! [`WeaverHandle`] keeps that distinction in one place.

use bevy::math::UVec2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::eyes::EyePair;
use crate::render::{ColorSpacePolicy, TextureFormat, ViewTextureHandle};
use crate::runtime::{RuntimeError, SrContext};

/// Frames between `weave` and scan-out assumed by default
pub const DEFAULT_LATENCY_FRAMES: u32 = 2;

/// Pipeline latency hint used for eye extrapolation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyPolicy {
    Frames(u32),
    Microseconds(u64),
}

impl Default for LatencyPolicy {
    fn default() -> Self {
        LatencyPolicy::Frames(DEFAULT_LATENCY_FRAMES)
    }
}

/// Weaver of current runtimes
pub trait Weaver: Send {
    fn set_input_view_texture(
        &mut self,
        view: &ViewTextureHandle,
        width: u32,
        height: u32,
        format: TextureFormat,
    );

    fn set_latency_in_frames(&mut self, frames: u32);

    fn set_latency_us(&mut self, microseconds: u64);

    fn set_shader_srgb_conversion(&mut self, read: bool, write: bool);

    /// Eye pair the next `weave` will use, extrapolated to scan-out
    fn predicted_eye_positions(&self) -> EyePair;

    /// Composite into the currently bound render target
    fn weave(&mut self);

    /// Runtime-owned release; never drop a modern weaver any other way
    fn destroy(self: Box<Self>);
}

/// Weaver of runtimes that predate eye prediction
pub trait LegacyWeaver: Send {
    fn set_input_view_texture(
        &mut self,
        view: &ViewTextureHandle,
        width: u32,
        height: u32,
        format: TextureFormat,
    );

    fn set_latency_in_frames(&mut self, frames: u32);

    fn set_latency_us(&mut self, microseconds: u64);

    fn set_shader_srgb_conversion(&mut self, read: bool, write: bool);

    /// Size hints are ignored by runtime 1.34 and later
    fn weave(&mut self, width: u32, height: u32);
}

/// A weaver of either generation
pub enum WeaverHandle {
    Modern(Box<dyn Weaver>),
    Legacy(Box<dyn LegacyWeaver>),
}

impl WeaverHandle {
    #[inline]
    pub fn is_legacy(&self) -> bool {
        matches!(self, WeaverHandle::Legacy(_))
    }

    /// Point the weaver at the view texture and apply color and latency settings
    pub fn configure(
        &mut self,
        view: &ViewTextureHandle,
        policy: ColorSpacePolicy,
        latency: LatencyPolicy,
    ) {
        let size = view.desc.texture_size();
        let format = view.desc.format;
        let srgb = policy.shader_conversion();

        macro_rules! apply {
            ($weaver:expr) => {{
                $weaver.set_input_view_texture(view, size.x, size.y, format);
                if let Some((read, write)) = srgb {
                    $weaver.set_shader_srgb_conversion(read, write);
                }
                match latency {
                    LatencyPolicy::Frames(frames) => $weaver.set_latency_in_frames(frames),
                    LatencyPolicy::Microseconds(us) => $weaver.set_latency_us(us),
                }
            }};
        }

        match self {
            WeaverHandle::Modern(weaver) => apply!(weaver),
            WeaverHandle::Legacy(weaver) => apply!(weaver),
        }

        debug!(
            "Weaver input {}x{} {:?}, shader sRGB {:?}, latency {:?}",
            size.x, size.y, format, srgb, latency
        );
    }

    /// Predicted eyes; `None` on legacy weavers
    pub fn predicted_eye_positions(&self) -> Option<EyePair> {
        match self {
            WeaverHandle::Modern(weaver) => Some(weaver.predicted_eye_positions()),
            WeaverHandle::Legacy(_) => None,
        }
    }

    /// Weave into the bound target; `client_size` only reaches legacy weavers
    pub fn weave(&mut self, client_size: UVec2) {
        match self {
            WeaverHandle::Modern(weaver) => weaver.weave(),
            WeaverHandle::Legacy(weaver) => weaver.weave(client_size.x, client_size.y),
        }
    }

    /// Release with the semantics the weaver's generation requires
    pub fn release(self) {
        match self {
            WeaverHandle::Modern(weaver) => {
                weaver.destroy();
                info!("Weaver destroyed");
            }
            WeaverHandle::Legacy(weaver) => {
                drop(weaver);
                info!("Legacy weaver deleted");
            }
        }
    }
}

impl std::fmt::Debug for WeaverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeaverHandle::Modern(_) => f.write_str("WeaverHandle::Modern"),
            WeaverHandle::Legacy(_) => f.write_str("WeaverHandle::Legacy"),
        }
    }
}

/// Builds the weaver for a freshly acquired context
pub trait WeaverFactory: Send + Sync {
    /// Whether [`WeaverFactory::create`] yields legacy weavers
    fn is_legacy(&self) -> bool;

    fn create(&self, context: &dyn SrContext) -> Result<WeaverHandle, RuntimeError>;
}
