//! Display Access
//!
//! Uniform, read-only view of the SR display regardless of runtime version:
//! - Modern runtimes export a display manager that hands out the primary display
//! - Older runtimes only offer a per-context display object
//!
//! The choice is made once, when [`DisplayAccess::open`] runs. Nothing here
//! fails; missing objects degrade to documented fallback geometry.

use bevy::math::{UVec2, Vec2, Vec3};
use bevy::prelude::{debug, info};
use std::sync::Arc;
use std::time::Duration;

use crate::poll::{poll_until, Deadline};
use crate::runtime::SrContext;

pub mod binding;

pub use binding::{LegacyOnlyProbe, SharedLibraryProbe};

/// Logical resolution reported when no display object exists
pub const FALLBACK_RESOLUTION: UVec2 = UVec2::new(2560, 1440);
/// Native panel resolution reported when no display object exists
pub const FALLBACK_PHYSICAL_RESOLUTION: UVec2 = UVec2::new(2560, 1440);
/// Panel size in centimeters reported when no display object exists
pub const FALLBACK_PHYSICAL_SIZE_CM: Vec2 = Vec2::new(70.0, 40.0);
/// Pixel pitch in centimeters reported when no display object exists
pub const FALLBACK_DOT_PITCH_CM: f32 = 0.0233;
/// Per-eye view texture size reported when no display object exists
pub const FALLBACK_VIEW_TEXTURE: UVec2 = UVec2::new(2560, 1440);
/// Viewing position reported by the legacy path, in millimeters
pub const FALLBACK_VIEWING_POSITION_MM: Vec3 = Vec3::new(0.0, 0.0, 600.0);

/// Rectangle in virtual-desktop coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayRect {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl DisplayRect {
    #[inline]
    pub fn width(&self) -> i64 {
        self.right - self.left
    }

    #[inline]
    pub fn height(&self) -> i64 {
        self.bottom - self.top
    }

    /// A display is ready once the desktop has placed it somewhere
    #[inline]
    pub fn has_area(&self) -> bool {
        self.width() != 0 && self.height() != 0
    }
}

/// A display handed out by the modern display manager
pub trait SrDisplay: Send + Sync {
    fn is_valid(&self) -> bool;
    fn identifier(&self) -> u64;
    fn resolution(&self) -> UVec2;
    fn physical_resolution(&self) -> UVec2;
    fn physical_size_cm(&self) -> Vec2;
    fn dot_pitch_cm(&self) -> f32;
    fn location(&self) -> DisplayRect;
    fn recommended_view_texture(&self) -> UVec2;
    /// Optimal viewer position in millimeters, display-centered
    fn default_viewing_position_mm(&self) -> Vec3;
}

/// The per-context display object of runtimes without a display manager
pub trait LegacyDisplay: Send + Sync {
    fn resolution(&self) -> UVec2;
    fn physical_resolution(&self) -> UVec2;
    fn physical_size_cm(&self) -> Vec2;
    fn dot_pitch_cm(&self) -> f32;
    fn location(&self) -> DisplayRect;
    fn recommended_view_texture(&self) -> UVec2;
}

/// Runtime-owned registry of connected SR displays
pub trait DisplayManager: Send + Sync {
    fn primary_active_display(&self) -> Option<Arc<dyn SrDisplay>>;
}

/// Load-time capability check for the modern display manager
pub trait DisplayManagerProbe: Send + Sync {
    /// The context's display manager, or `None` on runtimes that predate it
    fn display_manager(&self, context: &dyn SrContext) -> Option<Box<dyn DisplayManager>>;
}

/// Viewer position reported by the display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewingPosition {
    pub position_mm: Vec3,
    /// False when the value is the legacy fallback rather than a display query
    pub from_display: bool,
}

/// Snapshot of everything the renderer needs to know about the display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayDescriptor {
    pub valid: bool,
    /// Stable per-display id, 0 on the legacy path
    pub identifier: u64,
    pub logical_resolution: UVec2,
    pub physical_resolution: UVec2,
    pub physical_size_mm: Vec2,
    pub dot_pitch_mm: f32,
    pub location: DisplayRect,
    /// Size of one eye's view; zero unless `valid`
    pub recommended_view_texture: UVec2,
    pub default_viewing_position_mm: Vec3,
}

impl DisplayDescriptor {
    /// Horizontal and vertical field of view in radians seen from the default position
    pub fn field_of_view(&self) -> Vec2 {
        let z = self.default_viewing_position_mm.z;
        Vec2::new(
            2.0 * (self.physical_size_mm.x * 0.5).atan2(z),
            2.0 * (self.physical_size_mm.y * 0.5).atan2(z),
        )
    }
}

enum Backend {
    Modern {
        manager: Box<dyn DisplayManager>,
        display: Option<Arc<dyn SrDisplay>>,
    },
    Legacy(Option<Box<dyn LegacyDisplay>>),
}

/// Version-independent display access bound to one context
pub struct DisplayAccess {
    backend: Backend,
}

impl DisplayAccess {
    /// Resolve the display of `context`, preferring the modern manager
    pub fn open(context: &dyn SrContext, probe: &dyn DisplayManagerProbe) -> Self {
        let backend = match probe.display_manager(context) {
            Some(manager) => {
                let primary = manager.primary_active_display();
                let found = primary.is_some();
                info!(
                    "🖥️ Display access via display manager (primary display {})",
                    if found { "found" } else { "pending" }
                );
                Backend::Modern {
                    manager,
                    display: primary,
                }
            }
            None => {
                info!("🖥️ Display access via legacy display object");
                Backend::Legacy(context.legacy_display())
            }
        };
        Self { backend }
    }

    #[inline]
    pub fn using_modern(&self) -> bool {
        matches!(self.backend, Backend::Modern { .. })
    }

    /// Whether an SR display is attached and placed on the desktop
    pub fn is_display_valid(&self) -> bool {
        match &self.backend {
            Backend::Modern { display, .. } => display.as_ref().is_some_and(|d| d.is_valid()),
            Backend::Legacy(display) => display.as_ref().is_some_and(|d| d.location().has_area()),
        }
    }

    /// Re-query the backing display object if it is missing or not yet valid
    pub fn refresh(&mut self, context: &dyn SrContext) {
        match &mut self.backend {
            Backend::Modern { manager, display } => {
                if !display.as_ref().is_some_and(|d| d.is_valid()) {
                    *display = manager.primary_active_display();
                }
            }
            Backend::Legacy(display) => {
                if !display.as_ref().is_some_and(|d| d.location().has_area()) {
                    *display = context.legacy_display();
                }
            }
        }
    }

    /// Poll the display at `interval` until it is valid or `deadline` expires
    pub fn wait_for_display(
        &mut self,
        context: &dyn SrContext,
        deadline: &Deadline,
        interval: Duration,
    ) -> bool {
        let mut attempt = 0u32;
        poll_until(deadline, interval, || {
            self.refresh(context);
            attempt += 1;
            let ready = self.is_display_valid();
            if !ready {
                debug!("Display not ready (attempt {}, {:?} elapsed)", attempt, deadline.elapsed());
            }
            ready
        })
    }

    pub fn identifier(&self) -> u64 {
        match &self.backend {
            Backend::Modern {
                display: Some(display),
                ..
            } => display.identifier(),
            _ => 0,
        }
    }

    pub fn resolution(&self) -> UVec2 {
        self.query(|d| d.resolution(), |d| d.resolution())
            .unwrap_or(FALLBACK_RESOLUTION)
    }

    pub fn resolution_width(&self) -> u32 {
        self.resolution().x
    }

    pub fn resolution_height(&self) -> u32 {
        self.resolution().y
    }

    pub fn physical_resolution(&self) -> UVec2 {
        self.query(|d| d.physical_resolution(), |d| d.physical_resolution())
            .unwrap_or(FALLBACK_PHYSICAL_RESOLUTION)
    }

    pub fn physical_size_cm(&self) -> Vec2 {
        self.query(|d| d.physical_size_cm(), |d| d.physical_size_cm())
            .unwrap_or(FALLBACK_PHYSICAL_SIZE_CM)
    }

    pub fn dot_pitch_cm(&self) -> f32 {
        self.query(|d| d.dot_pitch_cm(), |d| d.dot_pitch_cm())
            .unwrap_or(FALLBACK_DOT_PITCH_CM)
    }

    /// Zero-sized without a display object, so it never looks ready
    pub fn location(&self) -> DisplayRect {
        self.query(|d| d.location(), |d| d.location())
            .unwrap_or_default()
    }

    pub fn recommended_view_texture(&self) -> UVec2 {
        self.query(|d| d.recommended_view_texture(), |d| d.recommended_view_texture())
            .unwrap_or(FALLBACK_VIEW_TEXTURE)
    }

    /// Display-reported viewer position; without a modern display this is (0, 0, 600)
    pub fn default_viewing_position(&self) -> ViewingPosition {
        match &self.backend {
            Backend::Modern {
                display: Some(display),
                ..
            } => ViewingPosition {
                position_mm: display.default_viewing_position_mm(),
                from_display: true,
            },
            _ => ViewingPosition {
                position_mm: FALLBACK_VIEWING_POSITION_MM,
                from_display: false,
            },
        }
    }

    /// Freeze the current geometry into a descriptor, sizes in millimeters
    pub fn descriptor(&self) -> DisplayDescriptor {
        let valid = self.is_display_valid();
        DisplayDescriptor {
            valid,
            identifier: self.identifier(),
            logical_resolution: self.resolution(),
            physical_resolution: self.physical_resolution(),
            physical_size_mm: self.physical_size_cm() * 10.0,
            dot_pitch_mm: self.dot_pitch_cm() * 10.0,
            location: self.location(),
            recommended_view_texture: if valid {
                self.recommended_view_texture()
            } else {
                UVec2::ZERO
            },
            default_viewing_position_mm: self.default_viewing_position().position_mm,
        }
    }

    fn query<T>(
        &self,
        modern: impl FnOnce(&dyn SrDisplay) -> T,
        legacy: impl FnOnce(&dyn LegacyDisplay) -> T,
    ) -> Option<T> {
        match &self.backend {
            Backend::Modern { display, .. } => display.as_deref().map(modern),
            Backend::Legacy(display) => display.as_deref().map(legacy),
        }
    }
}

impl std::fmt::Debug for DisplayAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayAccess")
            .field("using_modern", &self.using_modern())
            .field("valid", &self.is_display_valid())
            .finish()
    }
}
