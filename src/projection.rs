//! Off-axis (Kooima) projection for head-tracked stereo
//!
//! The frustum apex is the tracked eye and its base is the physical screen,
//! so aspect ratio is dictated by the panel and never by the viewport.
//! Display space is right-handed: +x right, +y up, +z toward the viewer.

use bevy::math::{Mat4, Vec2, Vec3, Vec4};
use thiserror::Error;

pub const DEFAULT_NEAR_MM: f32 = 0.1;
pub const DEFAULT_FAR_MM: f32 = 10_000.0;

#[derive(Debug, Clone, Copy, Error, PartialEq)]
pub enum ProjectionError {
    #[error("eye is {distance_mm} mm from the screen plane; it must be in front of it")]
    EyeBehindScreen { distance_mm: f32 },

    #[error("projection is not finite")]
    NonFinite,
}

/// Virtual screen rectangle in display space, millimeters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    /// Top-left
    pub pa: Vec3,
    /// Top-right
    pub pb: Vec3,
    /// Bottom-left
    pub pc: Vec3,
}

impl ScreenRect {
    /// Screen of `size_mm` centered on the display, pushed to depth `z_screen`
    pub fn from_physical_size(size_mm: Vec2, z_screen: f32) -> Self {
        let half = size_mm * 0.5;
        Self {
            pa: Vec3::new(-half.x, half.y, z_screen),
            pb: Vec3::new(half.x, half.y, z_screen),
            pc: Vec3::new(-half.x, -half.y, z_screen),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.pb + self.pc) * 0.5
    }

    pub fn depth(&self) -> f32 {
        self.pa.z
    }
}

/// Asymmetric GL-style perspective frustum, column-major
pub fn frustum(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    let width = right - left;
    let height = top - bottom;
    let depth = far - near;
    Mat4::from_cols(
        Vec4::new(2.0 * near / width, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 2.0 * near / height, 0.0, 0.0),
        Vec4::new(
            (right + left) / width,
            (top + bottom) / height,
            -(far + near) / depth,
            -1.0,
        ),
        Vec4::new(0.0, 0.0, -2.0 * far * near / depth, 0.0),
    )
}

/// Projection builder with fixed clip planes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffAxisProjection {
    pub near: f32,
    pub far: f32,
}

impl Default for OffAxisProjection {
    fn default() -> Self {
        Self {
            near: DEFAULT_NEAR_MM,
            far: DEFAULT_FAR_MM,
        }
    }
}

impl OffAxisProjection {
    pub fn new(near: f32, far: f32) -> Self {
        Self { near, far }
    }

    /// `P · T(-eye)` for the given eye and screen
    pub fn view_projection(&self, eye: Vec3, screen: &ScreenRect) -> Result<Mat4, ProjectionError> {
        let vr = Vec3::X;
        let vu = Vec3::Y;
        let vn = Vec3::Z;

        let va = screen.pa - eye;
        let vb = screen.pb - eye;
        let vc = screen.pc - eye;

        let distance = -va.dot(vn);
        if !(distance > 0.0) {
            return Err(ProjectionError::EyeBehindScreen {
                distance_mm: distance,
            });
        }

        let scale = self.near / distance;
        let left = vr.dot(va) * scale;
        let right = vr.dot(vb) * scale;
        let bottom = vu.dot(vc) * scale;
        let top = vu.dot(va) * scale;

        let projection = frustum(left, right, bottom, top, self.near, self.far);
        let matrix = projection * Mat4::from_translation(-eye);
        if matrix.is_finite() {
            Ok(matrix)
        } else {
            Err(ProjectionError::NonFinite)
        }
    }

    /// Full MVP for a model already placed in display space
    pub fn model_view_projection(
        &self,
        eye: Vec3,
        screen: &ScreenRect,
        model_view: &Mat4,
    ) -> Result<Mat4, ProjectionError> {
        Ok(self.view_projection(eye, screen)? * *model_view)
    }
}
