//! Scene providers drawn into each eye's tile

use bevy::math::{Mat4, UVec2};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::eyes::Eye;
use crate::render::{ColorSpacePolicy, DrawContext, GraphicsError, ResourceUploader};

pub mod cube;
pub mod stereo_image;

pub use cube::SpinningCube;
pub use stereo_image::StereoImageScene;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("image not found: {path} (also tried {fallback:?})")]
    NotFound {
        path: PathBuf,
        fallback: Option<PathBuf>,
    },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("stereo image must be at least 2x1 pixels, got {width}x{height}")]
    TooSmall { width: u32, height: u32 },

    #[error("upload failed: {0}")]
    Upload(#[from] GraphicsError),
}

/// Content rendered once per eye per frame
///
/// `draw` must leave render targets, viewports and color-space state alone.
pub trait Scene: Send {
    fn name(&self) -> &'static str;

    /// Per-eye view size the scene needs instead of the display's recommendation
    fn preferred_eye_size(&self) -> Option<UVec2> {
        None
    }

    /// Create GPU resources; called once after graphics bring-up
    fn upload(
        &mut self,
        uploader: &mut dyn ResourceUploader,
        policy: ColorSpacePolicy,
    ) -> Result<(), SceneError>;

    fn is_ready(&self) -> bool;

    fn advance(&mut self, _dt: Duration) {}

    /// Model transform into display space, millimeters
    fn model(&self) -> Mat4 {
        Mat4::IDENTITY
    }

    fn draw(&self, ctx: &mut dyn DrawContext, eye: Eye, mvp: &Mat4);
}
