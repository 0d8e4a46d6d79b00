//! Side-by-side stereo photo
//!
//! The left half of the image is the left eye's view and the right half the
//! right eye's. Each half is copied 1:1 into its eye tile, so the view
//! texture takes the size of one half.

use bevy::math::{Mat4, Rect, UVec2};
use bevy::prelude::{info, warn};
use std::path::{Path, PathBuf};

use super::{Scene, SceneError};
use crate::eyes::Eye;
use crate::render::{ColorSpacePolicy, DrawContext, ImageData, ResourceUploader, TextureHandle};

pub const DEFAULT_IMAGE_FILE: &str = "StereoImage.jpg";

pub struct StereoImageScene {
    image: ImageData,
    source: Option<PathBuf>,
    texture: Option<TextureHandle>,
}

impl StereoImageScene {
    /// Load `path`, falling back to the same file name next to the executable
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let path = path.as_ref();
        let resolved = resolve_image_path(path)?;
        let decoded = image::open(&resolved).map_err(|source| SceneError::Decode {
            path: resolved.clone(),
            source,
        })?;
        let rgba = decoded.to_rgba8();
        let scene = Self::from_image(ImageData {
            width: rgba.width(),
            height: rgba.height(),
            pixels: rgba.into_raw(),
        })?;
        info!(
            "🖼️ Stereo image {} loaded: {}x{}",
            resolved.display(),
            scene.image.width,
            scene.image.height
        );
        Ok(Self {
            source: Some(resolved),
            ..scene
        })
    }

    pub fn from_image(image: ImageData) -> Result<Self, SceneError> {
        if image.width < 2 || image.height == 0 || !image.is_well_formed() {
            return Err(SceneError::TooSmall {
                width: image.width,
                height: image.height,
            });
        }
        Ok(Self {
            image,
            source: None,
            texture: None,
        })
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn image_size(&self) -> UVec2 {
        UVec2::new(self.image.width, self.image.height)
    }
}

fn resolve_image_path(path: &Path) -> Result<PathBuf, SceneError> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }

    let fallback = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .zip(path.file_name())
        .map(|(dir, name)| dir.join(name));

    match fallback {
        Some(candidate) if candidate.is_file() => {
            warn!(
                "{} not found, using {} next to the executable",
                path.display(),
                candidate.display()
            );
            Ok(candidate)
        }
        fallback => Err(SceneError::NotFound {
            path: path.to_path_buf(),
            fallback,
        }),
    }
}

impl Scene for StereoImageScene {
    fn name(&self) -> &'static str {
        "stereo image"
    }

    fn preferred_eye_size(&self) -> Option<UVec2> {
        Some(UVec2::new(self.image.width / 2, self.image.height))
    }

    fn upload(
        &mut self,
        uploader: &mut dyn ResourceUploader,
        policy: ColorSpacePolicy,
    ) -> Result<(), SceneError> {
        // Image bytes are already sRGB encoded; only the format tells the sampler so.
        self.texture = Some(uploader.upload_texture(&self.image, policy.surface_format())?);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.texture.is_some()
    }

    fn model(&self) -> Mat4 {
        Mat4::IDENTITY
    }

    fn draw(&self, ctx: &mut dyn DrawContext, eye: Eye, _mvp: &Mat4) {
        let Some(texture) = self.texture else {
            return;
        };
        let half = (self.image.width / 2) as f32 / self.image.width as f32;
        let u0 = eye.index() as f32 * half;
        ctx.draw_texture(texture, Rect::new(u0, 0.0, u0 + half, 1.0));
    }
}
