//! Graphics API contract used by the stereo pipeline and the scenes
//!
//! Device and swapchain creation live behind [`GraphicsBackend`]. The pipeline
//! only issues the handful of calls a frame needs, and scenes only see the
//! narrower [`ResourceUploader`] and [`DrawContext`] views.

use bevy::math::{Mat4, Rect, UVec2};
use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use super::color::{Rgba, TextureFormat};

/// Errors reported by a graphics backend
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphicsError {
    #[error("invalid surface size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u64 },

    #[error("swapchain resize to {width}x{height} failed: {reason}")]
    ResizeFailed {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("upload rejected: {0}")]
    Upload(String),

    #[error("device lost: {0}")]
    DeviceLost(String),
}

/// Size and format of the side-by-side view texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewTextureDesc {
    /// Size of one eye's view; the texture is twice as wide
    pub eye_size: UVec2,
    pub format: TextureFormat,
}

impl ViewTextureDesc {
    #[inline]
    pub fn texture_size(&self) -> UVec2 {
        UVec2::new(self.eye_size.x * 2, self.eye_size.y)
    }
}

/// The side-by-side stereo texture and its paired depth buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewTextureHandle {
    pub id: u64,
    pub desc: ViewTextureDesc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Integer viewport in render-target pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn covering(size: UVec2) -> Self {
        Self::new(0, 0, size.x, size.y)
    }

    /// Viewport of one eye inside the side-by-side texture
    pub fn for_eye(eye_index: u32, eye_size: UVec2) -> Self {
        Self::new(eye_index * eye_size.x, 0, eye_size.x, eye_size.y)
    }
}

/// Vertex layout of colored meshes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

/// Tightly packed RGBA8 pixels, row-major, top row first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.pixels.len() == (self.width * self.height * 4) as usize
    }
}

/// Resource creation available to scenes during upload
pub trait ResourceUploader {
    fn upload_mesh(&mut self, vertices: &[Vertex], indices: &[u16]) -> Result<MeshHandle, GraphicsError>;

    fn upload_texture(&mut self, image: &ImageData, format: TextureFormat) -> Result<TextureHandle, GraphicsError>;
}

/// Draw calls available to scenes; targets and viewports are already set
pub trait DrawContext {
    /// Draw an indexed triangle list transformed by `mvp`, depth-tested
    fn draw_mesh(&mut self, mesh: MeshHandle, mvp: &Mat4);

    /// Copy the `uv` region of `texture` over the whole viewport
    fn draw_texture(&mut self, texture: TextureHandle, uv: Rect);
}

/// Device, swapchain and the per-frame operations of the stereo pipeline
pub trait GraphicsBackend: ResourceUploader + DrawContext + Send {
    fn create_view_texture(&mut self, desc: ViewTextureDesc) -> Result<ViewTextureHandle, GraphicsError>;

    fn swapchain_size(&self) -> UVec2;

    /// Resize the backbuffer keeping its format and buffer count
    fn resize_swapchain(&mut self, size: UVec2) -> Result<(), GraphicsError>;

    fn clear_backbuffer(&mut self, color: Rgba);

    fn clear_view_texture(&mut self, view: &ViewTextureHandle, color: Rgba);

    fn clear_view_depth(&mut self, view: &ViewTextureHandle, depth: f32);

    /// Bind the view texture as render target with its depth buffer
    fn bind_view_targets(&mut self, view: &ViewTextureHandle);

    /// Bind the backbuffer as the only render target, no depth
    fn bind_backbuffer(&mut self);

    fn set_viewport(&mut self, viewport: Viewport);

    fn present(&mut self, vsync: bool) -> Result<(), GraphicsError>;

    /// Block until all submitted GPU work has finished
    fn wait_for_gpu(&mut self);

    fn as_draw_context(&mut self) -> &mut dyn DrawContext;

    fn as_uploader(&mut self) -> &mut dyn ResourceUploader;
}
