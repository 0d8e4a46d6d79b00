//! Stereo rendering: color policy, graphics contract, CPU backend and the frame pipeline

pub mod backend;
pub mod color;
pub mod pipeline;
pub mod software;

pub use backend::{
    DrawContext, GraphicsBackend, GraphicsError, ImageData, MeshHandle, ResourceUploader,
    TextureHandle, Vertex, ViewTextureDesc, ViewTextureHandle, Viewport,
};
pub use color::{ColorSpacePolicy, Rgba, TextureFormat};
pub use pipeline::{FrameOutcome, FrameTarget, RenderError, RendererSettings, StereoRenderer};
pub use software::{RenderTarget, SharedSurfaces, SoftwareBackend, Surface, SurfaceStore};
