//! Stereo render pipeline
//!
//! One frame: clear, render both eyes into their tiles of the side-by-side
//! view texture with off-axis projections, bind the backbuffer, weave,
//! present. The order of these steps is fixed.

use bevy::math::{UVec2, Vec2};
use bevy::prelude::{debug, warn};
use std::time::Duration;
use thiserror::Error;

use super::backend::{GraphicsBackend, GraphicsError, ViewTextureHandle, Viewport};
use super::color::{ColorSpacePolicy, Rgba};
use crate::eyes::{Eye, EyePair, EyePositionProvider};
use crate::lifecycle::ContextController;
use crate::projection::{OffAxisProjection, ProjectionError, ScreenRect};
use crate::scene::Scene;

/// Sleep while the window is minimized
pub const MINIMIZED_SLEEP: Duration = Duration::from_millis(1);

pub const DEFAULT_VIEW_CLEAR: Rgba = [0.05, 0.05, 0.25, 1.0];
pub const DEFAULT_BACKBUFFER_CLEAR: Rgba = [0.0, 0.25, 0.0, 1.0];

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("graphics backend: {0}")]
    Graphics(#[from] GraphicsError),

    #[error("backbuffer resize failed: {0}")]
    ResizeFailed(#[source] GraphicsError),

    #[error("no view texture size available")]
    NoViewSize,
}

/// Renderer settings fixed at construction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererSettings {
    pub color_policy: ColorSpacePolicy,
    pub view_clear: Rgba,
    pub backbuffer_clear: Rgba,
    pub projection: OffAxisProjection,
    pub screen: ScreenRect,
    pub vsync: bool,
}

impl RendererSettings {
    pub fn new(color_policy: ColorSpacePolicy, physical_size_mm: Vec2) -> Self {
        Self {
            color_policy,
            view_clear: DEFAULT_VIEW_CLEAR,
            backbuffer_clear: DEFAULT_BACKBUFFER_CLEAR,
            projection: OffAxisProjection::default(),
            screen: ScreenRect::from_physical_size(physical_size_mm, 0.0),
            vsync: true,
        }
    }
}

/// Per-frame window facts the pipeline depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTarget {
    pub minimized: bool,
    /// Skip vsync, e.g. for the frame rendered right after a resize
    pub immediate: bool,
}

/// What a call to [`StereoRenderer::render_frame`] did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// Window minimized; nothing touched
    Skipped,
    Rendered {
        eyes: EyePair,
        /// False when an eye sat on or behind the screen plane
        scene_drawn: bool,
        woven: bool,
    },
}

/// Renders the side-by-side view texture and hands it to the weaver
pub struct StereoRenderer {
    settings: RendererSettings,
    view: ViewTextureHandle,
    pending_resize: Option<UVec2>,
    behind_screen_frames: u64,
    frames: u64,
}

impl StereoRenderer {
    pub fn new(settings: RendererSettings, view: ViewTextureHandle) -> Self {
        Self {
            settings,
            view,
            pending_resize: None,
            behind_screen_frames: 0,
            frames: 0,
        }
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    /// Project against a new virtual screen from the next frame on
    pub fn set_screen(&mut self, screen: ScreenRect) {
        self.settings.screen = screen;
    }

    pub fn view(&self) -> &ViewTextureHandle {
        &self.view
    }

    /// Per-eye view size
    pub fn eye_size(&self) -> UVec2 {
        self.view.desc.eye_size
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    /// Frames whose scene draw was skipped for an unusable eye projection
    pub fn behind_screen_frames(&self) -> u64 {
        self.behind_screen_frames
    }

    /// Schedule a backbuffer resize for the next frame; the view texture keeps its size
    pub fn request_resize(&mut self, size: UVec2) {
        self.pending_resize = Some(size);
    }

    pub fn has_pending_resize(&self) -> bool {
        self.pending_resize.is_some()
    }

    /// Resize the backbuffer now if a resize is pending
    pub fn apply_pending_resize(&mut self, backend: &mut dyn GraphicsBackend) -> Result<(), RenderError> {
        if let Some(size) = self.pending_resize.take() {
            if size != backend.swapchain_size() {
                backend.resize_swapchain(size).map_err(RenderError::ResizeFailed)?;
            }
        }
        Ok(())
    }

    pub fn render_frame(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        controller: &mut ContextController,
        eyes: &EyePositionProvider,
        scene: &mut dyn Scene,
        target: FrameTarget,
    ) -> Result<FrameOutcome, RenderError> {
        if target.minimized {
            // Weaving without presenting would fill the latch queue with stale frames.
            std::thread::sleep(MINIMIZED_SLEEP);
            return Ok(FrameOutcome::Skipped);
        }

        self.apply_pending_resize(backend)?;

        let policy = self.settings.color_policy;
        backend.clear_backbuffer(policy.encode(self.settings.backbuffer_clear));

        let pair = eyes.current(controller.weaver());

        backend.clear_view_texture(&self.view, policy.encode(self.settings.view_clear));
        backend.clear_view_depth(&self.view, 1.0);
        backend.bind_view_targets(&self.view);

        let model = scene.model();
        let projection = &self.settings.projection;
        let screen = &self.settings.screen;
        let mvps = Eye::BOTH.map(|eye| projection.model_view_projection(pair.eye(eye), screen, &model));

        let scene_drawn = match mvps {
            [Ok(left), Ok(right)] => {
                for (eye, mvp) in Eye::BOTH.into_iter().zip([left, right]) {
                    backend.set_viewport(Viewport::for_eye(eye.index(), self.eye_size()));
                    scene.draw(backend.as_draw_context(), eye, &mvp);
                }
                true
            }
            [left, right] => {
                let failure = left.err().or(right.err());
                if self.behind_screen_frames % 120 == 0 {
                    match failure {
                        Some(ProjectionError::EyeBehindScreen { distance_mm }) => {
                            warn!("⚠️ Eye {} mm from screen plane, scene skipped", distance_mm)
                        }
                        Some(e) => debug!("Eye projection unusable: {}", e),
                        None => {}
                    }
                }
                self.behind_screen_frames += 1;
                false
            }
        };

        backend.bind_backbuffer();
        let client = backend.swapchain_size();
        backend.set_viewport(Viewport::covering(client));

        let woven = match controller.weaver_mut() {
            Some(weaver) if !target_is_empty(client) => {
                weaver.weave(client);
                true
            }
            _ => false,
        };

        backend.present(self.settings.vsync && !target.immediate)?;
        self.frames += 1;

        Ok(FrameOutcome::Rendered {
            eyes: pair,
            scene_drawn,
            woven,
        })
    }
}

#[inline]
fn target_is_empty(size: UVec2) -> bool {
    size.x == 0 || size.y == 0
}
