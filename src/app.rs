//! Application bring-up, frame loop and shutdown
//!
//! [`StereoApp`] wires the lifecycle controller, graphics backend, renderer,
//! eye provider and scene together and maps every fatal path to its exit
//! status. The host loop (see `plugin`) only feeds it window events and
//! calls [`StereoApp::frame`].

use bevy::math::{IVec2, UVec2};
use bevy::prelude::{debug, error, info, trace, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{AppConfig, DemoMode};
use crate::display::DisplayDescriptor;
use crate::error::{AppError, AppResult, ExitStatus};
use crate::eyes::{EyePositionProvider, EyeSource};
use crate::lifecycle::{ContextController, InstallPlan, LifecycleError, TickOutcome};
use crate::projection::{OffAxisProjection, ScreenRect};
use crate::render::{
    FrameOutcome, FrameTarget, GraphicsBackend, GraphicsError, RenderError, RendererSettings,
    SharedSurfaces, SoftwareBackend, StereoRenderer, TextureFormat, ViewTextureDesc,
};
use crate::runtime::simulated::{EyeTrackerThread, SimulatedRuntime};
use crate::runtime::{SrRuntime, SystemEvent};
use crate::scene::{Scene, SceneError, SpinningCube, StereoImageScene};
use crate::weaver::WeaverFactory;
use crate::window::{FpsCounter, WindowCommand, WindowEvent, WindowRect, WindowState};

/// How often the predicted-vs-callback eye delta is logged
const EYE_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Runtime and graphics the app runs on
pub trait Platform: Send {
    fn runtime(&self) -> Arc<dyn SrRuntime>;

    /// Create the device and a swapchain of `size`
    fn create_graphics(
        &mut self,
        size: UVec2,
        format: TextureFormat,
    ) -> Result<Box<dyn GraphicsBackend>, GraphicsError>;

    /// Weaver factory bound to the graphics created above
    fn weaver_factory(&self) -> Arc<dyn WeaverFactory>;
}

/// Simulated runtime on the software backend
pub struct SimulatedPlatform {
    runtime: Arc<SimulatedRuntime>,
    surfaces: Option<SharedSurfaces>,
    _tracker: Option<EyeTrackerThread>,
}

impl SimulatedPlatform {
    pub fn new(runtime: Arc<SimulatedRuntime>) -> Self {
        Self {
            runtime,
            surfaces: None,
            _tracker: None,
        }
    }

    /// Also stream tracked eyes in the background every `period`
    pub fn with_eye_tracker(mut self, period: Duration) -> Self {
        match self.runtime.spawn_eye_tracker(period) {
            Ok(tracker) => self._tracker = Some(tracker),
            Err(e) => warn!("⚠️ Eye tracker thread not started: {}", e),
        }
        self
    }

    pub fn simulated_runtime(&self) -> &Arc<SimulatedRuntime> {
        &self.runtime
    }

    pub fn surfaces(&self) -> Option<&SharedSurfaces> {
        self.surfaces.as_ref()
    }
}

impl Platform for SimulatedPlatform {
    fn runtime(&self) -> Arc<dyn SrRuntime> {
        Arc::clone(&self.runtime) as Arc<dyn SrRuntime>
    }

    fn create_graphics(
        &mut self,
        size: UVec2,
        format: TextureFormat,
    ) -> Result<Box<dyn GraphicsBackend>, GraphicsError> {
        let backend = SoftwareBackend::new(size, format)?;
        self.surfaces = Some(backend.surfaces());
        Ok(Box::new(backend))
    }

    fn weaver_factory(&self) -> Arc<dyn WeaverFactory> {
        self.runtime.weaver_factory(self.surfaces.clone())
    }
}

/// What to show
#[derive(Debug, Clone, PartialEq)]
pub enum SceneSource {
    Cube { size_mm: f32, spin_rad_per_sec: f32 },
    StereoImage(PathBuf),
}

impl SceneSource {
    /// Pick the scene from configuration and the optional command-line image
    pub fn from_config(config: &AppConfig, cli_image: Option<PathBuf>) -> Self {
        match config.demo.resolved_mode(cli_image.is_some()) {
            DemoMode::Cube => SceneSource::Cube {
                size_mm: config.demo.cube_size_mm,
                spin_rad_per_sec: config.demo.cube_spin_rad_per_sec,
            },
            DemoMode::StereoImage => {
                SceneSource::StereoImage(cli_image.unwrap_or_else(|| config.demo.image_path.clone()))
            }
        }
    }

    pub fn build(&self) -> Result<Box<dyn Scene>, SceneError> {
        Ok(match self {
            SceneSource::Cube {
                size_mm,
                spin_rad_per_sec,
            } => Box::new(SpinningCube::new(*size_mm, *spin_rad_per_sec)),
            SceneSource::StereoImage(path) => Box::new(StereoImageScene::load(path)?),
        })
    }
}

/// Whether the host loop should keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppControl {
    Continue,
    Exit(ExitStatus),
}

/// Result of one iteration of the frame loop
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub outcome: FrameOutcome,
    pub rebuilt: bool,
    /// New window title, when the FPS counter refreshed it
    pub title: Option<String>,
}

pub struct StereoApp {
    controller: ContextController,
    renderer: StereoRenderer,
    scene: Box<dyn Scene>,
    backend: Box<dyn GraphicsBackend>,
    eyes: EyePositionProvider,
    window: WindowState,
    fps: FpsCounter,
    config: AppConfig,
    title: String,
    last_eye_report: Instant,
    shut_down: bool,
    platform: Box<dyn Platform>,
}

impl StereoApp {
    /// Acquire the runtime, create graphics, load the scene and install the weaver
    pub fn bring_up(
        config: AppConfig,
        mut platform: Box<dyn Platform>,
        scene: SceneSource,
    ) -> AppResult<Self> {
        let settings = config.runtime.lifecycle_settings();
        let mut controller = ContextController::new(platform.runtime(), settings);
        controller
            .acquire(settings.startup_deadline)
            .map_err(AppError::Startup)?;
        let descriptor = controller
            .descriptor()
            .ok_or(AppError::Startup(LifecycleError::NotAcquired))?;
        log_display_summary(&descriptor);

        let policy = config.render.color_space;
        let mut backend = platform
            .create_graphics(config.window.size(), policy.surface_format())
            .map_err(|e| AppError::Graphics(e.into()))?;

        let mut scene = scene.build()?;
        let eye_size = scene
            .preferred_eye_size()
            .unwrap_or(descriptor.recommended_view_texture);
        if eye_size.x == 0 || eye_size.y == 0 {
            return Err(AppError::Graphics(RenderError::NoViewSize));
        }
        let view = backend
            .create_view_texture(ViewTextureDesc {
                eye_size,
                format: policy.surface_format(),
            })
            .map_err(|e| AppError::Graphics(e.into()))?;
        scene.upload(backend.as_uploader(), policy)?;
        info!("🎬 Scene '{}' ready, {}x{} per eye", scene.name(), eye_size.x, eye_size.y);

        let eyes = EyePositionProvider::new(config.eyes.source);
        let weaver_factory = platform.weaver_factory();
        if weaver_factory.is_legacy() && eyes.source() == EyeSource::Predicted {
            info!("Legacy weaver cannot predict, using the eye-pair stream");
            eyes.set_source(EyeSource::Callback);
        }
        controller
            .install(InstallPlan {
                weaver_factory,
                view_texture: view,
                color_policy: policy,
                latency: config.runtime.latency,
                eye_listener: config.runtime.eye_listener,
                eye_slot: eyes.slot(),
            })
            .map_err(AppError::Install)?;

        let renderer = StereoRenderer::new(
            RendererSettings {
                color_policy: policy,
                view_clear: config.render.view_clear_color,
                backbuffer_clear: config.render.backbuffer_clear_color,
                projection: OffAxisProjection::new(config.render.near_mm, config.render.far_mm),
                screen: ScreenRect::from_physical_size(
                    descriptor.physical_size_mm,
                    config.render.virtual_screen_depth_mm,
                ),
                vsync: config.render.vsync,
            },
            view,
        );

        let monitor = WindowRect {
            origin: IVec2::new(descriptor.location.left as i32, descriptor.location.top as i32),
            size: UVec2::new(
                descriptor.location.width().max(1) as u32,
                descriptor.location.height().max(1) as u32,
            ),
        };
        let window = WindowState::new(config.window.title.clone(), backend.swapchain_size(), monitor);
        let title = config.window.title.clone();
        let fullscreen = config.window.fullscreen;

        let mut app = Self {
            controller,
            renderer,
            scene,
            backend,
            eyes,
            window,
            fps: FpsCounter::new(Instant::now()),
            config,
            title,
            last_eye_report: Instant::now(),
            shut_down: false,
            platform,
        };

        if fullscreen {
            app.handle_window_event(WindowEvent::KeyDown(crate::window::Key::F11))?;
        }

        info!("✅ Stereo app up");
        Ok(app)
    }

    pub fn controller(&self) -> &ContextController {
        &self.controller
    }

    pub fn renderer(&self) -> &StereoRenderer {
        &self.renderer
    }

    pub fn eyes(&self) -> &EyePositionProvider {
        &self.eyes
    }

    pub fn window(&self) -> &WindowState {
        &self.window
    }

    pub fn backend(&self) -> &dyn GraphicsBackend {
        self.backend.as_ref()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    /// Current window title, including the FPS suffix once measured
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn fps(&self) -> f64 {
        self.fps.fps()
    }

    /// Apply a window event; a resize renders one un-vsynced frame right away
    pub fn handle_window_event(&mut self, event: WindowEvent) -> AppResult<AppControl> {
        let Some(command) = self.window.handle_event(event) else {
            return Ok(AppControl::Continue);
        };
        match command {
            WindowCommand::Close => {
                info!("Close requested");
                return Ok(AppControl::Exit(ExitStatus::Success));
            }
            WindowCommand::InvalidateContext => {
                info!("🔄 Injecting ContextInvalid");
                self.controller
                    .inject_event(&SystemEvent::synthetic_context_invalid());
            }
            WindowCommand::ToggleEyeSource => {
                if self.controller.has_eye_listener() {
                    self.eyes.toggle_source();
                } else {
                    warn!("No eye-pair stream open, eye source unchanged");
                }
            }
            WindowCommand::Resize(size) => {
                self.renderer.request_resize(size);
                if self.scene.is_ready() {
                    self.render(true)?;
                } else {
                    self.renderer
                        .apply_pending_resize(self.backend.as_mut())
                        .map_err(AppError::Resize)?;
                }
            }
            WindowCommand::Render => {
                if self.scene.is_ready() {
                    self.render(false)?;
                }
            }
        }
        Ok(AppControl::Continue)
    }

    /// One iteration: rebuild if invalidated, animate, render, update title
    pub fn frame(&mut self, dt: Duration) -> AppResult<FrameReport> {
        let rebuilt = match self.controller.tick(self.backend.as_mut()) {
            Ok(TickOutcome::Rebuilt) => {
                self.refresh_screen();
                true
            }
            Ok(TickOutcome::Unchanged) => false,
            Err(e) => {
                error!("❌ Failed to re-initialize SR after context destruction: {}", e);
                return Err(AppError::Rebuild(e));
            }
        };

        self.scene.advance(dt);
        let outcome = self.render(false)?;

        let now = Instant::now();
        let title = match outcome {
            FrameOutcome::Rendered { .. } => self.fps.frame(now, &self.config.window.title),
            FrameOutcome::Skipped => None,
        };
        if let Some(title) = &title {
            trace!("Title: {}", title);
            self.title = title.clone();
        }

        if now.duration_since(self.last_eye_report) >= EYE_REPORT_INTERVAL {
            self.last_eye_report = now;
            self.report_eye_delta();
        }

        Ok(FrameReport {
            outcome,
            rebuilt,
            title,
        })
    }

    /// Re-derive the virtual screen from the display the controller now holds
    fn refresh_screen(&mut self) {
        let Some(descriptor) = self.controller.descriptor() else {
            return;
        };
        let screen = ScreenRect::from_physical_size(
            descriptor.physical_size_mm,
            self.config.render.virtual_screen_depth_mm,
        );
        if screen != self.renderer.settings().screen {
            log_display_summary(&descriptor);
            self.renderer.set_screen(screen);
        }
    }

    fn render(&mut self, immediate: bool) -> AppResult<FrameOutcome> {
        let target = FrameTarget {
            minimized: self.window.is_minimized(),
            immediate,
        };
        self.renderer
            .render_frame(
                self.backend.as_mut(),
                &mut self.controller,
                &self.eyes,
                self.scene.as_mut(),
                target,
            )
            .map_err(|e| match e {
                RenderError::ResizeFailed(_) => AppError::Resize(e),
                other => AppError::Graphics(other),
            })
    }

    fn report_eye_delta(&self) {
        let comparison = self.eyes.both(self.controller.weaver());
        if let Some((left, right)) = comparison.delta_mm() {
            debug!(
                "👀 Predicted vs stream delta: left {:.2} mm, right {:.2} mm",
                left, right
            );
        }
    }

    /// Release runtime objects after the GPU is idle; graphics go last
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.backend.wait_for_gpu();
        self.controller.shutdown();
        self.shut_down = true;
        info!(
            "Stereo app shut down after {} frames ({} rebuilds)",
            self.renderer.frames_rendered(),
            self.controller.rebuild_count()
        );
    }
}

impl Drop for StereoApp {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Log the resolved display geometry and the field of view it implies
pub fn log_display_summary(descriptor: &DisplayDescriptor) {
    let fov = descriptor.field_of_view();
    info!(
        "🖥️ SR display {}: view texture {}x{} per eye, {:.0}x{:.0} mm, viewer at ({:.0}, {:.0}, {:.0}) mm, FOV {:.1}° x {:.1}°",
        descriptor.identifier,
        descriptor.recommended_view_texture.x,
        descriptor.recommended_view_texture.y,
        descriptor.physical_size_mm.x,
        descriptor.physical_size_mm.y,
        descriptor.default_viewing_position_mm.x,
        descriptor.default_viewing_position_mm.y,
        descriptor.default_viewing_position_mm.z,
        fov.x.to_degrees(),
        fov.y.to_degrees()
    );
}
