//! In-process SR runtime
//!
//! Implements the runtime contracts without vendor hardware: a service that
//! comes up after a delay, a display that becomes ready after another, modern
//! or legacy display and weaver generations, an eye tracker with a slow head
//! sway, and weavers that composite a mono preview of the view texture into
//! the backbuffer. Every runtime-visible call is journaled so callers can
//! check ordering.

use bevy::math::{UVec2, Vec2, Vec3};
use bevy::prelude::{debug, info, warn};
use crossbeam_channel::{bounded, select, tick, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{
    EyePairCallback, RuntimeError, SrContext, SrRuntime, StreamToken, SystemEvent,
    SystemEventCallback, SystemEventType,
};
use crate::display::{DisplayManager, DisplayManagerProbe, DisplayRect, LegacyDisplay, SrDisplay};
use crate::eyes::EyePair;
use crate::render::color::{linear_to_srgb, srgb_to_linear};
use crate::render::{RenderTarget, SharedSurfaces, TextureFormat, ViewTextureHandle};
use crate::weaver::{LatencyPolicy, LegacyWeaver, Weaver, WeaverFactory, WeaverHandle};

/// Frame period assumed when converting frame latency to time
const FRAME_PERIOD: Duration = Duration::from_micros(16_667);

/// Geometry of the simulated panel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedDisplaySpec {
    pub identifier: u64,
    pub resolution: UVec2,
    pub physical_resolution: UVec2,
    pub physical_size_cm: Vec2,
    pub dot_pitch_cm: f32,
    pub location: DisplayRect,
    pub view_texture: UVec2,
    pub viewing_position_mm: Vec3,
}

impl Default for SimulatedDisplaySpec {
    fn default() -> Self {
        Self {
            identifier: 1,
            resolution: UVec2::new(3840, 2160),
            physical_resolution: UVec2::new(3840, 2160),
            physical_size_cm: Vec2::new(34.5, 19.4),
            dot_pitch_cm: 0.009,
            location: DisplayRect {
                left: 0,
                top: 0,
                right: 3840,
                bottom: 2160,
            },
            view_texture: UVec2::new(1920, 1080),
            viewing_position_mm: Vec3::new(0.0, 0.0, 600.0),
        }
    }
}

/// Behaviour of a [`SimulatedRuntime`]
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    /// Time after construction before contexts can be created
    pub service_delay: Duration,
    /// Time after construction before the display reports ready
    pub display_delay: Duration,
    /// False keeps the service down until started explicitly
    pub service_available: bool,
    pub modern_display_manager: bool,
    pub legacy_weaver: bool,
    pub display: SimulatedDisplaySpec,
    /// Amplitude of the simulated head sway in millimeters
    pub eye_sway_mm: f32,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            service_delay: Duration::ZERO,
            display_delay: Duration::ZERO,
            service_available: true,
            modern_display_manager: true,
            legacy_weaver: false,
            display: SimulatedDisplaySpec::default(),
            eye_sway_mm: 15.0,
        }
    }
}

/// Runtime-visible call, in the order it happened
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeCall {
    ContextCreated(u64),
    ContextInitialized(u64),
    ContextDeleted(u64),
    EventStreamOpened,
    EventStreamClosed,
    EyeStreamOpened,
    EyeStreamClosed,
    WeaverCreated { legacy: bool },
    SetInputViewTexture {
        width: u32,
        height: u32,
        format: TextureFormat,
    },
    SetLatencyFrames(u32),
    SetLatencyUs(u64),
    SetShaderSrgb { read: bool, write: bool },
    WeaverDestroyed { legacy: bool },
    /// A modern weaver was dropped without `destroy`
    WeaverLeaked,
}

struct State {
    settings: SimulationSettings,
    service_ready_at: Option<Instant>,
    display_ready_at: Option<Instant>,
    rejection: Option<String>,
    pinned_eyes: Option<EyePair>,
    legacy_weave_size: Option<UVec2>,
    journal: Vec<RuntimeCall>,
    event_streams: Vec<(u64, SystemEventCallback)>,
    eye_streams: Vec<(u64, EyePairCallback)>,
}

struct Shared {
    state: Mutex<State>,
    started: Instant,
    next_id: AtomicU64,
    live_contexts: AtomicU64,
    weaves: AtomicU64,
}

impl Shared {
    fn record(&self, call: RuntimeCall) {
        self.state.lock().journal.push(call);
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn service_ready(&self) -> bool {
        self.state
            .lock()
            .service_ready_at
            .is_some_and(|at| Instant::now() >= at)
    }

    fn display_ready(&self) -> bool {
        self.state
            .lock()
            .display_ready_at
            .is_some_and(|at| Instant::now() >= at)
    }

    fn display_spec(&self) -> SimulatedDisplaySpec {
        self.state.lock().settings.display
    }

    /// Tracked eyes `ahead` of now
    fn eyes_at(&self, ahead: Duration) -> EyePair {
        let (pinned, sway, viewing) = {
            let state = self.state.lock();
            (
                state.pinned_eyes,
                state.settings.eye_sway_mm,
                state.settings.display.viewing_position_mm,
            )
        };
        if let Some(pair) = pinned {
            return pair;
        }
        let t = (self.started.elapsed() + ahead).as_secs_f32();
        let head = viewing
            + Vec3::new(
                sway * (0.5 * t).sin(),
                sway * 0.3 * (0.3 * t).sin(),
                sway * (0.2 * t).sin(),
            );
        let half_ipd = Vec3::new(31.0, 0.0, 0.0);
        EyePair {
            left: head - half_ipd,
            right: head + half_ipd,
            timestamp_us: super::events::now_micros() + ahead.as_micros() as u64,
        }
    }

    fn broadcast_event(&self, event: &SystemEvent) {
        let callbacks: Vec<SystemEventCallback> = self
            .state
            .lock()
            .event_streams
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }

    fn broadcast_eyes(&self, pair: &EyePair) {
        let callbacks: Vec<EyePairCallback> = self
            .state
            .lock()
            .eye_streams
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(pair);
        }
    }
}

/// Runtime stand-in used by the demo binary and the tests
pub struct SimulatedRuntime {
    shared: Arc<Shared>,
}

impl SimulatedRuntime {
    pub fn new(settings: SimulationSettings) -> Self {
        let started = Instant::now();
        let service_ready_at = settings
            .service_available
            .then(|| started + settings.service_delay);
        let display_ready_at = Some(started + settings.display_delay);
        info!(
            "🧪 Simulated SR runtime ({} display path, {} weaver)",
            if settings.modern_display_manager { "modern" } else { "legacy" },
            if settings.legacy_weaver { "legacy" } else { "modern" }
        );
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    settings,
                    service_ready_at,
                    display_ready_at,
                    rejection: None,
                    pinned_eyes: None,
                    legacy_weave_size: None,
                    journal: Vec::new(),
                    event_streams: Vec::new(),
                    eye_streams: Vec::new(),
                }),
                started,
                next_id: AtomicU64::new(1),
                live_contexts: AtomicU64::new(0),
                weaves: AtomicU64::new(0),
            }),
        }
    }

    pub fn settings(&self) -> SimulationSettings {
        self.shared.state.lock().settings.clone()
    }

    pub fn stop_service(&self) {
        self.shared.state.lock().service_ready_at = None;
        info!("🧪 Simulated SR service stopped");
    }

    pub fn start_service_after(&self, delay: Duration) {
        self.shared.state.lock().service_ready_at = Some(Instant::now() + delay);
    }

    pub fn disconnect_display(&self) {
        self.shared.state.lock().display_ready_at = None;
    }

    pub fn connect_display_after(&self, delay: Duration) {
        self.shared.state.lock().display_ready_at = Some(Instant::now() + delay);
    }

    /// Report different display geometry from now on, as after a monitor swap
    pub fn replace_display(&self, display: SimulatedDisplaySpec) {
        let size_cm = display.physical_size_cm;
        info!("🧪 Simulated display now {}x{} cm", size_cm.x, size_cm.y);
        self.shared.state.lock().settings.display = display;
    }

    /// Make context creation fail with a non-retriable error
    pub fn reject_contexts(&self, reason: Option<String>) {
        self.shared.state.lock().rejection = reason;
    }

    /// Report `pair` from both the tracker stream and weaver prediction
    pub fn pin_eyes(&self, pair: Option<EyePair>) {
        self.shared.state.lock().pinned_eyes = pair;
    }

    /// Deliver an event on every open system event stream
    pub fn inject_event(&self, event: SystemEvent) {
        debug!("🧪 Injecting {} event", event.event_type);
        self.shared.broadcast_event(&event);
    }

    pub fn emit_event(&self, event_type: SystemEventType, message: &str) {
        self.inject_event(SystemEvent::new(
            super::events::now_micros(),
            event_type,
            message,
        ));
    }

    /// Push one eye pair to every open eye stream
    pub fn emit_eye_pair(&self, pair: EyePair) {
        self.shared.broadcast_eyes(&pair);
    }

    /// Push the current tracked pair to every open eye stream
    pub fn emit_tracked_eyes(&self) {
        let pair = self.shared.eyes_at(Duration::ZERO);
        self.shared.broadcast_eyes(&pair);
    }

    /// Stream tracked eyes from a background thread every `period`
    pub fn spawn_eye_tracker(&self, period: Duration) -> std::io::Result<EyeTrackerThread> {
        let shared = Arc::clone(&self.shared);
        let (stop, stopped) = bounded::<()>(0);
        let ticker = tick(period);
        let handle = std::thread::Builder::new()
            .name("sr-eye-tracker".into())
            .spawn(move || loop {
                select! {
                    recv(stopped) -> _ => break,
                    recv(ticker) -> _ => {
                        let pair = shared.eyes_at(Duration::ZERO);
                        shared.broadcast_eyes(&pair);
                    }
                }
            })?;
        Ok(EyeTrackerThread {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Factory for weavers of the configured generation
    ///
    /// With `surfaces`, weaving composites a preview into the backbuffer.
    pub fn weaver_factory(&self, surfaces: Option<SharedSurfaces>) -> Arc<SimulatedWeaverFactory> {
        let legacy = self.shared.state.lock().settings.legacy_weaver;
        Arc::new(SimulatedWeaverFactory {
            shared: Arc::clone(&self.shared),
            surfaces,
            legacy,
        })
    }

    pub fn journal(&self) -> Vec<RuntimeCall> {
        self.shared.state.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.shared.state.lock().journal.clear();
    }

    pub fn weave_count(&self) -> u64 {
        self.shared.weaves.load(Ordering::Acquire)
    }

    pub fn live_contexts(&self) -> u64 {
        self.shared.live_contexts.load(Ordering::Acquire)
    }

    pub fn open_event_streams(&self) -> usize {
        self.shared.state.lock().event_streams.len()
    }

    pub fn open_eye_streams(&self) -> usize {
        self.shared.state.lock().eye_streams.len()
    }

    /// Size hint passed to the most recent legacy `weave`
    pub fn last_legacy_weave_size(&self) -> Option<UVec2> {
        self.shared.state.lock().legacy_weave_size
    }
}

impl Default for SimulatedRuntime {
    fn default() -> Self {
        Self::new(SimulationSettings::default())
    }
}

impl SrRuntime for SimulatedRuntime {
    fn create_context(&self) -> Result<Box<dyn SrContext>, RuntimeError> {
        if let Some(reason) = self.shared.state.lock().rejection.clone() {
            return Err(RuntimeError::Rejected(reason));
        }
        if !self.shared.service_ready() {
            return Err(RuntimeError::ServiceUnavailable);
        }
        let id = self.shared.next_id();
        self.shared.live_contexts.fetch_add(1, Ordering::AcqRel);
        self.shared.record(RuntimeCall::ContextCreated(id));
        Ok(Box::new(SimulatedContext {
            id,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn display_probe(&self) -> Arc<dyn DisplayManagerProbe> {
        Arc::new(SimulatedProbe {
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Background eye-tracker stream; stops and joins on drop
pub struct EyeTrackerThread {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for EyeTrackerThread {
    fn drop(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Eye tracker thread panicked");
            }
        }
    }
}

struct SimulatedContext {
    id: u64,
    shared: Arc<Shared>,
}

fn close_stream(shared: &Weak<Shared>, id: u64, eyes: bool) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let mut state = shared.state.lock();
    if eyes {
        state.eye_streams.retain(|(stream, _)| *stream != id);
        state.journal.push(RuntimeCall::EyeStreamClosed);
    } else {
        state.event_streams.retain(|(stream, _)| *stream != id);
        state.journal.push(RuntimeCall::EventStreamClosed);
    }
}

impl SrContext for SimulatedContext {
    fn legacy_display(&self) -> Option<Box<dyn LegacyDisplay>> {
        Some(Box::new(SimulatedDisplay {
            shared: Arc::clone(&self.shared),
        }))
    }

    fn open_system_event_stream(
        &self,
        callback: SystemEventCallback,
    ) -> Result<StreamToken, RuntimeError> {
        let id = self.shared.next_id();
        {
            let mut state = self.shared.state.lock();
            state.event_streams.push((id, callback));
            state.journal.push(RuntimeCall::EventStreamOpened);
        }
        let shared = Arc::downgrade(&self.shared);
        Ok(StreamToken::new(move || close_stream(&shared, id, false)))
    }

    fn open_eye_pair_stream(&self, callback: EyePairCallback) -> Result<StreamToken, RuntimeError> {
        let id = self.shared.next_id();
        {
            let mut state = self.shared.state.lock();
            state.eye_streams.push((id, callback));
            state.journal.push(RuntimeCall::EyeStreamOpened);
        }
        let shared = Arc::downgrade(&self.shared);
        Ok(StreamToken::new(move || close_stream(&shared, id, true)))
    }

    fn initialize(&self) {
        self.shared.record(RuntimeCall::ContextInitialized(self.id));
    }
}

impl Drop for SimulatedContext {
    fn drop(&mut self) {
        self.shared.live_contexts.fetch_sub(1, Ordering::AcqRel);
        self.shared.record(RuntimeCall::ContextDeleted(self.id));
    }
}

struct SimulatedProbe {
    shared: Arc<Shared>,
}

impl DisplayManagerProbe for SimulatedProbe {
    fn display_manager(&self, _context: &dyn SrContext) -> Option<Box<dyn DisplayManager>> {
        let modern = self.shared.state.lock().settings.modern_display_manager;
        modern.then(|| {
            Box::new(SimulatedDisplayManager {
                shared: Arc::clone(&self.shared),
            }) as Box<dyn DisplayManager>
        })
    }
}

struct SimulatedDisplayManager {
    shared: Arc<Shared>,
}

impl DisplayManager for SimulatedDisplayManager {
    fn primary_active_display(&self) -> Option<Arc<dyn SrDisplay>> {
        self.shared.display_ready().then(|| {
            Arc::new(SimulatedDisplay {
                shared: Arc::clone(&self.shared),
            }) as Arc<dyn SrDisplay>
        })
    }
}

/// Serves both display generations; readiness follows the simulation clock
struct SimulatedDisplay {
    shared: Arc<Shared>,
}

impl SimulatedDisplay {
    fn location_now(&self) -> DisplayRect {
        if self.shared.display_ready() {
            self.shared.display_spec().location
        } else {
            DisplayRect::default()
        }
    }
}

impl SrDisplay for SimulatedDisplay {
    fn is_valid(&self) -> bool {
        self.shared.display_ready()
    }

    fn identifier(&self) -> u64 {
        self.shared.display_spec().identifier
    }

    fn resolution(&self) -> UVec2 {
        self.shared.display_spec().resolution
    }

    fn physical_resolution(&self) -> UVec2 {
        self.shared.display_spec().physical_resolution
    }

    fn physical_size_cm(&self) -> Vec2 {
        self.shared.display_spec().physical_size_cm
    }

    fn dot_pitch_cm(&self) -> f32 {
        self.shared.display_spec().dot_pitch_cm
    }

    fn location(&self) -> DisplayRect {
        self.location_now()
    }

    fn recommended_view_texture(&self) -> UVec2 {
        self.shared.display_spec().view_texture
    }

    fn default_viewing_position_mm(&self) -> Vec3 {
        self.shared.display_spec().viewing_position_mm
    }
}

impl LegacyDisplay for SimulatedDisplay {
    fn resolution(&self) -> UVec2 {
        self.shared.display_spec().resolution
    }

    fn physical_resolution(&self) -> UVec2 {
        self.shared.display_spec().physical_resolution
    }

    fn physical_size_cm(&self) -> Vec2 {
        self.shared.display_spec().physical_size_cm
    }

    fn dot_pitch_cm(&self) -> f32 {
        self.shared.display_spec().dot_pitch_cm
    }

    fn location(&self) -> DisplayRect {
        self.location_now()
    }

    fn recommended_view_texture(&self) -> UVec2 {
        self.shared.display_spec().view_texture
    }
}

/// Builds [`SimulatedWeaver`]s or [`SimulatedLegacyWeaver`]s
pub struct SimulatedWeaverFactory {
    shared: Arc<Shared>,
    surfaces: Option<SharedSurfaces>,
    legacy: bool,
}

impl WeaverFactory for SimulatedWeaverFactory {
    fn is_legacy(&self) -> bool {
        self.legacy
    }

    fn create(&self, _context: &dyn SrContext) -> Result<WeaverHandle, RuntimeError> {
        if !self.shared.service_ready() {
            return Err(RuntimeError::WeaverCreation("SR service not running".into()));
        }
        self.shared.record(RuntimeCall::WeaverCreated {
            legacy: self.legacy,
        });
        let core = WeaverCore {
            shared: Arc::clone(&self.shared),
            surfaces: self.surfaces.clone(),
            input: None,
            latency: LatencyPolicy::default(),
            shader_srgb: (false, false),
        };
        Ok(if self.legacy {
            WeaverHandle::Legacy(Box::new(SimulatedLegacyWeaver { core }))
        } else {
            WeaverHandle::Modern(Box::new(SimulatedWeaver {
                core,
                destroyed: false,
            }))
        })
    }
}

struct WeaverCore {
    shared: Arc<Shared>,
    surfaces: Option<SharedSurfaces>,
    input: Option<ViewTextureHandle>,
    latency: LatencyPolicy,
    shader_srgb: (bool, bool),
}

impl WeaverCore {
    fn set_input(&mut self, view: &ViewTextureHandle, width: u32, height: u32, format: TextureFormat) {
        self.input = Some(*view);
        self.shared.record(RuntimeCall::SetInputViewTexture {
            width,
            height,
            format,
        });
    }

    fn set_latency(&mut self, latency: LatencyPolicy) {
        self.latency = latency;
        self.shared.record(match latency {
            LatencyPolicy::Frames(frames) => RuntimeCall::SetLatencyFrames(frames),
            LatencyPolicy::Microseconds(us) => RuntimeCall::SetLatencyUs(us),
        });
    }

    fn set_shader_srgb(&mut self, read: bool, write: bool) {
        self.shader_srgb = (read, write);
        self.shared.record(RuntimeCall::SetShaderSrgb { read, write });
    }

    fn latency(&self) -> Duration {
        match self.latency {
            LatencyPolicy::Frames(frames) => FRAME_PERIOD * frames,
            LatencyPolicy::Microseconds(us) => Duration::from_micros(us),
        }
    }

    /// Average the two eye tiles into the bound backbuffer viewport
    fn weave(&self) {
        self.shared.weaves.fetch_add(1, Ordering::AcqRel);
        let (Some(surfaces), Some(input)) = (&self.surfaces, &self.input) else {
            return;
        };
        let (target, viewport) = surfaces.bound();
        if target != RenderTarget::Backbuffer {
            return;
        }
        let (read, write) = self.shader_srgb;

        surfaces.with_view(input.id, |view| {
            let eye_width = view.size().x / 2;
            let eye_height = view.size().y;
            if eye_width == 0 || eye_height == 0 {
                return;
            }
            surfaces.with_backbuffer_mut(|backbuffer| {
                let size = backbuffer.size();
                let width = viewport.width.min(size.x.saturating_sub(viewport.x));
                let height = viewport.height.min(size.y.saturating_sub(viewport.y));
                for y in 0..height {
                    let vy = (((y as f32 + 0.5) / viewport.height as f32) * eye_height as f32) as u32;
                    let vy = vy.min(eye_height - 1);
                    for x in 0..width {
                        let vx = (((x as f32 + 0.5) / viewport.width as f32) * eye_width as f32) as u32;
                        let vx = vx.min(eye_width - 1);
                        let left = view.read(vx, vy);
                        let right = view.read(eye_width + vx, vy);
                        let mut mixed = [0.0; 4];
                        for c in 0..4 {
                            let (mut l, mut r) = (left[c], right[c]);
                            if read && c < 3 {
                                l = srgb_to_linear(l);
                                r = srgb_to_linear(r);
                            }
                            mixed[c] = (l + r) * 0.5;
                            if write && c < 3 {
                                mixed[c] = linear_to_srgb(mixed[c]);
                            }
                        }
                        backbuffer.write(viewport.x + x, viewport.y + y, mixed);
                    }
                }
            });
        });
    }
}

/// Modern simulated weaver with eye prediction
pub struct SimulatedWeaver {
    core: WeaverCore,
    destroyed: bool,
}

impl Weaver for SimulatedWeaver {
    fn set_input_view_texture(
        &mut self,
        view: &ViewTextureHandle,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) {
        self.core.set_input(view, width, height, format);
    }

    fn set_latency_in_frames(&mut self, frames: u32) {
        self.core.set_latency(LatencyPolicy::Frames(frames));
    }

    fn set_latency_us(&mut self, microseconds: u64) {
        self.core.set_latency(LatencyPolicy::Microseconds(microseconds));
    }

    fn set_shader_srgb_conversion(&mut self, read: bool, write: bool) {
        self.core.set_shader_srgb(read, write);
    }

    fn predicted_eye_positions(&self) -> EyePair {
        self.core.shared.eyes_at(self.core.latency())
    }

    fn weave(&mut self) {
        self.core.weave();
    }

    fn destroy(mut self: Box<Self>) {
        self.destroyed = true;
        self.core
            .shared
            .record(RuntimeCall::WeaverDestroyed { legacy: false });
    }
}

impl Drop for SimulatedWeaver {
    fn drop(&mut self) {
        if !self.destroyed {
            warn!("Modern weaver dropped without destroy");
            self.core.shared.record(RuntimeCall::WeaverLeaked);
        }
    }
}

/// Legacy simulated weaver; no prediction, released by drop
pub struct SimulatedLegacyWeaver {
    core: WeaverCore,
}

impl LegacyWeaver for SimulatedLegacyWeaver {
    fn set_input_view_texture(
        &mut self,
        view: &ViewTextureHandle,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) {
        self.core.set_input(view, width, height, format);
    }

    fn set_latency_in_frames(&mut self, frames: u32) {
        self.core.set_latency(LatencyPolicy::Frames(frames));
    }

    fn set_latency_us(&mut self, microseconds: u64) {
        self.core.set_latency(LatencyPolicy::Microseconds(microseconds));
    }

    fn set_shader_srgb_conversion(&mut self, read: bool, write: bool) {
        self.core.set_shader_srgb(read, write);
    }

    fn weave(&mut self, width: u32, height: u32) {
        self.core.shared.state.lock().legacy_weave_size = Some(UVec2::new(width, height));
        self.core.weave();
    }
}

impl Drop for SimulatedLegacyWeaver {
    fn drop(&mut self) {
        self.core
            .shared
            .record(RuntimeCall::WeaverDestroyed { legacy: true });
    }
}
