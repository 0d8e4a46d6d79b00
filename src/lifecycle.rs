//! Context Lifecycle Controller
//!
//! Brings the SR runtime up, keeps it up, and rebuilds it when the runtime
//! reports the context invalid:
//! - `acquire` polls the service, then the display, against one deadline
//! - `install` builds listeners and the weaver, then initializes the context
//! - `tick` observes the invalidation flag at frame boundaries and rebuilds
//!
//! Teardown always runs weaver, eye listener, event listener, context. The
//! invalidation flag is the only state shared with runtime threads.

use bevy::math::UVec2;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::display::{DisplayAccess, DisplayDescriptor};
use crate::eyes::{EyePairListener, EyePairSlot};
use crate::poll::{Deadline, DEFAULT_POLL_INTERVAL};
use crate::render::{ColorSpacePolicy, GraphicsBackend, ViewTextureHandle};
use crate::runtime::{
    RuntimeError, SrContext, SrRuntime, SystemEvent, SystemEventCallback, SystemEventListener,
    SystemEventType,
};
use crate::weaver::{LatencyPolicy, WeaverFactory, WeaverHandle};

pub const DEFAULT_STARTUP_DEADLINE: Duration = Duration::from_secs(10);
pub const DEFAULT_RECOVERY_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("SR service did not become available within {0:?}")]
    ServiceTimeout(Duration),

    #[error("SR display did not become ready within {0:?}")]
    DisplayTimeout(Duration),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("no SR context; acquire must succeed first")]
    NotAcquired,

    #[error("nothing to rebuild; install has never succeeded")]
    NotInstalled,
}

/// Where the controller is in the context's life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Absent,
    Connecting,
    DisplayWaiting,
    Ready,
    Invalidated,
}

/// Set by runtime threads, drained by the frame loop
///
/// Any number of signals between two drains count as one.
#[derive(Debug, Clone, Default)]
pub struct InvalidationFlag {
    inner: Arc<Mutex<InvalidationState>>,
}

#[derive(Debug, Default)]
struct InvalidationState {
    pending: bool,
    signals: u64,
}

impl InvalidationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        let mut state = self.inner.lock();
        state.pending = true;
        state.signals += 1;
    }

    /// Clear the flag, returning whether it was set
    pub fn take(&self) -> bool {
        std::mem::take(&mut self.inner.lock().pending)
    }

    pub fn is_set(&self) -> bool {
        self.inner.lock().pending
    }

    /// Signals received over the flag's lifetime
    pub fn signal_count(&self) -> u64 {
        self.inner.lock().signals
    }
}

/// Deadlines and cadence of the polling phases
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifecycleSettings {
    pub startup_deadline: Duration,
    pub recovery_deadline: Duration,
    pub poll_interval: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            startup_deadline: DEFAULT_STARTUP_DEADLINE,
            recovery_deadline: DEFAULT_RECOVERY_DEADLINE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Everything `install` needs; kept to replay the install after a rebuild
#[derive(Clone)]
pub struct InstallPlan {
    pub weaver_factory: Arc<dyn WeaverFactory>,
    pub view_texture: ViewTextureHandle,
    pub color_policy: ColorSpacePolicy,
    pub latency: LatencyPolicy,
    /// Open the eye-pair stream; always done for legacy weavers
    pub eye_listener: bool,
    pub eye_slot: Arc<EyePairSlot>,
}

/// Result of a frame-boundary check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Unchanged,
    Rebuilt,
}

/// Owner of the context and every object created from it
pub struct ContextController {
    runtime: Arc<dyn SrRuntime>,
    settings: LifecycleSettings,
    state: LifecycleState,
    invalidation: InvalidationFlag,
    weaver: Option<WeaverHandle>,
    eye_listener: Option<EyePairListener>,
    event_listener: Option<SystemEventListener>,
    display: Option<DisplayAccess>,
    context: Option<Box<dyn SrContext>>,
    plan: Option<InstallPlan>,
    rebuilds: u32,
}

impl ContextController {
    pub fn new(runtime: Arc<dyn SrRuntime>, settings: LifecycleSettings) -> Self {
        Self {
            runtime,
            settings,
            state: LifecycleState::Absent,
            invalidation: InvalidationFlag::new(),
            weaver: None,
            eye_listener: None,
            event_listener: None,
            display: None,
            context: None,
            plan: None,
            rebuilds: 0,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    pub fn invalidation_flag(&self) -> InvalidationFlag {
        self.invalidation.clone()
    }

    /// Completed rebuilds since construction
    pub fn rebuild_count(&self) -> u32 {
        self.rebuilds
    }

    pub fn weaver(&self) -> Option<&WeaverHandle> {
        self.weaver.as_ref()
    }

    pub fn weaver_mut(&mut self) -> Option<&mut WeaverHandle> {
        self.weaver.as_mut()
    }

    pub fn display(&self) -> Option<&DisplayAccess> {
        self.display.as_ref()
    }

    pub fn descriptor(&self) -> Option<DisplayDescriptor> {
        self.display.as_ref().map(DisplayAccess::descriptor)
    }

    pub fn has_eye_listener(&self) -> bool {
        self.eye_listener.is_some()
    }

    pub fn has_event_listener(&self) -> bool {
        self.event_listener.is_some()
    }

    /// Ready and not waiting on a rebuild
    pub fn is_ready(&self) -> bool {
        self.state == LifecycleState::Ready && !self.invalidation.is_set()
    }

    /// Connect to the service, then wait for the display, within `deadline`
    pub fn acquire(&mut self, deadline: Duration) -> Result<(), LifecycleError> {
        let deadline = Deadline::after(deadline);
        self.set_state(LifecycleState::Connecting);

        let context = match self.connect(&deadline) {
            Ok(context) => context,
            Err(e) => {
                self.set_state(LifecycleState::Absent);
                return Err(e);
            }
        };

        self.set_state(LifecycleState::DisplayWaiting);
        let probe = self.runtime.display_probe();
        let mut display = DisplayAccess::open(context.as_ref(), probe.as_ref());
        if !display.wait_for_display(context.as_ref(), &deadline, self.settings.poll_interval) {
            warn!("⚠️ SR display not ready after {:?}", deadline.elapsed());
            drop(display);
            drop(context);
            self.set_state(LifecycleState::Absent);
            return Err(LifecycleError::DisplayTimeout(deadline.budget()));
        }

        let modern = display.using_modern();
        info!(
            "✅ SR context acquired in {:?} ({} display path)",
            deadline.elapsed(),
            if modern { "modern" } else { "legacy" }
        );
        self.display = Some(display);
        self.context = Some(context);
        Ok(())
    }

    fn connect(&self, deadline: &Deadline) -> Result<Box<dyn SrContext>, LifecycleError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.runtime.create_context() {
                Ok(context) => return Ok(context),
                Err(e) if e.is_retriable() => {
                    debug!("SR service not available (attempt {})", attempt);
                }
                Err(e) => {
                    error!("❌ SR context creation failed: {}", e);
                    return Err(e.into());
                }
            }
            if deadline.expired() {
                warn!("⚠️ SR service not available after {} attempts", attempt);
                return Err(LifecycleError::ServiceTimeout(deadline.budget()));
            }
            std::thread::sleep(self.settings.poll_interval);
        }
    }

    /// Build listeners and the weaver on the acquired context, then initialize it
    pub fn install(&mut self, plan: InstallPlan) -> Result<(), LifecycleError> {
        let Some(context) = self.context.as_deref() else {
            return Err(LifecycleError::NotAcquired);
        };

        let flag = self.invalidation.clone();
        let handler: SystemEventCallback = Arc::new(move |event: &SystemEvent| {
            if event.event_type == SystemEventType::ContextInvalid {
                flag.signal();
            }
        });
        let event_listener = SystemEventListener::open(context, handler)?;

        let eye_listener = if plan.eye_listener || plan.weaver_factory.is_legacy() {
            Some(EyePairListener::open(context, Arc::clone(&plan.eye_slot))?)
        } else {
            None
        };

        let recommended = self
            .display
            .as_ref()
            .map(DisplayAccess::recommended_view_texture)
            .unwrap_or(UVec2::ZERO);
        debug!(
            "Display recommends {}x{} per eye, view texture is {}x{} per eye",
            recommended.x,
            recommended.y,
            plan.view_texture.desc.eye_size.x,
            plan.view_texture.desc.eye_size.y
        );

        let mut weaver = plan.weaver_factory.create(context)?;
        weaver.configure(&plan.view_texture, plan.color_policy, plan.latency);

        // The runtime only finishes configuring the weaver here.
        context.initialize();

        info!(
            "✅ SR runtime installed ({} weaver{})",
            if weaver.is_legacy() { "legacy" } else { "modern" },
            if eye_listener.is_some() { ", eye stream" } else { "" }
        );

        self.event_listener = Some(event_listener);
        self.eye_listener = eye_listener;
        self.weaver = Some(weaver);
        self.plan = Some(plan);
        self.set_state(LifecycleState::Ready);
        Ok(())
    }

    /// Flag the context invalid; picked up by the next `tick`
    pub fn signal_invalid(&self) {
        self.invalidation.signal();
    }

    /// Deliver `event` through the same entry point the runtime uses
    pub fn inject_event(&self, event: &SystemEvent) {
        match &self.event_listener {
            Some(listener) => listener.accept(event),
            None => warn!("No event listener, dropped {} event", event.event_type),
        }
    }

    /// Frame-boundary check; rebuilds everything if the context was invalidated
    pub fn tick(&mut self, graphics: &mut dyn GraphicsBackend) -> Result<TickOutcome, LifecycleError> {
        if !self.invalidation.take() {
            return Ok(TickOutcome::Unchanged);
        }

        let Some(plan) = self.plan.clone() else {
            return Err(LifecycleError::NotInstalled);
        };

        warn!("🔄 SR context invalidated, rebuilding");
        self.set_state(LifecycleState::Invalidated);
        graphics.wait_for_gpu();
        self.teardown();

        self.acquire(self.settings.recovery_deadline)?;
        self.install(plan)?;

        self.rebuilds += 1;
        info!("✅ SR context rebuilt (rebuild #{})", self.rebuilds);
        Ok(TickOutcome::Rebuilt)
    }

    /// Release everything built from the context, context last
    pub fn shutdown(&mut self) {
        if self.context.is_none() && self.weaver.is_none() {
            return;
        }
        self.teardown();
        self.plan = None;
        self.set_state(LifecycleState::Absent);
        info!("SR context shut down");
    }

    fn teardown(&mut self) {
        if let Some(weaver) = self.weaver.take() {
            weaver.release();
        }
        if self.eye_listener.take().is_some() {
            debug!("Eye pair listener deleted");
        }
        if self.event_listener.take().is_some() {
            debug!("System event listener deleted");
        }
        self.display = None;
        if self.context.take().is_some() {
            info!("SR context deleted");
        }
    }

    fn set_state(&mut self, state: LifecycleState) {
        if self.state != state {
            debug!("Lifecycle {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}

impl Drop for ContextController {
    fn drop(&mut self) {
        self.teardown();
    }
}
