use bevy::math::{UVec2, Vec2, Vec3};
use std::sync::Arc;
use std::time::Duration;

use sr_weave::display::{
    DisplayAccess, DisplayManager, DisplayRect, LegacyDisplay, LegacyOnlyProbe, SharedLibraryProbe,
    FALLBACK_PHYSICAL_SIZE_CM, FALLBACK_RESOLUTION, FALLBACK_VIEWING_POSITION_MM,
};
use sr_weave::display::DisplayManagerProbe;
use sr_weave::eyes::EyePair;
use sr_weave::lifecycle::ContextController;
use sr_weave::poll::Deadline;
use sr_weave::runtime::simulated::SimulatedRuntime;
use sr_weave::runtime::{
    EyePairCallback, RuntimeError, SrContext, SrRuntime, StreamToken, SystemEventCallback,
};

use crate::test_utils::{quick_lifecycle, still_simulation};

/// Context of a runtime exposing neither display generation
struct BareContext;

impl SrContext for BareContext {
    fn legacy_display(&self) -> Option<Box<dyn LegacyDisplay>> {
        None
    }

    fn open_system_event_stream(&self, _callback: SystemEventCallback) -> Result<StreamToken, RuntimeError> {
        Ok(StreamToken::detached())
    }

    fn open_eye_pair_stream(&self, _callback: EyePairCallback) -> Result<StreamToken, RuntimeError> {
        Ok(StreamToken::detached())
    }

    fn initialize(&self) {}
}

struct NoManagerProbe;

impl DisplayManagerProbe for NoManagerProbe {
    fn display_manager(&self, _context: &dyn SrContext) -> Option<Box<dyn DisplayManager>> {
        None
    }
}

#[test]
fn test_legacy_runtime_uses_display_object_and_fallback_viewer() {
    let mut settings = still_simulation();
    settings.modern_display_manager = false;
    settings.display.viewing_position_mm = Vec3::new(10.0, 20.0, 700.0);
    let runtime = Arc::new(SimulatedRuntime::new(settings.clone()));
    let mut controller = ContextController::new(runtime as Arc<dyn SrRuntime>, quick_lifecycle());
    controller.acquire(Duration::from_secs(1)).unwrap();

    let display = controller.display().expect("acquired");
    assert!(!display.using_modern());
    assert!(display.is_display_valid());

    let viewing = display.default_viewing_position();
    assert_eq!(viewing.position_mm, Vec3::new(0.0, 0.0, 600.0));
    assert!(!viewing.from_display);

    // Geometry still comes from the legacy display object.
    assert_eq!(display.resolution(), settings.display.resolution);
    assert_eq!(display.physical_size_cm(), settings.display.physical_size_cm);
    assert_eq!(display.identifier(), 0);
}

#[test]
fn test_modern_runtime_reports_viewer_from_display() {
    let mut settings = still_simulation();
    settings.display.viewing_position_mm = Vec3::new(10.0, 20.0, 700.0);
    let runtime = Arc::new(SimulatedRuntime::new(settings));
    let mut controller = ContextController::new(runtime as Arc<dyn SrRuntime>, quick_lifecycle());
    controller.acquire(Duration::from_secs(1)).unwrap();

    let display = controller.display().expect("acquired");
    assert!(display.using_modern());
    let viewing = display.default_viewing_position();
    assert_eq!(viewing.position_mm, Vec3::new(10.0, 20.0, 700.0));
    assert!(viewing.from_display);
    assert_eq!(display.identifier(), 1);
}

#[test]
fn test_descriptor_converts_to_millimeters() {
    let runtime = Arc::new(SimulatedRuntime::new(still_simulation()));
    let mut controller = ContextController::new(runtime as Arc<dyn SrRuntime>, quick_lifecycle());
    controller.acquire(Duration::from_secs(1)).unwrap();

    let descriptor = controller.descriptor().unwrap();
    assert!(descriptor.valid);
    assert!((descriptor.physical_size_mm - Vec2::new(345.0, 194.0)).length() < 1e-3);
    assert!((descriptor.dot_pitch_mm - 0.09).abs() < 1e-6);
    let fov = descriptor.field_of_view();
    assert!((fov.x - 2.0 * (172.5f32).atan2(600.0)).abs() < 1e-5);
}

#[test]
fn test_queries_fall_back_without_any_display() {
    let display = DisplayAccess::open(&BareContext, &NoManagerProbe);
    assert!(!display.using_modern());
    assert!(!display.is_display_valid());
    assert_eq!(display.resolution(), FALLBACK_RESOLUTION);
    assert_eq!(display.resolution_width(), FALLBACK_RESOLUTION.x);
    assert_eq!(display.physical_size_cm(), FALLBACK_PHYSICAL_SIZE_CM);
    assert_eq!(display.default_viewing_position().position_mm, FALLBACK_VIEWING_POSITION_MM);

    let descriptor = display.descriptor();
    assert!(!descriptor.valid);
    assert_eq!(descriptor.recommended_view_texture, UVec2::ZERO);
    assert!(!descriptor.location.has_area());
    assert_eq!(display.location(), DisplayRect::default());
}

#[test]
fn test_wait_for_display_gives_up_at_deadline() {
    let mut display = DisplayAccess::open(&BareContext, &LegacyOnlyProbe);
    let deadline = Deadline::after(Duration::from_millis(50));
    assert!(!display.wait_for_display(&BareContext, &deadline, Duration::from_millis(5)));
    assert!(deadline.expired());
}

#[test]
fn test_display_becomes_valid_after_refresh() {
    let runtime = SimulatedRuntime::new(still_simulation());
    runtime.disconnect_display();
    let context = runtime.create_context().unwrap();
    let probe = runtime.display_probe();

    let mut display = DisplayAccess::open(context.as_ref(), probe.as_ref());
    assert!(display.using_modern());
    assert!(!display.is_display_valid());

    runtime.connect_display_after(Duration::ZERO);
    display.refresh(context.as_ref());
    assert!(display.is_display_valid());
    assert_eq!(display.recommended_view_texture(), crate::test_utils::constants::EYE_SIZE);
}

#[test]
fn test_missing_runtime_module_means_legacy_path() {
    let probe = SharedLibraryProbe::with_candidates(["sr_weave_no_such_display_module".to_string()]);
    assert!(!probe.is_available());

    let runtime = SimulatedRuntime::new(still_simulation());
    let context = runtime.create_context().unwrap();
    let display = DisplayAccess::open(context.as_ref(), &probe);
    assert!(!display.using_modern());
    assert!(display.is_display_valid());
}

#[test]
fn test_eye_pair_default_is_centered_viewer() {
    let pair = EyePair::default();
    assert!((pair.ipd() - 60.0).abs() < 1e-4);
    assert_eq!((pair.left + pair.right) * 0.5, Vec3::new(0.0, 0.0, 600.0));
}
