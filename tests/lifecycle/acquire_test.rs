use std::sync::Arc;
use std::time::{Duration, Instant};

use sr_weave::lifecycle::{ContextController, LifecycleError, LifecycleState};
use sr_weave::runtime::simulated::{SimulatedRuntime, SimulationSettings};
use sr_weave::runtime::{RuntimeError, SrRuntime};

use crate::test_utils::{quick_lifecycle, still_simulation};

fn controller_on(settings: SimulationSettings) -> (ContextController, Arc<SimulatedRuntime>) {
    let runtime = Arc::new(SimulatedRuntime::new(settings));
    let controller = ContextController::new(Arc::clone(&runtime) as Arc<dyn SrRuntime>, quick_lifecycle());
    (controller, runtime)
}

#[test]
fn test_acquire_times_out_when_service_never_starts() {
    let mut settings = still_simulation();
    settings.service_available = false;
    let (mut controller, runtime) = controller_on(settings);

    let started = Instant::now();
    let result = controller.acquire(Duration::from_secs(1));
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(LifecycleError::ServiceTimeout(_))), "{:?}", result);
    assert!(elapsed >= Duration::from_secs(1), "gave up after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(3), "overran deadline: {:?}", elapsed);
    assert_eq!(controller.state(), LifecycleState::Absent);
    assert_eq!(runtime.live_contexts(), 0);
}

#[test]
fn test_acquire_retries_until_service_starts() {
    let mut settings = still_simulation();
    settings.service_delay = Duration::from_millis(150);
    let (mut controller, runtime) = controller_on(settings);

    controller.acquire(Duration::from_secs(1)).expect("service comes up in time");
    assert_eq!(runtime.live_contexts(), 1);
    assert_eq!(controller.state(), LifecycleState::DisplayWaiting);
    assert!(controller.descriptor().is_some_and(|d| d.valid));
}

#[test]
fn test_acquire_waits_for_display_within_same_deadline() {
    let mut settings = still_simulation();
    settings.display_delay = Duration::from_millis(500);
    let (mut controller, _runtime) = controller_on(settings);

    let started = Instant::now();
    controller.acquire(Duration::from_secs(1)).expect("display ready in time");
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(450), "returned early: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(1) + Duration::from_millis(200));
    let descriptor = controller.descriptor().expect("display acquired");
    assert!(descriptor.valid);
    assert_eq!(descriptor.recommended_view_texture, crate::test_utils::constants::EYE_SIZE);
}

#[test]
fn test_display_timeout_releases_context() {
    let (mut controller, runtime) = controller_on(still_simulation());
    runtime.disconnect_display();

    let result = controller.acquire(Duration::from_millis(200));
    assert!(matches!(result, Err(LifecycleError::DisplayTimeout(_))), "{:?}", result);
    assert_eq!(runtime.live_contexts(), 0);
    assert!(controller.display().is_none());
}

#[test]
fn test_rejection_is_not_retried() {
    let (mut controller, runtime) = controller_on(still_simulation());
    runtime.reject_contexts(Some("unsupported device".into()));

    let started = Instant::now();
    let result = controller.acquire(Duration::from_secs(1));
    assert!(
        matches!(result, Err(LifecycleError::Runtime(RuntimeError::Rejected(_)))),
        "{:?}",
        result
    );
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn test_install_requires_acquired_context() {
    let runtime = Arc::new(SimulatedRuntime::new(still_simulation()));
    let backend = sr_weave::render::SoftwareBackend::new(
        crate::test_utils::constants::WINDOW_SIZE,
        sr_weave::render::TextureFormat::Rgba8Unorm,
    )
    .unwrap();
    let view = sr_weave::render::ViewTextureHandle {
        id: 1,
        desc: sr_weave::render::ViewTextureDesc {
            eye_size: crate::test_utils::constants::EYE_SIZE,
            format: sr_weave::render::TextureFormat::Rgba8Unorm,
        },
    };
    let eyes = sr_weave::eyes::EyePositionProvider::default();
    let mut controller = ContextController::new(Arc::clone(&runtime) as Arc<dyn SrRuntime>, quick_lifecycle());

    let plan = crate::test_utils::install_plan(&runtime, &backend, view, &eyes, true);
    assert!(matches!(controller.install(plan), Err(LifecycleError::NotAcquired)));
    assert!(runtime.journal().is_empty());
}
