use std::sync::Arc;
use std::time::Duration;

use sr_weave::lifecycle::{ContextController, LifecycleError, LifecycleState, TickOutcome};
use sr_weave::render::{GraphicsBackend, SoftwareBackend, TextureFormat};
use sr_weave::runtime::simulated::{RuntimeCall, SimulatedRuntime};
use sr_weave::runtime::{SrRuntime, SystemEvent, SystemEventType};

use crate::test_utils::{call_kinds, constants, quick_lifecycle, ready_controller, still_simulation};

const INSTALL_SEQUENCE: [&str; 7] = [
    "ContextCreated",
    "EventStreamOpened",
    "EyeStreamOpened",
    "WeaverCreated",
    "SetInputViewTexture",
    "SetLatencyFrames",
    "ContextInitialized",
];

const TEARDOWN_SEQUENCE: [&str; 4] = [
    "WeaverDestroyed",
    "EyeStreamClosed",
    "EventStreamClosed",
    "ContextDeleted",
];

fn runtime() -> Arc<SimulatedRuntime> {
    Arc::new(SimulatedRuntime::new(still_simulation()))
}

#[test]
fn test_install_initializes_context_after_weaver_setup() {
    let runtime = runtime();
    let ready = ready_controller(&runtime, true);
    let journal = runtime.journal();

    assert_eq!(call_kinds(&journal), INSTALL_SEQUENCE);
    assert!(journal.contains(&RuntimeCall::SetInputViewTexture {
        width: constants::EYE_SIZE.x * 2,
        height: constants::EYE_SIZE.y,
        format: TextureFormat::Rgba8UnormSrgb,
    }));
    assert!(journal.contains(&RuntimeCall::SetLatencyFrames(2)));
    assert!(ready.controller.is_ready());
    assert_eq!(ready.controller.state(), LifecycleState::Ready);
}

#[test]
fn test_eye_listener_is_optional_for_modern_weavers() {
    let runtime = runtime();
    let ready = ready_controller(&runtime, false);
    assert!(!ready.controller.has_eye_listener());
    assert_eq!(runtime.open_eye_streams(), 0);
    assert!(!call_kinds(&runtime.journal()).contains(&"EyeStreamOpened"));
}

#[test]
fn test_burst_of_invalid_events_rebuilds_once() {
    let runtime = runtime();
    let mut ready = ready_controller(&runtime, true);
    runtime.clear_journal();

    let senders: Vec<_> = (0..8)
        .map(|i| {
            let runtime = Arc::clone(&runtime);
            std::thread::spawn(move || {
                runtime.emit_event(SystemEventType::ContextInvalid, &format!("invalid #{}", i))
            })
        })
        .collect();
    for sender in senders {
        sender.join().unwrap();
    }
    assert_eq!(ready.controller.invalidation_flag().signal_count(), 8);
    assert!(!ready.controller.is_ready());

    let waits_before = ready.backend.gpu_waits();
    assert_eq!(ready.controller.tick(&mut ready.backend).unwrap(), TickOutcome::Rebuilt);
    assert_eq!(ready.controller.tick(&mut ready.backend).unwrap(), TickOutcome::Unchanged);
    assert_eq!(ready.controller.rebuild_count(), 1);
    assert_eq!(ready.backend.gpu_waits(), waits_before + 1);

    let expected: Vec<&str> = TEARDOWN_SEQUENCE
        .iter()
        .chain(INSTALL_SEQUENCE.iter())
        .copied()
        .collect();
    assert_eq!(call_kinds(&runtime.journal()), expected);
    assert_eq!(runtime.live_contexts(), 1);
    assert_eq!(runtime.open_event_streams(), 1);
    assert!(ready.controller.is_ready());
}

#[test]
fn test_other_events_do_not_invalidate() {
    let runtime = runtime();
    let mut ready = ready_controller(&runtime, true);

    runtime.emit_event(SystemEventType::Info, "hello");
    runtime.emit_event(SystemEventType::UserLost, "viewer left");
    runtime.emit_event(SystemEventType::Unknown(99), "future event");

    assert_eq!(ready.controller.tick(&mut ready.backend).unwrap(), TickOutcome::Unchanged);
    assert_eq!(ready.controller.invalidation_flag().signal_count(), 0);
}

#[test]
fn test_injected_event_takes_runtime_path() {
    let runtime = runtime();
    let mut ready = ready_controller(&runtime, true);

    ready.controller.inject_event(&SystemEvent::synthetic_context_invalid());
    assert_eq!(ready.controller.tick(&mut ready.backend).unwrap(), TickOutcome::Rebuilt);
}

#[test]
fn test_rebuild_fails_when_service_stays_down() {
    let runtime = runtime();
    let mut ready = ready_controller(&runtime, true);

    runtime.stop_service();
    ready.controller.signal_invalid();
    let result = ready.controller.tick(&mut ready.backend);

    assert!(matches!(result, Err(LifecycleError::ServiceTimeout(_))), "{:?}", result);
    assert_eq!(runtime.live_contexts(), 0);
    assert!(ready.controller.weaver().is_none());
    assert!(!runtime.journal().contains(&RuntimeCall::WeaverLeaked));
}

#[test]
fn test_tick_before_install_has_nothing_to_rebuild() {
    let runtime = runtime();
    let mut backend = SoftwareBackend::new(constants::WINDOW_SIZE, TextureFormat::Rgba8Unorm).unwrap();
    let mut controller = ContextController::new(Arc::clone(&runtime) as Arc<dyn SrRuntime>, quick_lifecycle());

    assert_eq!(controller.tick(&mut backend).unwrap(), TickOutcome::Unchanged);
    controller.signal_invalid();
    assert!(matches!(controller.tick(&mut backend), Err(LifecycleError::NotInstalled)));
}

#[test]
fn test_shutdown_releases_in_reverse_order() {
    let runtime = runtime();
    let mut ready = ready_controller(&runtime, true);
    runtime.clear_journal();

    ready.controller.shutdown();
    assert_eq!(call_kinds(&runtime.journal()), TEARDOWN_SEQUENCE);
    assert_eq!(runtime.live_contexts(), 0);
    assert_eq!(runtime.open_event_streams(), 0);
    assert_eq!(runtime.open_eye_streams(), 0);
    assert_eq!(ready.controller.state(), LifecycleState::Absent);

    runtime.clear_journal();
    ready.controller.shutdown();
    assert!(runtime.journal().is_empty());
}

#[test]
fn test_dropping_controller_tears_down() {
    let runtime = runtime();
    let ready = ready_controller(&runtime, false);
    runtime.clear_journal();

    drop(ready);
    assert_eq!(
        call_kinds(&runtime.journal()),
        ["WeaverDestroyed", "EventStreamClosed", "ContextDeleted"]
    );
    assert_eq!(runtime.live_contexts(), 0);
}

#[test]
fn test_legacy_weaver_forces_eye_stream_and_is_dropped() {
    let mut settings = still_simulation();
    settings.legacy_weaver = true;
    let runtime = Arc::new(SimulatedRuntime::new(settings));
    let mut ready = ready_controller(&runtime, false);

    assert!(ready.controller.has_eye_listener());
    let weaver = ready.controller.weaver().expect("installed");
    assert!(weaver.is_legacy());
    assert_eq!(weaver.predicted_eye_positions(), None);

    ready.controller.shutdown();
    let journal = runtime.journal();
    assert!(journal.contains(&RuntimeCall::WeaverDestroyed { legacy: true }));
    assert!(!journal.contains(&RuntimeCall::WeaverLeaked));
}

#[test]
fn test_recovery_uses_its_own_deadline() {
    let runtime = runtime();
    let mut ready = ready_controller(&runtime, true);
    assert_eq!(ready.controller.settings().recovery_deadline, Duration::from_millis(300));

    // The service returns well inside the recovery deadline.
    runtime.stop_service();
    runtime.start_service_after(Duration::from_millis(100));
    ready.controller.signal_invalid();
    let backend: &mut dyn GraphicsBackend = &mut ready.backend;
    assert_eq!(ready.controller.tick(backend).unwrap(), TickOutcome::Rebuilt);
}
