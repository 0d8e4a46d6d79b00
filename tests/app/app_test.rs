use bevy::math::{UVec2, Vec2, Vec3};
use std::time::{Duration, Instant};

use sr_weave::app::{AppControl, SceneSource};
use sr_weave::error::{AppError, ExitStatus};
use sr_weave::eyes::{EyePair, EyeSource};
use sr_weave::render::{ColorSpacePolicy, FrameOutcome, TextureFormat, Viewport};
use sr_weave::projection::ScreenRect;
use sr_weave::runtime::simulated::{RuntimeCall, SimulatedDisplaySpec};
use sr_weave::window::{Key, WindowEvent, MIN_WINDOW_SIZE};

use crate::test_utils::{call_kinds, constants, launch, still_cube, test_config, write_stereo_png, Harness};

const FRAME: Duration = Duration::from_millis(16);

fn cube_app() -> Harness {
    launch(test_config(), still_cube()).expect("bring-up succeeds")
}

fn exit_status_of(result: Result<Harness, AppError>) -> ExitStatus {
    match result {
        Ok(_) => ExitStatus::Success,
        Err(e) => e.exit_status(),
    }
}

#[test]
fn test_missing_service_exits_with_code_one() {
    let mut config = test_config();
    config.simulation.service_available = false;

    let started = Instant::now();
    let status = exit_status_of(launch(config, still_cube()));
    assert_eq!(status, ExitStatus::ServiceUnavailable);
    assert_eq!(status.code(), 1);
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[test]
fn test_bring_up_failures_map_to_exit_codes() {
    let mut config = test_config();
    config.window.width = 0;
    assert_eq!(exit_status_of(launch(config, still_cube())).code(), 5);

    let missing = SceneSource::StereoImage("sr_weave_missing_stereo_image.png".into());
    assert_eq!(exit_status_of(launch(test_config(), missing)).code(), 7);
}

#[test]
fn test_bring_up_installs_and_renders() {
    let mut harness = cube_app();
    assert!(harness.app.controller().is_ready());
    assert_eq!(harness.app.backend().swapchain_size(), constants::WINDOW_SIZE);
    assert_eq!(harness.app.renderer().eye_size(), constants::EYE_SIZE);
    assert!(harness
        .runtime
        .journal()
        .contains(&RuntimeCall::SetInputViewTexture {
            width: constants::EYE_SIZE.x * 2,
            height: constants::EYE_SIZE.y,
            format: TextureFormat::Rgba8UnormSrgb,
        }));

    let report = harness.app.frame(FRAME).unwrap();
    assert!(!report.rebuilt);
    assert!(matches!(report.outcome, FrameOutcome::Rendered { woven: true, .. }));
    assert_eq!(harness.runtime.weave_count(), 1);
}

#[test]
fn test_shader_srgb_policy_configures_weaver_conversion() {
    let mut config = test_config();
    config.render.color_space = ColorSpacePolicy::ShaderSrgb;
    let harness = launch(config, still_cube()).unwrap();
    let journal = harness.runtime.journal();
    assert!(journal.contains(&RuntimeCall::SetShaderSrgb {
        read: true,
        write: true
    }));
    assert!(journal.contains(&RuntimeCall::SetInputViewTexture {
        width: constants::EYE_SIZE.x * 2,
        height: constants::EYE_SIZE.y,
        format: TextureFormat::Rgba8Unorm,
    }));
}

#[test]
fn test_c_key_rebuilds_once_on_next_frame() {
    let mut harness = cube_app();
    harness.app.frame(FRAME).unwrap();
    harness.runtime.clear_journal();

    for _ in 0..3 {
        let control = harness
            .app
            .handle_window_event(WindowEvent::KeyDown(Key::Char('c')))
            .unwrap();
        assert_eq!(control, AppControl::Continue);
    }
    assert!(harness.runtime.journal().is_empty(), "rebuild must wait for the frame");

    let report = harness.app.frame(FRAME).unwrap();
    assert!(report.rebuilt);
    assert!(matches!(report.outcome, FrameOutcome::Rendered { woven: true, .. }));
    assert_eq!(harness.app.controller().rebuild_count(), 1);
    assert_eq!(
        call_kinds(&harness.runtime.journal()),
        [
            "WeaverDestroyed",
            "EyeStreamClosed",
            "EventStreamClosed",
            "ContextDeleted",
            "ContextCreated",
            "EventStreamOpened",
            "EyeStreamOpened",
            "WeaverCreated",
            "SetInputViewTexture",
            "SetLatencyFrames",
            "ContextInitialized",
        ]
    );

    assert!(!harness.app.frame(FRAME).unwrap().rebuilt);
    assert_eq!(harness.runtime.live_contexts(), 1);
}

#[test]
fn test_failed_rebuild_exits_with_code_eight() {
    let mut harness = cube_app();
    harness.runtime.stop_service();
    harness
        .app
        .handle_window_event(WindowEvent::KeyDown(Key::Char('C')))
        .unwrap();

    let error = harness.app.frame(FRAME).unwrap_err();
    assert_eq!(error.exit_status(), ExitStatus::ContextRebuild);
    assert_eq!(error.exit_status().code(), 8);
}

#[test]
fn test_identical_halves_weave_to_that_image() {
    let dir = tempfile::TempDir::new().unwrap();
    let gray = [128, 96, 64, 255];
    let path = write_stereo_png(dir.path(), "same.png", (32, 24), gray, gray);
    let mut harness = launch(test_config(), SceneSource::StereoImage(path)).unwrap();
    assert_eq!(harness.app.renderer().eye_size(), UVec2::new(32, 24));

    harness.app.frame(FRAME).unwrap();
    let surfaces = harness.surfaces();
    let eye = harness.app.renderer().eye_size();
    let tiles_equal = surfaces
        .with_view(harness.view_id(), |view| {
            view.region_eq(Viewport::for_eye(0, eye), Viewport::for_eye(1, eye))
        })
        .unwrap();
    assert!(tiles_equal);

    let center = surfaces.with_backbuffer(|backbuffer| {
        let size = backbuffer.size();
        backbuffer.texel(size.x / 2, size.y / 2)
    });
    for (got, want) in center.iter().zip(gray) {
        assert!((*got as i32 - want as i32).abs() <= 1, "{:?} vs {:?}", center, gray);
    }
}

#[test]
fn test_resize_changes_backbuffer_only() {
    let mut harness = cube_app();
    let view_before = *harness.app.renderer().view();
    let presented = harness.surfaces().presented_frames();

    let control = harness
        .app
        .handle_window_event(WindowEvent::Resized(UVec2::new(200, 150)))
        .unwrap();
    assert_eq!(control, AppControl::Continue);
    assert_eq!(harness.app.backend().swapchain_size(), UVec2::new(200, 150));
    assert_eq!(harness.app.window().client_size(), UVec2::new(200, 150));
    assert_eq!(*harness.app.renderer().view(), view_before);
    let view_size = harness
        .surfaces()
        .with_view(view_before.id, |view| view.size())
        .unwrap();
    assert_eq!(view_size, view_before.desc.texture_size());
    // The resize renders a frame right away.
    assert_eq!(harness.surfaces().presented_frames(), presented + 1);

    harness
        .app
        .handle_window_event(WindowEvent::Resized(UVec2::new(10, 10)))
        .unwrap();
    assert_eq!(harness.app.backend().swapchain_size(), MIN_WINDOW_SIZE);
}

#[test]
fn test_oversized_resize_exits_with_code_nine() {
    let mut harness = cube_app();
    let error = harness
        .app
        .handle_window_event(WindowEvent::Resized(UVec2::new(40_000, 200)))
        .unwrap_err();
    assert_eq!(error.exit_status(), ExitStatus::BackbufferResize);
}

#[test]
fn test_minimized_frames_are_skipped() {
    let mut harness = cube_app();
    harness.app.handle_window_event(WindowEvent::Minimized).unwrap();
    let report = harness.app.frame(FRAME).unwrap();
    assert_eq!(report.outcome, FrameOutcome::Skipped);
    assert_eq!(harness.runtime.weave_count(), 0);

    harness
        .app
        .handle_window_event(WindowEvent::Resized(UVec2::new(0, 0)))
        .unwrap();
    assert_eq!(harness.app.backend().swapchain_size(), constants::WINDOW_SIZE);

    harness.app.handle_window_event(WindowEvent::Restored).unwrap();
    assert!(matches!(harness.app.frame(FRAME).unwrap().outcome, FrameOutcome::Rendered { .. }));
}

#[test]
fn test_tab_switches_eye_source() {
    let mut harness = cube_app();
    let pinned = EyePair::new(Vec3::new(-40.0, 5.0, 550.0), Vec3::new(25.0, 5.0, 550.0));
    harness.runtime.pin_eyes(Some(pinned));
    harness.runtime.emit_eye_pair(pinned);
    assert_eq!(harness.app.eyes().source(), EyeSource::Predicted);

    harness.app.handle_window_event(WindowEvent::KeyDown(Key::Tab)).unwrap();
    assert_eq!(harness.app.eyes().source(), EyeSource::Callback);

    let report = harness.app.frame(FRAME).unwrap();
    match report.outcome {
        FrameOutcome::Rendered { eyes, .. } => {
            assert_eq!(eyes.left, pinned.left);
            assert_eq!(eyes.right, pinned.right);
        }
        FrameOutcome::Skipped => panic!("frame skipped"),
    }
}

#[test]
fn test_legacy_weaver_switches_to_eye_stream() {
    let mut config = test_config();
    config.simulation.legacy_weaver = true;
    config.runtime.eye_listener = false;
    let mut harness = launch(config, still_cube()).unwrap();

    assert_eq!(harness.app.eyes().source(), EyeSource::Callback);
    assert!(harness.app.controller().has_eye_listener());
    harness.app.frame(FRAME).unwrap();
    assert_eq!(harness.runtime.weave_count(), 1);
}

#[test]
fn test_legacy_weave_gets_the_backbuffer_size() {
    let mut config = test_config();
    config.simulation.legacy_weaver = true;
    let mut harness = launch(config, still_cube()).unwrap();

    harness.app.frame(FRAME).unwrap();
    assert_eq!(harness.runtime.last_legacy_weave_size(), Some(constants::WINDOW_SIZE));

    let resized = UVec2::new(200, 150);
    harness
        .app
        .handle_window_event(WindowEvent::Resized(resized))
        .unwrap();
    harness.app.frame(FRAME).unwrap();
    assert_eq!(harness.app.backend().swapchain_size(), resized);
    assert_eq!(harness.runtime.last_legacy_weave_size(), Some(resized));
}

#[test]
fn test_rebuild_picks_up_new_display_size() {
    let mut harness = cube_app();
    harness.app.frame(FRAME).unwrap();
    let before = harness.runtime.settings().display;
    assert_eq!(
        harness.app.renderer().settings().screen,
        ScreenRect::from_physical_size(before.physical_size_cm * 10.0, 0.0)
    );

    harness.runtime.replace_display(SimulatedDisplaySpec {
        physical_size_cm: Vec2::new(60.0, 34.0),
        ..before
    });
    harness
        .app
        .handle_window_event(WindowEvent::KeyDown(Key::Char('c')))
        .unwrap();
    assert!(harness.app.frame(FRAME).unwrap().rebuilt);

    let screen = harness.app.renderer().settings().screen;
    assert_eq!(screen, ScreenRect::from_physical_size(Vec2::new(600.0, 340.0), 0.0));
    assert_eq!(screen.pb.x - screen.pa.x, 600.0);
    assert_eq!(harness.app.renderer().eye_size(), before.view_texture);
}

#[test]
fn test_escape_requests_exit_and_shutdown_is_idempotent() {
    let mut harness = cube_app();
    let control = harness
        .app
        .handle_window_event(WindowEvent::KeyDown(Key::Escape))
        .unwrap();
    assert_eq!(control, AppControl::Exit(ExitStatus::Success));

    harness.runtime.clear_journal();
    harness.app.shutdown();
    harness.app.shutdown();
    let kinds = call_kinds(&harness.runtime.journal());
    assert_eq!(kinds.first(), Some(&"WeaverDestroyed"));
    assert_eq!(kinds.last(), Some(&"ContextDeleted"));
    assert_eq!(kinds.iter().filter(|k| **k == "ContextDeleted").count(), 1);
    assert_eq!(harness.runtime.live_contexts(), 0);
}

#[test]
fn test_fullscreen_toggle_resizes_to_monitor_and_back() {
    let mut harness = cube_app();
    harness.app.handle_window_event(WindowEvent::KeyDown(Key::F11)).unwrap();
    assert!(harness.app.window().is_fullscreen());
    assert_eq!(harness.app.backend().swapchain_size(), UVec2::new(320, 180));

    harness.app.handle_window_event(WindowEvent::KeyDown(Key::F11)).unwrap();
    assert_eq!(harness.app.backend().swapchain_size(), constants::WINDOW_SIZE);
}
