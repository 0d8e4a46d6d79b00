use bevy::math::{UVec2, Vec2, Vec3};
use std::sync::Arc;

use sr_weave::eyes::EyePair;
use sr_weave::render::pipeline::DEFAULT_VIEW_CLEAR;
use sr_weave::render::{
    ColorSpacePolicy, FrameOutcome, FrameTarget, GraphicsBackend, ImageData, RendererSettings,
    StereoRenderer, Viewport,
};
use sr_weave::runtime::simulated::SimulatedRuntime;
use sr_weave::scene::{Scene, SpinningCube, StereoImageScene};

use crate::test_utils::{constants, ready_controller, still_simulation, ReadyController};

const SCREEN_MM: Vec2 = Vec2::new(345.0, 194.0);

fn target() -> FrameTarget {
    FrameTarget {
        minimized: false,
        immediate: false,
    }
}

fn setup() -> (Arc<SimulatedRuntime>, ReadyController, StereoRenderer) {
    let runtime = Arc::new(SimulatedRuntime::new(still_simulation()));
    let ready = ready_controller(&runtime, true);
    let renderer = StereoRenderer::new(
        RendererSettings::new(ColorSpacePolicy::HardwareSrgb, SCREEN_MM),
        ready.view,
    );
    (runtime, ready, renderer)
}

fn render(
    ready: &mut ReadyController,
    renderer: &mut StereoRenderer,
    scene: &mut dyn Scene,
    target: FrameTarget,
) -> FrameOutcome {
    renderer
        .render_frame(&mut ready.backend, &mut ready.controller, &ready.eyes, scene, target)
        .expect("frame renders")
}

fn split_image(half: UVec2, left: [u8; 4], right: [u8; 4]) -> ImageData {
    let mut pixels = Vec::with_capacity((half.x * 2 * half.y * 4) as usize);
    for _ in 0..half.y {
        for x in 0..half.x * 2 {
            pixels.extend_from_slice(if x < half.x { &left } else { &right });
        }
    }
    ImageData {
        width: half.x * 2,
        height: half.y,
        pixels,
    }
}

#[test]
fn test_coincident_eyes_render_identical_tiles() {
    let (runtime, mut ready, mut renderer) = setup();
    let center = Vec3::new(0.0, 0.0, 600.0);
    runtime.pin_eyes(Some(EyePair::new(center, center)));

    let mut cube = SpinningCube::new(80.0, 0.0);
    cube.upload(ready.backend.as_uploader(), ColorSpacePolicy::HardwareSrgb)
        .unwrap();
    let outcome = render(&mut ready, &mut renderer, &mut cube, target());
    assert!(matches!(
        outcome,
        FrameOutcome::Rendered {
            scene_drawn: true,
            woven: true,
            ..
        }
    ));

    let eye = constants::EYE_SIZE;
    let surfaces = ready.backend.surfaces();
    let (tiles_equal, center_texel) = surfaces
        .with_view(ready.view.id, |view| {
            (
                view.region_eq(Viewport::for_eye(0, eye), Viewport::for_eye(1, eye)),
                view.read(eye.x / 2, eye.y / 2),
            )
        })
        .expect("view texture exists");
    assert!(tiles_equal);
    assert!(
        (center_texel[2] - DEFAULT_VIEW_CLEAR[2]).abs() > 0.05,
        "cube not drawn at tile center: {:?}",
        center_texel
    );
}

#[test]
fn test_image_halves_land_in_their_tiles() {
    let (runtime, mut ready, mut renderer) = setup();
    let eye = constants::EYE_SIZE;
    let mut scene =
        StereoImageScene::from_image(split_image(eye, [255, 0, 0, 255], [0, 0, 255, 255])).unwrap();
    assert_eq!(scene.preferred_eye_size(), Some(eye));
    scene
        .upload(ready.backend.as_uploader(), ColorSpacePolicy::HardwareSrgb)
        .unwrap();

    render(&mut ready, &mut renderer, &mut scene, target());
    assert_eq!(runtime.weave_count(), 1);

    let surfaces = ready.backend.surfaces();
    surfaces
        .with_view(ready.view.id, |view| {
            assert_eq!(view.size(), UVec2::new(eye.x * 2, eye.y));
            for (x, y) in [(0, 0), (eye.x - 1, eye.y - 1), (eye.x / 2, eye.y / 2)] {
                assert_eq!(view.texel(x, y), [255, 0, 0, 255]);
                assert_eq!(view.texel(eye.x + x, y), [0, 0, 255, 255]);
            }
        })
        .expect("view texture exists");

    // The simulated weaver shows the average of both views.
    let mixed = surfaces.with_backbuffer(|backbuffer| {
        let size = backbuffer.size();
        backbuffer.read(size.x / 2, size.y / 2)
    });
    assert!((mixed[0] - 0.5).abs() < 0.01, "{:?}", mixed);
    assert!(mixed[1].abs() < 0.01, "{:?}", mixed);
    assert!((mixed[2] - 0.5).abs() < 0.01, "{:?}", mixed);
}

#[test]
fn test_eye_behind_screen_skips_scene_but_still_presents() {
    let (runtime, mut ready, mut renderer) = setup();
    runtime.pin_eyes(Some(EyePair::new(
        Vec3::new(-30.0, 0.0, -100.0),
        Vec3::new(30.0, 0.0, -100.0),
    )));
    let mut cube = SpinningCube::new(80.0, 0.0);
    cube.upload(ready.backend.as_uploader(), ColorSpacePolicy::HardwareSrgb)
        .unwrap();

    let surfaces = ready.backend.surfaces();
    let presented = surfaces.presented_frames();
    let outcome = render(&mut ready, &mut renderer, &mut cube, target());

    assert!(matches!(
        outcome,
        FrameOutcome::Rendered {
            scene_drawn: false,
            woven: true,
            ..
        }
    ));
    assert_eq!(renderer.behind_screen_frames(), 1);
    assert_eq!(surfaces.presented_frames(), presented + 1);
    let eye = constants::EYE_SIZE;
    let texel = surfaces
        .with_view(ready.view.id, |view| view.read(eye.x / 2, eye.y / 2))
        .unwrap();
    assert!((texel[2] - DEFAULT_VIEW_CLEAR[2]).abs() < 0.01);
}

#[test]
fn test_minimized_window_skips_everything() {
    let (runtime, mut ready, mut renderer) = setup();
    let mut cube = SpinningCube::new(80.0, 0.0);
    cube.upload(ready.backend.as_uploader(), ColorSpacePolicy::HardwareSrgb)
        .unwrap();

    let outcome = render(
        &mut ready,
        &mut renderer,
        &mut cube,
        FrameTarget {
            minimized: true,
            ..target()
        },
    );
    assert_eq!(outcome, FrameOutcome::Skipped);
    assert_eq!(runtime.weave_count(), 0);
    assert_eq!(ready.backend.surfaces().presented_frames(), 0);
    assert_eq!(renderer.frames_rendered(), 0);
}

#[test]
fn test_pending_resize_applies_to_backbuffer_only() {
    let (_runtime, mut ready, mut renderer) = setup();
    let mut cube = SpinningCube::new(80.0, 0.0);
    cube.upload(ready.backend.as_uploader(), ColorSpacePolicy::HardwareSrgb)
        .unwrap();

    let resized = UVec2::new(200, 150);
    renderer.request_resize(resized);
    assert!(renderer.has_pending_resize());
    render(
        &mut ready,
        &mut renderer,
        &mut cube,
        FrameTarget {
            minimized: false,
            immediate: true,
        },
    );

    assert!(!renderer.has_pending_resize());
    assert_eq!(ready.backend.swapchain_size(), resized);
    assert_eq!(ready.backend.last_vsync(), Some(false));
    let view_size = ready
        .backend
        .surfaces()
        .with_view(ready.view.id, |view| view.size())
        .unwrap();
    assert_eq!(view_size, ready.view.desc.texture_size());
    assert_eq!(renderer.eye_size(), constants::EYE_SIZE);
}

#[test]
fn test_depth_is_cleared_each_frame() {
    let (_runtime, mut ready, mut renderer) = setup();
    let mut cube = SpinningCube::new(80.0, 0.0);
    cube.upload(ready.backend.as_uploader(), ColorSpacePolicy::HardwareSrgb)
        .unwrap();

    render(&mut ready, &mut renderer, &mut cube, target());
    let eye = constants::EYE_SIZE;
    let covered = ready.backend.view_depth(&ready.view, eye.x / 2, eye.y / 2).unwrap();
    let corner = ready.backend.view_depth(&ready.view, 0, 0).unwrap();
    assert!(covered < 1.0);
    assert_eq!(corner, 1.0);

    render(&mut ready, &mut renderer, &mut cube, target());
    let again = ready.backend.view_depth(&ready.view, eye.x / 2, eye.y / 2).unwrap();
    assert_eq!(again, covered);
    assert_eq!(renderer.frames_rendered(), 2);
    assert_eq!(ready.backend.last_vsync(), Some(true));
}
