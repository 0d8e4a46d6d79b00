use bevy::math::{Mat4, Vec3};
use bevy::prelude::info;
use std::time::Duration;

use super::{Scene, SceneError};
use crate::eyes::Eye;
use crate::render::{ColorSpacePolicy, DrawContext, MeshHandle, ResourceUploader, Vertex};

pub const DEFAULT_CUBE_SIZE_MM: f32 = 60.0;
pub const DEFAULT_SPIN_RAD_PER_SEC: f32 = 0.75;

const CORNERS: [[f32; 3]; 8] = {
    let (l, r, b, t, n, f) = (-0.5, 0.5, -0.5, 0.5, -0.5, 0.5);
    [
        [l, n, b],
        [l, f, b],
        [r, f, b],
        [r, n, b],
        [l, n, t],
        [l, f, t],
        [r, f, t],
        [r, n, t],
    ]
};

const FACES: [[usize; 4]; 6] = [
    [0, 1, 2, 3],
    [1, 0, 4, 5],
    [0, 3, 7, 4],
    [3, 2, 6, 7],
    [2, 1, 5, 6],
    [4, 7, 6, 5],
];

/// Unit cube as 24 vertices (4 per face, one flat color each) and 36 indices
pub fn cube_geometry(policy: ColorSpacePolicy) -> (Vec<Vertex>, Vec<u16>) {
    let c = policy.encode_scalar(0.6);
    let g = policy.encode_scalar(0.05);
    let colors = [
        [c, g, g],
        [g, c, g],
        [g, g, c],
        [c, c, g],
        [g, c, c],
        [c, g, c],
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (face, color) in FACES.iter().zip(colors) {
        let start = vertices.len() as u16;
        vertices.extend(face.iter().map(|&corner| Vertex {
            position: CORNERS[corner],
            color,
        }));
        indices.extend([0, 2, 1, 0, 3, 2].map(|offset| start + offset));
    }
    (vertices, indices)
}

/// Flat-shaded cube spinning about +Y at the display center
#[derive(Debug)]
pub struct SpinningCube {
    size_mm: f32,
    spin_rad_per_sec: f32,
    elapsed: Duration,
    mesh: Option<MeshHandle>,
}

impl SpinningCube {
    pub fn new(size_mm: f32, spin_rad_per_sec: f32) -> Self {
        Self {
            size_mm,
            spin_rad_per_sec,
            elapsed: Duration::ZERO,
            mesh: None,
        }
    }

    pub fn angle(&self) -> f32 {
        self.elapsed.as_secs_f32() * self.spin_rad_per_sec
    }
}

impl Default for SpinningCube {
    fn default() -> Self {
        Self::new(DEFAULT_CUBE_SIZE_MM, DEFAULT_SPIN_RAD_PER_SEC)
    }
}

impl Scene for SpinningCube {
    fn name(&self) -> &'static str {
        "cube"
    }

    fn upload(
        &mut self,
        uploader: &mut dyn ResourceUploader,
        policy: ColorSpacePolicy,
    ) -> Result<(), SceneError> {
        let (vertices, indices) = cube_geometry(policy);
        self.mesh = Some(uploader.upload_mesh(&vertices, &indices)?);
        info!("🧊 Cube uploaded ({} mm, {} rad/s)", self.size_mm, self.spin_rad_per_sec);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.mesh.is_some()
    }

    fn advance(&mut self, dt: Duration) {
        self.elapsed += dt;
    }

    fn model(&self) -> Mat4 {
        // Rotate, then scale, then translate.
        Mat4::from_translation(Vec3::ZERO)
            * Mat4::from_scale(Vec3::splat(self.size_mm))
            * Mat4::from_rotation_y(self.angle())
    }

    fn draw(&self, ctx: &mut dyn DrawContext, _eye: Eye, mvp: &Mat4) {
        if let Some(mesh) = self.mesh {
            ctx.draw_mesh(mesh, mvp);
        }
    }
}
