//! CPU graphics backend
//!
//! A small rasterizer behind [`GraphicsBackend`]: RGBA8 surfaces with real
//! sRGB encode/decode, a depth buffer per view texture, depth-tested
//! triangles and nearest-neighbour texture copies. Surfaces live in a shared
//! [`SurfaceStore`] so an in-process weaver can read the view texture and
//! write the backbuffer the way a vendor weaver does on the GPU.

use bevy::math::{Mat4, Rect, UVec2, Vec2, Vec3, Vec4};
use bevy::prelude::{debug, info, trace};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::backend::{
    DrawContext, GraphicsBackend, GraphicsError, ImageData, MeshHandle, ResourceUploader,
    TextureHandle, Vertex, ViewTextureDesc, ViewTextureHandle, Viewport,
};
use super::color::{from_unorm8, linear_to_srgb, srgb_to_linear, to_unorm8, Rgba, TextureFormat};

/// Largest surface edge the backend accepts
pub const MAX_SURFACE_EXTENT: u32 = 16_384;

/// RGBA8 image with format-aware reads and writes
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    size: UVec2,
    format: TextureFormat,
    texels: Vec<[u8; 4]>,
}

impl Surface {
    pub fn new(size: UVec2, format: TextureFormat) -> Self {
        Self {
            size,
            format,
            texels: vec![[0, 0, 0, 0]; (size.x * size.y) as usize],
        }
    }

    fn from_texels(size: UVec2, format: TextureFormat, texels: Vec<[u8; 4]>) -> Self {
        Self {
            size,
            format,
            texels,
        }
    }

    #[inline]
    pub fn size(&self) -> UVec2 {
        self.size
    }

    #[inline]
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Stored bytes, no conversion
    #[inline]
    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        self.texels[(y * self.size.x + x) as usize]
    }

    /// Value as a sampler returns it: sRGB formats are decoded to linear
    pub fn read(&self, x: u32, y: u32) -> Rgba {
        let [r, g, b, a] = self.texel(x, y);
        let decode = |v: u8| {
            let v = from_unorm8(v);
            if self.format.is_srgb() {
                srgb_to_linear(v)
            } else {
                v
            }
        };
        [decode(r), decode(g), decode(b), from_unorm8(a)]
    }

    /// Store a color as a render target write does: sRGB formats are encoded
    pub fn write(&mut self, x: u32, y: u32, color: Rgba) {
        let texel = self.encode(color);
        let index = (y * self.size.x + x) as usize;
        self.texels[index] = texel;
    }

    pub fn fill(&mut self, color: Rgba) {
        let texel = self.encode(color);
        self.texels.fill(texel);
    }

    fn encode(&self, color: Rgba) -> [u8; 4] {
        let encode = |v: f32| {
            if self.format.is_srgb() {
                to_unorm8(linear_to_srgb(v))
            } else {
                to_unorm8(v)
            }
        };
        [encode(color[0]), encode(color[1]), encode(color[2]), to_unorm8(color[3])]
    }

    /// Whether two rectangular regions hold identical bytes
    pub fn region_eq(&self, a: Viewport, b: Viewport) -> bool {
        if a.width != b.width || a.height != b.height {
            return false;
        }
        (0..a.height).all(|y| {
            (0..a.width).all(|x| self.texel(a.x + x, a.y + y) == self.texel(b.x + x, b.y + y))
        })
    }
}

#[derive(Debug, Clone)]
struct DepthBuffer {
    size: UVec2,
    values: Vec<f32>,
}

impl DepthBuffer {
    fn new(size: UVec2) -> Self {
        Self {
            size,
            values: vec![1.0; (size.x * size.y) as usize],
        }
    }
}

/// Currently bound render target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    Backbuffer,
    View(u64),
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    target: RenderTarget,
    viewport: Viewport,
}

/// Surfaces shared between the backend and in-process compositors
#[derive(Debug)]
pub struct SurfaceStore {
    backbuffer: RwLock<Surface>,
    views: RwLock<HashMap<u64, Surface>>,
    binding: Mutex<Binding>,
    presented: AtomicU64,
}

pub type SharedSurfaces = Arc<SurfaceStore>;

impl SurfaceStore {
    fn new(backbuffer: Surface) -> Self {
        let viewport = Viewport::covering(backbuffer.size());
        Self {
            backbuffer: RwLock::new(backbuffer),
            views: RwLock::new(HashMap::new()),
            binding: Mutex::new(Binding {
                target: RenderTarget::Backbuffer,
                viewport,
            }),
            presented: AtomicU64::new(0),
        }
    }

    pub fn with_backbuffer<R>(&self, f: impl FnOnce(&Surface) -> R) -> R {
        f(&self.backbuffer.read())
    }

    pub fn with_backbuffer_mut<R>(&self, f: impl FnOnce(&mut Surface) -> R) -> R {
        f(&mut self.backbuffer.write())
    }

    pub fn with_view<R>(&self, id: u64, f: impl FnOnce(&Surface) -> R) -> Option<R> {
        self.views.read().get(&id).map(f)
    }

    /// Target and viewport set by the last bind and viewport calls
    pub fn bound(&self) -> (RenderTarget, Viewport) {
        let binding = *self.binding.lock();
        (binding.target, binding.viewport)
    }

    pub fn presented_frames(&self) -> u64 {
        self.presented.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
struct Mesh {
    vertices: Vec<Vertex>,
    indices: Vec<u16>,
}

/// Software implementation of the graphics contract
pub struct SoftwareBackend {
    surfaces: SharedSurfaces,
    depth: HashMap<u64, DepthBuffer>,
    meshes: HashMap<u64, Mesh>,
    textures: HashMap<u64, Surface>,
    next_id: u64,
    max_extent: u32,
    last_vsync: Option<bool>,
    gpu_waits: u64,
}

impl SoftwareBackend {
    /// Create the device and a swapchain of `size`
    pub fn new(size: UVec2, backbuffer_format: TextureFormat) -> Result<Self, GraphicsError> {
        check_extent(size, MAX_SURFACE_EXTENT)?;
        info!(
            "🎨 Software graphics backend: {}x{} {:?} backbuffer",
            size.x, size.y, backbuffer_format
        );
        Ok(Self {
            surfaces: Arc::new(SurfaceStore::new(Surface::new(size, backbuffer_format))),
            depth: HashMap::new(),
            meshes: HashMap::new(),
            textures: HashMap::new(),
            next_id: 1,
            max_extent: MAX_SURFACE_EXTENT,
            last_vsync: None,
            gpu_waits: 0,
        })
    }

    /// Lower the largest accepted surface edge
    pub fn with_max_extent(mut self, max_extent: u32) -> Self {
        self.max_extent = max_extent;
        self
    }

    pub fn surfaces(&self) -> SharedSurfaces {
        Arc::clone(&self.surfaces)
    }

    /// Vsync flag of the most recent present
    pub fn last_vsync(&self) -> Option<bool> {
        self.last_vsync
    }

    pub fn gpu_waits(&self) -> u64 {
        self.gpu_waits
    }

    /// Depth value at a pixel of a view texture
    pub fn view_depth(&self, view: &ViewTextureHandle, x: u32, y: u32) -> Option<f32> {
        self.depth
            .get(&view.id)
            .map(|depth| depth.values[(y * depth.size.x + x) as usize])
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Run `f` on the bound target and its depth buffer
    fn with_bound_target(&mut self, f: impl FnOnce(&mut Surface, Option<&mut DepthBuffer>, Viewport)) {
        let (target, viewport) = self.surfaces.bound();
        match target {
            RenderTarget::Backbuffer => {
                let mut surface = self.surfaces.backbuffer.write();
                f(&mut surface, None, viewport);
            }
            RenderTarget::View(id) => {
                let mut views = self.surfaces.views.write();
                if let Some(surface) = views.get_mut(&id) {
                    f(surface, self.depth.get_mut(&id), viewport);
                }
            }
        }
    }
}

fn check_extent(size: UVec2, max_extent: u32) -> Result<(), GraphicsError> {
    if size.x == 0 || size.y == 0 || size.x > max_extent || size.y > max_extent {
        return Err(GraphicsError::InvalidSize {
            width: size.x,
            height: size.y,
        });
    }
    Ok(())
}

impl ResourceUploader for SoftwareBackend {
    fn upload_mesh(&mut self, vertices: &[Vertex], indices: &[u16]) -> Result<MeshHandle, GraphicsError> {
        if indices.len() % 3 != 0 {
            return Err(GraphicsError::Upload(format!(
                "{} indices do not form triangles",
                indices.len()
            )));
        }
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(GraphicsError::Upload(format!(
                "index {} out of range for {} vertices",
                bad,
                vertices.len()
            )));
        }
        let id = self.allocate_id();
        self.meshes.insert(
            id,
            Mesh {
                vertices: vertices.to_vec(),
                indices: indices.to_vec(),
            },
        );
        debug!("Mesh {} uploaded: {} vertices, {} indices", id, vertices.len(), indices.len());
        Ok(MeshHandle(id))
    }

    fn upload_texture(&mut self, image: &ImageData, format: TextureFormat) -> Result<TextureHandle, GraphicsError> {
        if !image.is_well_formed() {
            return Err(GraphicsError::Upload(format!(
                "{}x{} image with {} bytes",
                image.width,
                image.height,
                image.pixels.len()
            )));
        }
        let size = UVec2::new(image.width, image.height);
        check_extent(size, self.max_extent)?;
        let texels: &[[u8; 4]] = bytemuck::cast_slice(&image.pixels);
        let id = self.allocate_id();
        self.textures
            .insert(id, Surface::from_texels(size, format, texels.to_vec()));
        debug!("Texture {} uploaded: {}x{} {:?}", id, size.x, size.y, format);
        Ok(TextureHandle(id))
    }
}

#[derive(Clone, Copy)]
struct ScreenVertex {
    position: Vec2,
    depth: f32,
    color: Vec3,
}

fn to_screen(clip: Vec4, color: Vec3, viewport: Viewport) -> Option<ScreenVertex> {
    if clip.w <= f32::EPSILON {
        return None;
    }
    let ndc = clip.truncate() / clip.w;
    Some(ScreenVertex {
        position: Vec2::new(
            (ndc.x * 0.5 + 0.5) * viewport.width as f32,
            (0.5 - ndc.y * 0.5) * viewport.height as f32,
        ),
        depth: ndc.z * 0.5 + 0.5,
        color,
    })
}

#[inline]
fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn rasterize(
    target: &mut Surface,
    mut depth: Option<&mut DepthBuffer>,
    viewport: Viewport,
    [v0, v1, v2]: [ScreenVertex; 3],
) {
    let area = edge(v0.position, v1.position, v2.position);
    if area.abs() <= f32::EPSILON {
        return;
    }

    // Positions are viewport-local; a tile renders the same wherever it sits.
    let size = target.size();
    let clip_max_x = viewport.width.min(size.x.saturating_sub(viewport.x));
    let clip_max_y = viewport.height.min(size.y.saturating_sub(viewport.y));

    let min = v0.position.min(v1.position).min(v2.position).floor();
    let max = v0.position.max(v1.position).max(v2.position).ceil();
    let x0 = min.x.max(0.0) as u32;
    let y0 = min.y.max(0.0) as u32;
    let x1 = (max.x.min(clip_max_x as f32)).max(0.0) as u32;
    let y1 = (max.y.min(clip_max_y as f32)).max(0.0) as u32;

    for y in y0..y1 {
        for x in x0..x1 {
            let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let w0 = edge(v1.position, v2.position, p) / area;
            let w1 = edge(v2.position, v0.position, p) / area;
            let w2 = edge(v0.position, v1.position, p) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }

            let z = w0 * v0.depth + w1 * v1.depth + w2 * v2.depth;
            if !(0.0..=1.0).contains(&z) {
                continue;
            }
            let (tx, ty) = (viewport.x + x, viewport.y + y);
            if let Some(depth) = depth.as_deref_mut() {
                let slot = &mut depth.values[(ty * depth.size.x + tx) as usize];
                if z >= *slot {
                    continue;
                }
                *slot = z;
            }

            let color = v0.color * w0 + v1.color * w1 + v2.color * w2;
            target.write(tx, ty, [color.x, color.y, color.z, 1.0]);
        }
    }
}

impl DrawContext for SoftwareBackend {
    fn draw_mesh(&mut self, mesh: MeshHandle, mvp: &Mat4) {
        let Some(mesh) = self.meshes.get(&mesh.0).cloned() else {
            debug!("draw_mesh: unknown mesh {}", mesh.0);
            return;
        };
        let mvp = *mvp;
        self.with_bound_target(|target, mut depth, viewport| {
            for triangle in mesh.indices.chunks_exact(3) {
                let mut screen = [None; 3];
                for (slot, &index) in screen.iter_mut().zip(triangle) {
                    let vertex = mesh.vertices[index as usize];
                    let clip = mvp * Vec3::from(vertex.position).extend(1.0);
                    *slot = to_screen(clip, Vec3::from(vertex.color), viewport);
                }
                if let [Some(a), Some(b), Some(c)] = screen {
                    rasterize(target, depth.as_deref_mut(), viewport, [a, b, c]);
                }
            }
        });
    }

    fn draw_texture(&mut self, texture: TextureHandle, uv: Rect) {
        let Some(source) = self.textures.get(&texture.0).cloned() else {
            debug!("draw_texture: unknown texture {}", texture.0);
            return;
        };
        self.with_bound_target(|target, _depth, viewport| {
            let size = target.size();
            let source_size = source.size().as_vec2();
            let width = viewport.width.min(size.x.saturating_sub(viewport.x));
            let height = viewport.height.min(size.y.saturating_sub(viewport.y));
            for y in 0..height {
                let v = uv.min.y + (y as f32 + 0.5) / viewport.height as f32 * uv.height();
                let ty = ((v * source_size.y) as u32).min(source.size().y - 1);
                for x in 0..width {
                    let u = uv.min.x + (x as f32 + 0.5) / viewport.width as f32 * uv.width();
                    let tx = ((u * source_size.x) as u32).min(source.size().x - 1);
                    target.write(viewport.x + x, viewport.y + y, source.read(tx, ty));
                }
            }
        });
    }
}

impl GraphicsBackend for SoftwareBackend {
    fn create_view_texture(&mut self, desc: ViewTextureDesc) -> Result<ViewTextureHandle, GraphicsError> {
        let size = desc.texture_size();
        check_extent(size, self.max_extent)?;
        let id = self.allocate_id();
        self.surfaces
            .views
            .write()
            .insert(id, Surface::new(size, desc.format));
        self.depth.insert(id, DepthBuffer::new(size));
        info!("🎨 View texture {}: {}x{} {:?}", id, size.x, size.y, desc.format);
        Ok(ViewTextureHandle { id, desc })
    }

    fn swapchain_size(&self) -> UVec2 {
        self.surfaces.backbuffer.read().size()
    }

    fn resize_swapchain(&mut self, size: UVec2) -> Result<(), GraphicsError> {
        check_extent(size, self.max_extent).map_err(|e| GraphicsError::ResizeFailed {
            width: size.x,
            height: size.y,
            reason: e.to_string(),
        })?;
        let mut backbuffer = self.surfaces.backbuffer.write();
        let format = backbuffer.format();
        *backbuffer = Surface::new(size, format);
        debug!("Swapchain resized to {}x{}", size.x, size.y);
        Ok(())
    }

    fn clear_backbuffer(&mut self, color: Rgba) {
        self.surfaces.backbuffer.write().fill(color);
    }

    fn clear_view_texture(&mut self, view: &ViewTextureHandle, color: Rgba) {
        if let Some(surface) = self.surfaces.views.write().get_mut(&view.id) {
            surface.fill(color);
        }
    }

    fn clear_view_depth(&mut self, view: &ViewTextureHandle, depth: f32) {
        if let Some(buffer) = self.depth.get_mut(&view.id) {
            buffer.values.fill(depth);
        }
    }

    fn bind_view_targets(&mut self, view: &ViewTextureHandle) {
        self.surfaces.binding.lock().target = RenderTarget::View(view.id);
    }

    fn bind_backbuffer(&mut self) {
        self.surfaces.binding.lock().target = RenderTarget::Backbuffer;
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.surfaces.binding.lock().viewport = viewport;
    }

    fn present(&mut self, vsync: bool) -> Result<(), GraphicsError> {
        self.last_vsync = Some(vsync);
        let frame = self.surfaces.presented.fetch_add(1, Ordering::AcqRel) + 1;
        trace!("Present #{} (vsync {})", frame, vsync);
        Ok(())
    }

    fn wait_for_gpu(&mut self) {
        self.gpu_waits += 1;
    }

    fn as_draw_context(&mut self) -> &mut dyn DrawContext {
        self
    }

    fn as_uploader(&mut self) -> &mut dyn ResourceUploader {
        self
    }
}
