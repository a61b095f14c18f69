use glam::{Mat4, Vec3};

use crate::error::{RenderError, SurfaceError};
use crate::render::scene::Material;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    VertexBuffer,
    IndexBuffer,
    Uniform,
    Program,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GpuResource {
    pub id: u64,
    pub kind: ResourceKind,
}

/// Per-node uniforms: 80 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct NodeUniforms {
    pub model: [[f32; 4]; 4],
    /// Material color multiplied into vertex colors. `w` unused.
    pub tint: [f32; 4],
}

impl NodeUniforms {
    pub fn new(model: Mat4, tint: [f32; 3]) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            tint: [tint[0], tint[1], tint[2], 1.0],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lighting {
    pub ambient: [f32; 3],
    pub directional: [f32; 3],
    /// Direction towards the light.
    pub direction: Vec3,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            ambient: [0.0; 3],
            directional: [0.0; 3],
            direction: Vec3::X,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawCall {
    pub vertices: GpuResource,
    pub indices: GpuResource,
    pub index_count: u32,
    pub program: GpuResource,
    pub uniforms: GpuResource,
}

pub struct FrameDraw<'a> {
    pub view_proj: Mat4,
    pub lighting: Lighting,
    pub draws: &'a [DrawCall],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub live_resources: usize,
    pub frames: u64,
    pub last_draw_calls: usize,
}

pub trait RenderBackend {
    fn resize(&mut self, width: u32, height: u32);

    fn size(&self) -> (u32, u32);

    fn create_buffer(&mut self, kind: ResourceKind, label: &str, bytes: &[u8]) -> Result<GpuResource, RenderError>;

    /// Overwrite a buffer from the start. `bytes` must fit the allocation.
    fn write_buffer(&mut self, resource: GpuResource, bytes: &[u8]) -> Result<(), RenderError>;

    fn create_program(&mut self, material: &Material) -> Result<GpuResource, RenderError>;

    /// Free one handle. Unknown handles are ignored.
    fn release(&mut self, resource: GpuResource);

    fn draw(&mut self, frame: &FrameDraw<'_>) -> Result<(), RenderError>;

    fn stats(&self) -> BackendStats;

    /// Drop every resource still held, including backend-internal ones.
    fn dispose(&mut self);
}

/// A drawable surface that can be bound to a backend.
pub trait RenderSurface {
    fn connect(self, width: u32, height: u32) -> Result<Box<dyn RenderBackend>, SurfaceError>;
}
