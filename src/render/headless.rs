use std::collections::HashMap;

use crate::error::{RenderError, SurfaceError};
use crate::render::backend::{BackendStats, FrameDraw, GpuResource, RenderBackend, RenderSurface, ResourceKind};
use crate::render::scene::Material;

pub struct HeadlessSurface;

impl RenderSurface for HeadlessSurface {
    fn connect(self, width: u32, height: u32) -> Result<Box<dyn RenderBackend>, SurfaceError> {
        if width == 0 || height == 0 {
            return Err(SurfaceError::EmptySize { width, height });
        }
        Ok(Box::new(HeadlessBackend::new(width, height)))
    }
}

pub struct HeadlessBackend {
    width: u32,
    height: u32,
    next_id: u64,
    /// Live handles and their byte capacity (0 for programs).
    live: HashMap<u64, (ResourceKind, usize)>,
    frames: u64,
    last_draw_calls: usize,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            next_id: 1,
            live: HashMap::new(),
            frames: 0,
            last_draw_calls: 0,
        }
    }

    fn allocate(&mut self, kind: ResourceKind, capacity: usize) -> GpuResource {
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id, (kind, capacity));
        GpuResource { id, kind }
    }

    fn check(&self, resource: GpuResource, expected: ResourceKind) -> Result<usize, RenderError> {
        let &(actual, capacity) = self
            .live
            .get(&resource.id)
            .ok_or(RenderError::UnknownResource(resource.id))?;
        if actual != expected {
            return Err(RenderError::WrongResourceKind { id: resource.id, expected, actual });
        }
        Ok(capacity)
    }
}

impl RenderBackend for HeadlessBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
        }
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn create_buffer(&mut self, kind: ResourceKind, label: &str, bytes: &[u8]) -> Result<GpuResource, RenderError> {
        let resource = self.allocate(kind, bytes.len());
        log::trace!("headless: {label} -> {}", resource.id);
        Ok(resource)
    }

    fn write_buffer(&mut self, resource: GpuResource, bytes: &[u8]) -> Result<(), RenderError> {
        let &(_, capacity) = self
            .live
            .get(&resource.id)
            .ok_or(RenderError::UnknownResource(resource.id))?;
        if bytes.len() > capacity {
            return Err(RenderError::BufferOverflow { len: bytes.len(), capacity });
        }
        Ok(())
    }

    fn create_program(&mut self, material: &Material) -> Result<GpuResource, RenderError> {
        let resource = self.allocate(ResourceKind::Program, 0);
        log::trace!("headless: program {} -> {}", material.label, resource.id);
        Ok(resource)
    }

    fn release(&mut self, resource: GpuResource) {
        self.live.remove(&resource.id);
    }

    fn draw(&mut self, frame: &FrameDraw<'_>) -> Result<(), RenderError> {
        for call in frame.draws {
            self.check(call.vertices, ResourceKind::VertexBuffer)?;
            self.check(call.indices, ResourceKind::IndexBuffer)?;
            self.check(call.program, ResourceKind::Program)?;
            self.check(call.uniforms, ResourceKind::Uniform)?;
        }
        self.frames += 1;
        self.last_draw_calls = frame.draws.len();
        Ok(())
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            live_resources: self.live.len(),
            frames: self.frames,
            last_draw_calls: self.last_draw_calls,
        }
    }

    fn dispose(&mut self) {
        if !self.live.is_empty() {
            log::debug!("headless: dropping {} leftover resources", self.live.len());
        }
        self.live.clear();
    }
}
