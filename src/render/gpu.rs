use std::collections::HashMap;
use std::sync::Arc;

use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::error::{RenderError, SurfaceError};
use crate::render::backend::{BackendStats, DrawCall, FrameDraw, GpuResource, RenderBackend, RenderSurface, ResourceKind};
use crate::render::pipeline::{create_depth_view, create_lit_pipeline, uniform_bind_group, Globals, Layouts};
use crate::render::scene::Material;

pub struct GpuState {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuState {
    pub fn new(window: Arc<Window>, width: u32, height: u32) -> Result<Self, SurfaceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| SurfaceError::CreateSurface(e.to_string()))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|_| SurfaceError::NoAdapter)?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("torusgo device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            },
        ))
        .map_err(|e| SurfaceError::RequestDevice(e.to_string()))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let Some(&fallback_format) = surface_caps.formats.first() else {
            return Err(SurfaceError::CreateSurface("surface reports no formats".into()));
        };
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(fallback_format);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        log::info!("surface configured: {surface_format:?} {}x{}", config.width, config.height);

        Ok(Self {
            surface,
            device,
            queue,
            config,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            let max = self.device.limits().max_texture_dimension_2d;
            self.config.width = width.min(max);
            self.config.height = height.min(max);
            self.surface.configure(&self.device, &self.config);
        }
    }

    pub fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.config);
    }
}

/// A `winit` window as a drawable surface.
pub struct WindowSurface {
    pub window: Arc<Window>,
}

impl RenderSurface for WindowSurface {
    fn connect(self, width: u32, height: u32) -> Result<Box<dyn RenderBackend>, SurfaceError> {
        if width == 0 || height == 0 {
            return Err(SurfaceError::EmptySize { width, height });
        }
        let gpu = GpuState::new(self.window, width, height)?;
        Ok(Box::new(WgpuBackend::new(gpu)))
    }
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    kind: ResourceKind,
    capacity: usize,
    /// Present for uniform buffers only.
    bind_group: Option<wgpu::BindGroup>,
}

struct ResolvedDraw<'a> {
    vertices: &'a wgpu::Buffer,
    indices: &'a wgpu::Buffer,
    index_count: u32,
    pipeline: &'a wgpu::RenderPipeline,
    node: &'a wgpu::BindGroup,
}

/// Renders the scene through `wgpu`. Every buffer and pipeline lives in a
/// handle map so the scene graph can free them deterministically.
pub struct WgpuBackend {
    gpu: GpuState,
    layouts: Layouts,
    depth_view: wgpu::TextureView,
    globals_buffer: wgpu::Buffer,
    globals_bind_group: wgpu::BindGroup,
    buffers: HashMap<u64, GpuBuffer>,
    programs: HashMap<u64, wgpu::RenderPipeline>,
    next_id: u64,
    frames: u64,
    last_draw_calls: usize,
}

impl WgpuBackend {
    pub fn new(gpu: GpuState) -> Self {
        let layouts = Layouts::new(&gpu.device);
        let depth_view = create_depth_view(&gpu.device, gpu.config.width, gpu.config.height);
        let globals_buffer = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("globals"),
            contents: bytemuck::bytes_of(&Globals::default()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let globals_bind_group = uniform_bind_group(&gpu.device, "globals bind group", &layouts.globals, &globals_buffer);

        Self {
            gpu,
            layouts,
            depth_view,
            globals_buffer,
            globals_bind_group,
            buffers: HashMap::new(),
            programs: HashMap::new(),
            next_id: 1,
            frames: 0,
            last_draw_calls: 0,
        }
    }

    fn next_handle(&mut self, kind: ResourceKind) -> GpuResource {
        let id = self.next_id;
        self.next_id += 1;
        GpuResource { id, kind }
    }

    fn buffer(&self, resource: GpuResource, expected: ResourceKind) -> Result<&GpuBuffer, RenderError> {
        let buffer = self
            .buffers
            .get(&resource.id)
            .ok_or(RenderError::UnknownResource(resource.id))?;
        if buffer.kind != expected {
            return Err(RenderError::WrongResourceKind {
                id: resource.id,
                expected,
                actual: buffer.kind,
            });
        }
        Ok(buffer)
    }

    fn resolve(&self, call: &DrawCall) -> Result<ResolvedDraw<'_>, RenderError> {
        let node = self
            .buffer(call.uniforms, ResourceKind::Uniform)?
            .bind_group
            .as_ref()
            .ok_or(RenderError::UnknownResource(call.uniforms.id))?;
        Ok(ResolvedDraw {
            vertices: &self.buffer(call.vertices, ResourceKind::VertexBuffer)?.buffer,
            indices: &self.buffer(call.indices, ResourceKind::IndexBuffer)?.buffer,
            index_count: call.index_count,
            pipeline: self
                .programs
                .get(&call.program.id)
                .ok_or(RenderError::UnknownResource(call.program.id))?,
            node,
        })
    }
}

impl RenderBackend for WgpuBackend {
    fn resize(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
        self.depth_view = create_depth_view(&self.gpu.device, self.gpu.config.width, self.gpu.config.height);
    }

    fn size(&self) -> (u32, u32) {
        (self.gpu.config.width, self.gpu.config.height)
    }

    fn create_buffer(&mut self, kind: ResourceKind, label: &str, bytes: &[u8]) -> Result<GpuResource, RenderError> {
        let usage = match kind {
            ResourceKind::VertexBuffer => wgpu::BufferUsages::VERTEX,
            ResourceKind::IndexBuffer => wgpu::BufferUsages::INDEX,
            ResourceKind::Uniform => wgpu::BufferUsages::UNIFORM,
            ResourceKind::Program => {
                return Err(RenderError::WrongResourceKind {
                    id: 0,
                    expected: ResourceKind::Uniform,
                    actual: kind,
                })
            }
        };
        let buffer = self.gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytes,
            usage: usage | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = (kind == ResourceKind::Uniform)
            .then(|| uniform_bind_group(&self.gpu.device, label, &self.layouts.node, &buffer));

        let resource = self.next_handle(kind);
        self.buffers.insert(
            resource.id,
            GpuBuffer {
                buffer,
                kind,
                capacity: bytes.len(),
                bind_group,
            },
        );
        Ok(resource)
    }

    fn write_buffer(&mut self, resource: GpuResource, bytes: &[u8]) -> Result<(), RenderError> {
        let buffer = self
            .buffers
            .get(&resource.id)
            .ok_or(RenderError::UnknownResource(resource.id))?;
        if bytes.len() > buffer.capacity {
            return Err(RenderError::BufferOverflow {
                len: bytes.len(),
                capacity: buffer.capacity,
            });
        }
        self.gpu.queue.write_buffer(&buffer.buffer, 0, bytes);
        Ok(())
    }

    fn create_program(&mut self, material: &Material) -> Result<GpuResource, RenderError> {
        let pipeline = create_lit_pipeline(&self.gpu.device, self.gpu.config.format, &self.layouts, &material.label);
        let resource = self.next_handle(ResourceKind::Program);
        self.programs.insert(resource.id, pipeline);
        log::debug!("compiled program {} for material {:?}", resource.id, material.label);
        Ok(resource)
    }

    fn release(&mut self, resource: GpuResource) {
        match resource.kind {
            ResourceKind::Program => {
                self.programs.remove(&resource.id);
            }
            _ => {
                if let Some(buffer) = self.buffers.remove(&resource.id) {
                    buffer.buffer.destroy();
                }
            }
        }
    }

    fn draw(&mut self, frame: &FrameDraw<'_>) -> Result<(), RenderError> {
        let output = match self.gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(e @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                self.gpu.reconfigure();
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let globals = Globals::new(&frame.view_proj, &frame.lighting);
        self.gpu
            .queue
            .write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&globals));

        let resolved = frame
            .draws
            .iter()
            .map(|call| self.resolve(call))
            .collect::<Result<Vec<_>, _>>()?;

        let mut encoder = self.gpu.device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor {
                label: Some("render encoder"),
            },
        );

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("main pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.02,
                            g: 0.02,
                            b: 0.05,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_bind_group(0, &self.globals_bind_group, &[]);
            for draw in &resolved {
                pass.set_pipeline(draw.pipeline);
                pass.set_bind_group(1, draw.node, &[]);
                pass.set_vertex_buffer(0, draw.vertices.slice(..));
                pass.set_index_buffer(draw.indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..draw.index_count, 0, 0..1);
            }
        }

        let draw_calls = resolved.len();
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        self.frames += 1;
        self.last_draw_calls = draw_calls;
        Ok(())
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            live_resources: self.buffers.len() + self.programs.len(),
            frames: self.frames,
            last_draw_calls: self.last_draw_calls,
        }
    }

    fn dispose(&mut self) {
        let leftover = self.buffers.len() + self.programs.len();
        if leftover > 0 {
            log::warn!("disposing backend with {leftover} resources still held");
        }
        for (_, buffer) in self.buffers.drain() {
            buffer.buffer.destroy();
        }
        self.programs.clear();
        self.globals_buffer.destroy();
    }
}
