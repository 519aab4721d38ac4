use anyhow::{anyhow, Context, Result};
use glam::{Mat4, Vec3, Vec4};
use std::sync::Arc;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

use crate::mesh::{Mesh, MeshVertex};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const DRAW_STRIDE: u64 = 256; // minimum dynamic uniform alignment
const CLEAR_COLOR: wgpu::Color = wgpu::Color { r: 0.045, g: 0.055, b: 0.085, a: 1.0 };

const LIGHT_DIR: Vec3 = Vec3::new(-0.4, -1.0, -0.35);
const LIGHT_COLOR: Vec4 = Vec4::new(0.95, 0.92, 0.85, 1.0);
const AMBIENT_COLOR: Vec4 = Vec4::new(0.22, 0.24, 0.28, 1.0);

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct FrameUniform {
    view_proj: [[f32; 4]; 4],
    camera_pos: [f32; 4],
    light_dir: [f32; 4],
    light_color: [f32; 4],
    ambient_color: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct DrawUniform {
    model: [[f32; 4]; 4],
    base_color: [f32; 4],
}

/// One object to draw this frame: a registry key plus its placement and
/// color. The scene produces these; the renderer resolves keys against
/// uploaded GPU meshes.
#[derive(Clone, Debug)]
pub struct MeshDraw {
    pub key: String,
    pub model: Mat4,
    pub color: Vec4,
}

/// Vertex/index buffers for one mesh. Destroyed explicitly so rebuilds
/// release device memory deterministically instead of waiting on drop
/// order.
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn destroy(&self) {
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
    }
}

/// Owns the window surface, device, and the single lit mesh pipeline.
/// Created empty, populated at mount, torn down once via `destroy`.
pub struct Renderer {
    surface: Option<wgpu::Surface<'static>>,
    device: Option<wgpu::Device>,
    queue: Option<wgpu::Queue>,
    config: Option<wgpu::SurfaceConfiguration>,
    size: PhysicalSize<u32>,
    vsync: bool,
    window: Option<Arc<Window>>,

    pipeline: Option<wgpu::RenderPipeline>,
    depth_view: Option<wgpu::TextureView>,
    frame_buffer: Option<wgpu::Buffer>,
    frame_bind_group: Option<wgpu::BindGroup>,
    draw_buffer: Option<wgpu::Buffer>,
    draw_bind_group: Option<wgpu::BindGroup>,
    draw_bgl: Option<wgpu::BindGroupLayout>,
    draw_capacity: usize,
}

impl Renderer {
    pub fn new(size: PhysicalSize<u32>, vsync: bool) -> Self {
        Self {
            surface: None,
            device: None,
            queue: None,
            config: None,
            size,
            vsync,
            window: None,
            pipeline: None,
            depth_view: None,
            frame_buffer: None,
            frame_bind_group: None,
            draw_buffer: None,
            draw_bind_group: None,
            draw_bgl: None,
            draw_capacity: 0,
        }
    }

    pub fn ensure_window(&mut self, event_loop: &ActiveEventLoop, title: &str) -> Result<()> {
        if self.window.is_some() {
            return Ok(());
        }
        let window = Arc::new(
            event_loop
                .create_window(Window::default_attributes().with_title(title).with_inner_size(self.size))
                .context("Failed to create window")?,
        );
        pollster::block_on(self.init_wgpu(&window))?;
        self.window = Some(window);
        Ok(())
    }

    fn choose_surface_format(formats: &[wgpu::TextureFormat]) -> wgpu::TextureFormat {
        formats.iter().copied().find(|f| f.is_srgb()).unwrap_or(formats[0])
    }

    async fn init_wgpu(&mut self, window: &Arc<Window>) -> Result<()> {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window.clone()).context("Failed to create surface")?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("No compatible GPU adapter")?;
        let required_limits = wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits());
        let device_desc = wgpu::DeviceDescriptor {
            label: Some("Device"),
            required_features: wgpu::Features::empty(),
            required_limits,
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        };
        let (device, queue) = adapter.request_device(&device_desc).await.context("Failed to get device")?;

        let caps = surface.get_capabilities(&adapter);
        let format = Self::choose_surface_format(&caps.formats);
        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if self.vsync { wgpu::PresentMode::Fifo } else { wgpu::PresentMode::AutoNoVsync },
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        self.size = size;
        self.depth_view = Some(Self::create_depth_view(&device, &config));
        self.surface = Some(surface);
        self.device = Some(device);
        self.queue = Some(queue);
        self.config = Some(config);
        Ok(())
    }

    fn create_depth_view(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size: wgpu::Extent3d {
                width: config.width.max(1),
                height: config.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    pub fn init_mesh_pipeline(&mut self) -> Result<()> {
        if self.pipeline.is_some() {
            return Ok(());
        }
        let device = self.device.as_ref().ok_or_else(|| anyhow!("Renderer device not initialized"))?;
        let config = self.config.as_ref().ok_or_else(|| anyhow!("Renderer surface not configured"))?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Task Mesh Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../assets/shaders/task_mesh.wgsl").into()),
        });

        let frame_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frame BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Buffer"),
            size: std::mem::size_of::<FrameUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame BG"),
            layout: &frame_bgl,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: frame_buffer.as_entire_binding() }],
        });

        let draw_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniform>() as u64),
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[&frame_bgl, &draw_bgl],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Mesh Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[MeshVertex::layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        self.pipeline = Some(pipeline);
        self.frame_buffer = Some(frame_buffer);
        self.frame_bind_group = Some(frame_bind_group);
        self.draw_bgl = Some(draw_bgl);
        Ok(())
    }

    pub fn create_gpu_mesh(&self, mesh: &Mesh) -> Result<GpuMesh> {
        let device = self.device.as_ref().ok_or_else(|| anyhow!("Renderer device not initialized"))?;
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh VB"),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh IB"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Ok(GpuMesh { vertex_buffer, index_buffer, index_count: mesh.indices.len() as u32 })
    }

    pub fn window(&self) -> Option<&Window> {
        self.window.as_deref()
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.size = new_size;
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        if let (Some(surface), Some(device), Some(config)) = (&self.surface, &self.device, &mut self.config)
        {
            config.width = new_size.width;
            config.height = new_size.height;
            surface.configure(device, config);
            self.depth_view = Some(Self::create_depth_view(device, config));
        }
    }

    fn ensure_draw_capacity(&mut self, count: usize) -> Result<()> {
        if self.draw_capacity >= count && self.draw_buffer.is_some() {
            return Ok(());
        }
        let device = self.device.as_ref().ok_or_else(|| anyhow!("Renderer device not initialized"))?;
        let draw_bgl = self.draw_bgl.as_ref().ok_or_else(|| anyhow!("Mesh pipeline not initialized"))?;
        let mut new_cap = self.draw_capacity.max(64);
        while new_cap < count {
            new_cap *= 2;
        }
        if let Some(old) = self.draw_buffer.take() {
            old.destroy();
        }
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw Buffer"),
            size: new_cap as u64 * DRAW_STRIDE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw BG"),
            layout: draw_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniform>() as u64),
                }),
            }],
        });
        self.draw_buffer = Some(buffer);
        self.draw_bind_group = Some(bind_group);
        self.draw_capacity = new_cap;
        Ok(())
    }

    /// Draws one frame. Keys without an uploaded GPU mesh are skipped;
    /// callers upload through the registry before rendering.
    pub fn render_meshes(
        &mut self,
        registry: &crate::mesh_registry::MeshRegistry,
        draws: &[MeshDraw],
        view_proj: Mat4,
        camera_pos: Vec3,
    ) -> Result<(), wgpu::SurfaceError> {
        if self.pipeline.is_none() {
            return Ok(());
        }
        if let Err(err) = self.ensure_draw_capacity(draws.len().max(1)) {
            eprintln!("[renderer] draw buffer allocation failed: {err:?}");
            return Ok(());
        }
        let (Some(surface), Some(device), Some(queue)) = (&self.surface, &self.device, &self.queue) else {
            return Ok(());
        };

        let frame_data = FrameUniform {
            view_proj: view_proj.to_cols_array_2d(),
            camera_pos: camera_pos.extend(1.0).to_array(),
            light_dir: LIGHT_DIR.normalize().extend(0.0).to_array(),
            light_color: LIGHT_COLOR.to_array(),
            ambient_color: AMBIENT_COLOR.to_array(),
        };
        if let Some(frame_buffer) = &self.frame_buffer {
            queue.write_buffer(frame_buffer, 0, bytemuck::bytes_of(&frame_data));
        }

        let mut staging = vec![0u8; draws.len() * DRAW_STRIDE as usize];
        for (index, draw) in draws.iter().enumerate() {
            let uniform =
                DrawUniform { model: draw.model.to_cols_array_2d(), base_color: draw.color.to_array() };
            let offset = index * DRAW_STRIDE as usize;
            staging[offset..offset + std::mem::size_of::<DrawUniform>()]
                .copy_from_slice(bytemuck::bytes_of(&uniform));
        }
        if let Some(draw_buffer) = &self.draw_buffer {
            if !staging.is_empty() {
                queue.write_buffer(draw_buffer, 0, &staging);
            }
        }

        let frame = surface.get_current_texture()?;
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Encoder") });

        {
            let depth_view = match &self.depth_view {
                Some(depth_view) => depth_view,
                None => return Ok(()),
            };
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Mesh Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            if let (Some(pipeline), Some(frame_bg), Some(draw_bg)) =
                (&self.pipeline, &self.frame_bind_group, &self.draw_bind_group)
            {
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, frame_bg, &[]);
                for (index, draw) in draws.iter().enumerate() {
                    let Some(gpu) = registry.gpu_mesh(&draw.key) else {
                        continue;
                    };
                    let offset = (index as u64 * DRAW_STRIDE) as u32;
                    pass.set_bind_group(1, draw_bg, &[offset]);
                    pass.set_vertex_buffer(0, gpu.vertex_buffer.slice(..));
                    pass.set_index_buffer(gpu.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..gpu.index_count, 0, 0..1);
                }
            }
        }

        queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }

    /// Ordered release of every GPU resource, then the window itself.
    /// Safe to call more than once; later calls find nothing to free.
    pub fn destroy(&mut self) {
        self.pipeline = None;
        self.draw_bind_group = None;
        self.frame_bind_group = None;
        self.draw_bgl = None;
        if let Some(buffer) = self.draw_buffer.take() {
            buffer.destroy();
        }
        if let Some(buffer) = self.frame_buffer.take() {
            buffer.destroy();
        }
        self.draw_capacity = 0;
        self.depth_view = None;
        self.config = None;
        self.surface = None;
        self.queue = None;
        self.device = None;
        self.window = None;
    }
}
