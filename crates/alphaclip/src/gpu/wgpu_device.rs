use std::collections::HashMap;

use wgpu::util::DeviceExt;
use wgpu::{
    BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, BindingType, BufferBindingType, ColorTargetState,
    CompareFunction, DepthStencilState, ErrorFilter, FragmentState, MultisampleState,
    PipelineCompilationOptions, PipelineLayoutDescriptor, PrimitiveState, RenderPipeline,
    SamplerBindingType, ShaderModule, ShaderStages, TextureSampleType, TextureViewDimension,
    VertexAttribute, VertexBufferLayout, VertexFormat, VertexState, VertexStepMode,
};

use super::context::GpuContext;
use super::render_target::{DEPTH_FORMAT, OutputTarget, SURFACE_FORMAT};
use super::uniforms::{QuadUniforms, UniformBuffer};
use super::{
    BufferHandle, BufferUsage, DeviceStats, DrawCall, HandleAllocator, ProgramHandle,
    RenderDevice, ShaderHandle, TextureHandle, check_texture_size,
};
use crate::error::ShaderStage;
use crate::media::DecodedFrame;
use crate::shader::program::{FRAGMENT_ENTRY, LOCATIONS, VERTEX_ENTRY};

const POSITION_ATTRIBUTES: [VertexAttribute; 1] = [VertexAttribute {
    format: VertexFormat::Float32x2,
    offset: 0,
    shader_location: LOCATIONS.position,
}];

const TEX_COORD_ATTRIBUTES: [VertexAttribute; 1] = [VertexAttribute {
    format: VertexFormat::Float32x2,
    offset: 0,
    shader_location: LOCATIONS.tex_coord,
}];

struct CompiledShader {
    stage: ShaderStage,
    module: ShaderModule,
}

struct LinkedProgram {
    pipeline: RenderPipeline,
    bind_group_layout: BindGroupLayout,
}

struct FrameTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

fn create_frame_texture(device: &wgpu::Device, width: u32, height: u32) -> FrameTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("packed-frame"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    FrameTexture {
        texture,
        view,
        width,
        height,
    }
}

/// [`RenderDevice`] on a headless wgpu device.
pub struct WgpuDevice {
    gpu: GpuContext,
    handles: HandleAllocator,
    shaders: HashMap<ShaderHandle, CompiledShader>,
    programs: HashMap<ProgramHandle, LinkedProgram>,
    buffers: HashMap<BufferHandle, wgpu::Buffer>,
    textures: HashMap<TextureHandle, FrameTexture>,
    sampler: wgpu::Sampler,
    uniforms: UniformBuffer,
    target: Option<OutputTarget>,
    stats: DeviceStats,
}

impl WgpuDevice {
    pub fn new(gpu: GpuContext) -> Self {
        // Nearest sampling keeps color and mask texels from bleeding into each other.
        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("packed-frame-sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });
        let uniforms = UniformBuffer::new(&gpu.device);
        Self {
            gpu,
            handles: HandleAllocator::default(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            sampler,
            uniforms,
            target: None,
            stats: DeviceStats::default(),
        }
    }

    /// Run `f` inside a validation error scope and report the first error.
    fn validated<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T, String> {
        self.gpu.device.push_error_scope(ErrorFilter::Validation);
        let value = f(&self.gpu.device);
        match pollster::block_on(self.gpu.device.pop_error_scope()) {
            Some(err) => Err(err.to_string()),
            None => Ok(value),
        }
    }

    fn live_objects(&self) -> u32 {
        (self.shaders.len() + self.programs.len() + self.buffers.len() + self.textures.len())
            as u32
    }

    fn max_texture_dimension(&self) -> u32 {
        self.gpu.device.limits().max_texture_dimension_2d
    }

    fn create_bind_group_layout(device: &wgpu::Device) -> BindGroupLayout {
        // texture(image), sampler(sampler), uniform(resolution)
        device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("packed-alpha-bgl"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: LOCATIONS.image,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: true },
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: LOCATIONS.sampler,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(SamplerBindingType::Filtering),
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: LOCATIONS.resolution,
                    visibility: ShaderStages::VERTEX,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: std::num::NonZeroU64::new(
                            std::mem::size_of::<QuadUniforms>() as u64,
                        ),
                    },
                    count: None,
                },
            ],
        })
    }
}

impl RenderDevice for WgpuDevice {
    fn label(&self) -> &str {
        "wgpu"
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderHandle, String> {
        let label = format!("packed-alpha-{stage}");
        let module = self.validated(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        })?;
        let handle = self.handles.shader();
        self.shaders.insert(handle, CompiledShader { stage, module });
        self.stats.shaders_compiled += 1;
        Ok(handle)
    }

    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<ProgramHandle, String> {
        let vs = self.shaders.get(&vertex).ok_or("unknown vertex shader")?;
        let fs = self.shaders.get(&fragment).ok_or("unknown fragment shader")?;
        if vs.stage != ShaderStage::Vertex || fs.stage != ShaderStage::Fragment {
            return Err("shader stages do not pair up as vertex + fragment".to_string());
        }

        let (pipeline, bind_group_layout) = self.validated(|device| {
            let bind_group_layout = Self::create_bind_group_layout(device);
            let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some("packed-alpha-layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("packed-alpha-pipeline"),
                layout: Some(&pipeline_layout),
                vertex: VertexState {
                    module: &vs.module,
                    entry_point: Some(VERTEX_ENTRY),
                    buffers: &[
                        VertexBufferLayout {
                            array_stride: 8,
                            step_mode: VertexStepMode::Vertex,
                            attributes: &POSITION_ATTRIBUTES,
                        },
                        VertexBufferLayout {
                            array_stride: 8,
                            step_mode: VertexStepMode::Vertex,
                            attributes: &TEX_COORD_ATTRIBUTES,
                        },
                    ],
                    compilation_options: PipelineCompilationOptions::default(),
                },
                fragment: Some(FragmentState {
                    module: &fs.module,
                    entry_point: Some(FRAGMENT_ENTRY),
                    targets: &[Some(ColorTargetState {
                        format: SURFACE_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: PipelineCompilationOptions::default(),
                }),
                primitive: PrimitiveState::default(),
                depth_stencil: Some(DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: CompareFunction::LessEqual,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: MultisampleState::default(),
                multiview: None,
                cache: None,
            });
            (pipeline, bind_group_layout)
        })?;

        let handle = self.handles.program();
        self.programs.insert(
            handle,
            LinkedProgram {
                pipeline,
                bind_group_layout,
            },
        );
        self.stats.programs_linked += 1;
        log::info!("Packed-alpha pipeline created");
        Ok(handle)
    }

    fn create_buffer(&mut self, label: &str, contents: &[f32], usage: BufferUsage) -> BufferHandle {
        let mut usages = wgpu::BufferUsages::VERTEX;
        if usage == BufferUsage::Dynamic {
            usages |= wgpu::BufferUsages::COPY_DST;
        }
        let buffer = self
            .gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(contents),
                usage: usages,
            });
        let handle = self.handles.buffer();
        self.buffers.insert(handle, buffer);
        self.stats.buffers_created += 1;
        handle
    }

    fn write_buffer(&mut self, buffer: BufferHandle, contents: &[f32]) -> Result<(), String> {
        let target = self.buffers.get(&buffer).ok_or("unknown buffer")?;
        let bytes: &[u8] = bytemuck::cast_slice(contents);
        if bytes.len() as u64 != target.size() {
            return Err(format!(
                "buffer holds {} bytes, write of {} bytes",
                target.size(),
                bytes.len()
            ));
        }
        self.gpu.queue.write_buffer(target, 0, bytes);
        self.stats.buffer_writes += 1;
        Ok(())
    }

    fn create_texture(&mut self, _label: &str) -> TextureHandle {
        let texture = create_frame_texture(&self.gpu.device, 1, 1);
        let handle = self.handles.texture();
        self.textures.insert(handle, texture);
        self.stats.textures_created += 1;
        handle
    }

    fn upload_frame(&mut self, texture: TextureHandle, frame: &DecodedFrame) -> Result<(), String> {
        if !frame.is_well_formed() {
            return Err(format!(
                "frame {}x{} carries {} bytes",
                frame.width,
                frame.height,
                frame.data.len()
            ));
        }
        check_texture_size(frame.width, frame.height, self.max_texture_dimension())?;
        let needs_realloc = match self.textures.get(&texture) {
            Some(t) => t.width != frame.width || t.height != frame.height,
            None => return Err("unknown texture".to_string()),
        };
        if needs_realloc {
            let fresh = self.validated(|device| {
                create_frame_texture(device, frame.width, frame.height)
            })?;
            if let Some(old) = self.textures.insert(texture, fresh) {
                old.texture.destroy();
            }
        }
        let Some(target) = self.textures.get(&texture) else {
            return Err("unknown texture".to_string());
        };
        self.validated(|_| {
            self.gpu.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &target.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &frame.data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(frame.width * 4),
                    rows_per_image: Some(frame.height),
                },
                wgpu::Extent3d {
                    width: frame.width,
                    height: frame.height,
                    depth_or_array_layers: 1,
                },
            );
        })?;
        self.stats.frame_uploads += 1;
        Ok(())
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        if let Err(e) = check_texture_size(width.max(1), height.max(1), self.max_texture_dimension())
        {
            log::error!("Output surface not resized: {e}");
            if let Some(target) = self.target.take() {
                target.destroy();
            }
            return;
        }
        match self.target.as_mut() {
            Some(target) => target.resize(&self.gpu.device, width, height),
            None => self.target = Some(OutputTarget::new(&self.gpu.device, width, height)),
        }
    }

    fn surface_size(&self) -> Option<(u32, u32)> {
        self.target.as_ref().map(|t| (t.width, t.height))
    }

    fn draw(&mut self, call: &DrawCall) -> Result<(), String> {
        let target = self.target.as_ref().ok_or("output surface not sized")?;
        let program = self.programs.get(&call.program).ok_or("unknown program")?;
        let position = self.buffers.get(&call.position_buffer).ok_or("unknown position buffer")?;
        let tex_coord = self
            .buffers
            .get(&call.tex_coord_buffer)
            .ok_or("unknown texcoord buffer")?;
        let texture = self.textures.get(&call.texture).ok_or("unknown texture")?;

        self.uniforms
            .update(&self.gpu.queue, &QuadUniforms::new(call.resolution));

        let bind_group = self.gpu.device.create_bind_group(&BindGroupDescriptor {
            label: Some("packed-alpha-bg"),
            layout: &program.bind_group_layout,
            entries: &[
                BindGroupEntry {
                    binding: LOCATIONS.image,
                    resource: BindingResource::TextureView(&texture.view),
                },
                BindGroupEntry {
                    binding: LOCATIONS.sampler,
                    resource: BindingResource::Sampler(&self.sampler),
                },
                BindGroupEntry {
                    binding: LOCATIONS.resolution,
                    resource: self.uniforms.buffer.as_entire_binding(),
                },
            ],
        });

        let [r, g, b, a] = call.clear_color;
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("composite"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("composite"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_viewport(0.0, 0.0, target.width as f32, target.height as f32, 0.0, 1.0);
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, position.slice(..));
            pass.set_vertex_buffer(1, tex_coord.slice(..));
            pass.draw(0..call.vertex_count, 0..1);
        }
        self.gpu.queue.submit(Some(encoder.finish()));
        self.stats.draws += 1;
        Ok(())
    }

    fn read_surface(&mut self) -> Result<image::RgbaImage, String> {
        let target = self.target.as_ref().ok_or("output surface not sized")?;
        target.read_back(&self.gpu.device, &self.gpu.queue)
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) -> bool {
        match self.buffers.remove(&buffer) {
            Some(b) => {
                b.destroy();
                true
            }
            None => false,
        }
    }

    fn delete_texture(&mut self, texture: TextureHandle) -> bool {
        match self.textures.remove(&texture) {
            Some(t) => {
                t.texture.destroy();
                true
            }
            None => false,
        }
    }

    fn delete_program(&mut self, program: ProgramHandle) -> bool {
        self.programs.remove(&program).is_some()
    }

    fn delete_shader(&mut self, shader: ShaderHandle) -> bool {
        self.shaders.remove(&shader).is_some()
    }

    fn stats(&self) -> DeviceStats {
        DeviceStats {
            live_objects: self.live_objects(),
            ..self.stats
        }
    }
}

impl Drop for WgpuDevice {
    fn drop(&mut self) {
        if let Some(target) = self.target.take() {
            target.destroy();
        }
    }
}
