//! [`Device`] implementation on top of wgpu.
//!
//! The trait is immediate-mode: depth testing is a switch, passes begin and
//! end, draws name a program and a bag of uniforms. wgpu wants all of that
//! baked into pipelines and bind groups, so this module keeps the
//! translation state:
//!
//! - Pipelines are built lazily per (program, color format, depth format,
//!   depth test) and cached.
//! - Every draw packs its uniforms into a per-frame arena buffer at an
//!   aligned offset and gets its own bind group pointing at that range.
//! - Texture slots a draw leaves empty are bound to 1×1 fallbacks so the
//!   bind group always matches the program's layout.
//!
//! The open render pass holds no borrow of the frame encoder
//! ([`wgpu::RenderPass::forget_lifetime`]); it is dropped before the encoder
//! is finished.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, TryRecvError};

use slotmap::SlotMap;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::device::{
    Blend, ColorTarget, DepthTarget, Device, Draw, Geometry, MeshId, PassBegin, ProgramDesc,
    ProgramError, ProgramId, TextureId, TextureSlot, TextureSlotKind, VertexArrayId, VertexInput,
};
use crate::gpu::{GpuContext, GpuError};
use crate::mesh::Vertex3d;
use crate::screenshot::{self, ScreenshotError};
use crate::texture::{TextureDesc, TextureDimension};
use crate::uniforms::UniformLayout;

/// Capacity of the per-frame uniform arena.
const UNIFORM_ARENA_SIZE: usize = 1 << 20;
/// Smallest block bound for a draw, even when the program declares no uniforms.
const MIN_UNIFORM_BLOCK: usize = 16;
const BACKBUFFER_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const FULL_SCREEN_BUFFERS: &[wgpu::VertexBufferLayout<'static>] = &[wgpu::VertexBufferLayout {
    array_stride: 8,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &[wgpu::VertexAttribute {
        offset: 0,
        shader_location: 0,
        format: wgpu::VertexFormat::Float32x2,
    }],
}];
const MESH_BUFFERS: &[wgpu::VertexBufferLayout<'static>] = &[Vertex3d::LAYOUT];

struct TextureEntry {
    desc: TextureDesc,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

struct ProgramEntry {
    label: String,
    module: wgpu::ShaderModule,
    layout: UniformLayout,
    slots: Vec<TextureSlot>,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    vertex_input: VertexInput,
    blend: Blend,
    cull_back_faces: bool,
}

struct MeshEntry {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

struct VertexArrayEntry {
    buffer: wgpu::Buffer,
    count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    color: wgpu::TextureFormat,
    depth: Option<wgpu::TextureFormat>,
    depth_test: bool,
}

/// Textures bound to slots a draw leaves empty.
struct Fallbacks {
    color_2d: TextureEntry,
    color_3d: TextureEntry,
    depth_2d: TextureEntry,
}

impl Fallbacks {
    fn new(device: &wgpu::Device) -> Self {
        Self {
            color_2d: TextureEntry::new(device, TextureDesc::color_2d("fallback color", 1, 1)),
            color_3d: TextureEntry::new(device, TextureDesc::volume("fallback volume", 1, 1, 1)),
            depth_2d: TextureEntry::new(device, TextureDesc::depth_2d("fallback depth", 1, 1)),
        }
    }

    fn get(&self, kind: TextureSlotKind) -> &TextureEntry {
        match kind {
            TextureSlotKind::Color2d => &self.color_2d,
            TextureSlotKind::Color3d => &self.color_3d,
            TextureSlotKind::Depth2d => &self.depth_2d,
        }
    }
}

struct FrameState {
    surface_texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
}

struct OpenPass {
    pass: wgpu::RenderPass<'static>,
    color_format: wgpu::TextureFormat,
    depth_format: Option<wgpu::TextureFormat>,
}

struct Readback {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_row: u32,
    bgra: bool,
    dir: PathBuf,
}

/// The wgpu-backed render device driving the window.
pub struct WgpuDevice {
    gpu: GpuContext,
    textures: SlotMap<TextureId, TextureEntry>,
    programs: SlotMap<ProgramId, ProgramEntry>,
    meshes: SlotMap<MeshId, MeshEntry>,
    vertex_arrays: SlotMap<VertexArrayId, VertexArrayEntry>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    fallbacks: Fallbacks,
    depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,
    uniform_buffer: wgpu::Buffer,
    uniform_staging: Vec<u8>,
    uniform_alignment: usize,
    depth_test: bool,
    frame: Option<FrameState>,
    pass: Option<OpenPass>,
    screenshot_dir: Option<PathBuf>,
}

impl WgpuDevice {
    pub fn new(window: Arc<Window>) -> Result<Self, GpuError> {
        let gpu = GpuContext::new(window)?;
        let device = &gpu.device;

        let (depth_texture, depth_view) = create_backbuffer_depth(device, gpu.width(), gpu.height());
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform arena"),
            size: UNIFORM_ARENA_SIZE as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as usize;
        let fallbacks = Fallbacks::new(device);

        Ok(Self {
            textures: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            meshes: SlotMap::with_key(),
            vertex_arrays: SlotMap::with_key(),
            pipelines: HashMap::new(),
            fallbacks,
            depth_texture,
            depth_view,
            uniform_buffer,
            uniform_staging: Vec::with_capacity(UNIFORM_ARENA_SIZE),
            uniform_alignment: uniform_alignment.max(MIN_UNIFORM_BLOCK),
            depth_test: false,
            frame: None,
            pass: None,
            screenshot_dir: None,
            gpu,
        })
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// Backbuffer size in pixels.
    pub fn size(&self) -> (u32, u32) {
        (self.gpu.width(), self.gpu.height())
    }

    /// Resizes the surface and its depth buffer. Zero sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.gpu.resize(width, height) {
            let (texture, view) = create_backbuffer_depth(&self.gpu.device, width, height);
            self.depth_texture.destroy();
            self.depth_texture = texture;
            self.depth_view = view;
            log::debug!("backbuffer resized to {width}x{height}");
        }
    }

    /// Captures the backbuffer at the end of the current frame into `dir`.
    pub fn request_screenshot(&mut self, dir: &Path) {
        self.screenshot_dir = Some(dir.to_path_buf());
    }

    /// Acquires the next surface texture. Returns false when the frame
    /// should be skipped.
    pub fn begin_frame(&mut self) -> bool {
        self.pass = None;
        let surface_texture = match self.gpu.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("surface lost, reconfiguring");
                self.gpu.reconfigure();
                return false;
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("timed out waiting for the surface");
                return false;
            }
            Err(e) => {
                log::error!("failed to acquire surface texture: {e}");
                return false;
            }
        };
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });
        self.uniform_staging.clear();
        self.frame = Some(FrameState {
            surface_texture,
            view,
            encoder,
        });
        true
    }

    /// Submits and presents the frame. Returns the screenshot path when one
    /// was requested and written.
    pub fn end_frame(&mut self) -> Result<Option<PathBuf>, ScreenshotError> {
        self.end_pass();
        let Some(frame) = self.frame.take() else {
            return Ok(None);
        };
        let FrameState {
            surface_texture,
            view: _,
            mut encoder,
        } = frame;

        if !self.uniform_staging.is_empty() {
            self.gpu
                .queue
                .write_buffer(&self.uniform_buffer, 0, &self.uniform_staging);
        }

        let readback = match self.screenshot_dir.take() {
            Some(dir) => Some(self.encode_readback(&mut encoder, &surface_texture.texture, dir)),
            None => None,
        };

        self.gpu.queue.submit(Some(encoder.finish()));

        let saved = match readback {
            Some(Ok(readback)) => Some(self.finish_readback(readback)),
            Some(Err(e)) => Some(Err(e)),
            None => None,
        };
        surface_texture.present();
        saved.transpose()
    }

    fn encode_readback(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
        dir: PathBuf,
    ) -> Result<Readback, ScreenshotError> {
        if !self.gpu.supports_readback() {
            return Err(ScreenshotError::Unsupported);
        }
        let bgra = match self.gpu.config.format {
            wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => true,
            wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => false,
            other => {
                log::warn!("cannot capture surface format {other:?}");
                return Err(ScreenshotError::Unsupported);
            }
        };

        let (width, height) = self.size();
        let padded_row = screenshot::padded_bytes_per_row(width);
        let buffer = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("screenshot readback"),
            size: u64::from(padded_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(Readback {
            buffer,
            width,
            height,
            padded_row,
            bgra,
            dir,
        })
    }

    fn finish_readback(&self, readback: Readback) -> Result<PathBuf, ScreenshotError> {
        let slice = readback.buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        let mapped = loop {
            let _ = self.gpu.device.poll(wgpu::PollType::Poll);
            match rx.try_recv() {
                Ok(result) => break result,
                Err(TryRecvError::Empty) => std::thread::yield_now(),
                Err(TryRecvError::Disconnected) => {
                    return Err(ScreenshotError::Map("map callback dropped".into()));
                }
            }
        };
        mapped.map_err(|e| ScreenshotError::Map(e.to_string()))?;

        let mut pixels = {
            let data = slice.get_mapped_range();
            screenshot::unpad_rows(&data, readback.width, readback.height, readback.padded_row)
        };
        readback.buffer.unmap();
        if readback.bgra {
            screenshot::bgra_to_rgba(&mut pixels);
        }
        screenshot::save_png(&readback.dir, readback.width, readback.height, pixels)
    }

    fn pipeline_for(&mut self, program: ProgramId, key: PipelineKey) -> Option<&wgpu::RenderPipeline> {
        let entry = self.programs.get(program)?;
        let device = &self.gpu.device;
        Some(
            self.pipelines
                .entry(key)
                .or_insert_with(|| create_pipeline(device, entry, &key)),
        )
    }
}

impl TextureEntry {
    fn new(device: &wgpu::Device, desc: TextureDesc) -> Self {
        let (texture, view) = allocate_texture(device, &desc);
        let wrap = desc.wrap.to_wgpu();
        let filter = desc.filter.to_wgpu();
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&desc.label),
            address_mode_u: wrap,
            address_mode_v: wrap,
            address_mode_w: wrap,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self {
            desc,
            texture,
            view,
            sampler,
        }
    }

    fn fits(&self, kind: TextureSlotKind) -> bool {
        match kind {
            TextureSlotKind::Color2d => {
                self.desc.dimension == TextureDimension::D2 && !self.desc.format.is_depth()
            }
            TextureSlotKind::Color3d => self.desc.dimension == TextureDimension::D3,
            TextureSlotKind::Depth2d => {
                self.desc.dimension == TextureDimension::D2 && self.desc.format.is_depth()
            }
        }
    }
}

fn allocate_texture(device: &wgpu::Device, desc: &TextureDesc) -> (wgpu::Texture, wgpu::TextureView) {
    let (width, height, depth) = desc.extent();
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&desc.label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: depth.max(1),
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: match desc.dimension {
            TextureDimension::D2 => wgpu::TextureDimension::D2,
            TextureDimension::D3 => wgpu::TextureDimension::D3,
        },
        format: desc.format.to_wgpu(),
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn create_backbuffer_depth(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("backbuffer depth"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: BACKBUFFER_DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn layout_entries(layout: &UniformLayout, slots: &[TextureSlot]) -> Vec<wgpu::BindGroupLayoutEntry> {
    let visibility = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
    let mut entries = vec![wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(layout.size() as u64),
        },
        count: None,
    }];

    for (i, slot) in slots.iter().enumerate() {
        let binding = 1 + 2 * i as u32;
        let (sample_type, view_dimension) = match slot.kind {
            TextureSlotKind::Color2d => (
                wgpu::TextureSampleType::Float { filterable: true },
                wgpu::TextureViewDimension::D2,
            ),
            TextureSlotKind::Color3d => (
                wgpu::TextureSampleType::Float { filterable: true },
                wgpu::TextureViewDimension::D3,
            ),
            TextureSlotKind::Depth2d => {
                (wgpu::TextureSampleType::Depth, wgpu::TextureViewDimension::D2)
            }
        };
        entries.push(wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type,
                view_dimension,
                multisampled: false,
            },
            count: None,
        });
        if slot.kind != TextureSlotKind::Depth2d {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: binding + 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }
    }
    entries
}

fn create_pipeline(device: &wgpu::Device, program: &ProgramEntry, key: &PipelineKey) -> wgpu::RenderPipeline {
    log::debug!(
        "building pipeline `{}` for {:?} / {:?} (depth test {})",
        program.label,
        key.color,
        key.depth,
        key.depth_test
    );
    let buffers = match program.vertex_input {
        VertexInput::FullScreen => FULL_SCREEN_BUFFERS,
        VertexInput::Mesh => MESH_BUFFERS,
    };
    let blend = match program.blend {
        Blend::Replace => wgpu::BlendState::REPLACE,
        Blend::Alpha => wgpu::BlendState::ALPHA_BLENDING,
    };
    // Without depth testing the attachment is left untouched.
    let depth_stencil = key.depth.map(|format| wgpu::DepthStencilState {
        format,
        depth_write_enabled: key.depth_test,
        depth_compare: if key.depth_test {
            wgpu::CompareFunction::Less
        } else {
            wgpu::CompareFunction::Always
        },
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&program.label),
        layout: Some(&program.pipeline_layout),
        vertex: wgpu::VertexState {
            module: &program.module,
            entry_point: Some("vs"),
            buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &program.module,
            entry_point: Some("fs"),
            targets: &[Some(wgpu::ColorTargetState {
                format: key.color,
                blend: Some(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: program.cull_back_faces.then_some(wgpu::Face::Back),
            ..Default::default()
        },
        depth_stencil,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn load_op<T>(clear: Option<T>) -> wgpu::LoadOp<T> {
    match clear {
        Some(value) => wgpu::LoadOp::Clear(value),
        None => wgpu::LoadOp::Load,
    }
}

fn align_to(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

impl Device for WgpuDevice {
    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId {
        log::debug!(
            "allocating texture `{}` {}x{}x{} {:?}",
            desc.label,
            desc.width,
            desc.height,
            desc.depth,
            desc.format
        );
        let entry = TextureEntry::new(&self.gpu.device, desc.clone());
        self.textures.insert(entry)
    }

    fn reallocate_texture(&mut self, texture: TextureId, width: u32, height: u32) {
        let Some(entry) = self.textures.get_mut(texture) else {
            log::warn!("reallocating unknown texture {texture:?}");
            return;
        };
        entry.desc = entry.desc.resized(width, height);
        let (new_texture, view) = allocate_texture(&self.gpu.device, &entry.desc);
        entry.texture.destroy();
        entry.texture = new_texture;
        entry.view = view;
        log::debug!("reallocated texture `{}` at {width}x{height}", entry.desc.label);
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(entry) = self.textures.remove(texture) {
            entry.texture.destroy();
        }
    }

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId, ProgramError> {
        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.source.into()),
        });
        let layout = UniformLayout::new(desc.uniforms);
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(desc.label),
            entries: &layout_entries(&layout, desc.textures),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let entry = ProgramEntry {
            label: desc.label.to_string(),
            module,
            layout,
            slots: desc.textures.to_vec(),
            bind_group_layout,
            pipeline_layout,
            vertex_input: desc.vertex_input,
            blend: desc.blend,
            cull_back_faces: desc.cull_back_faces,
        };

        // Shader/layout mismatches only surface when a pipeline is built.
        let probe_key = |program| PipelineKey {
            program,
            color: wgpu::TextureFormat::Rgba16Float,
            depth: Some(wgpu::TextureFormat::Depth32Float),
            depth_test: true,
        };
        let probe = create_pipeline(device, &entry, &probe_key(ProgramId::default()));

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            log::error!("program `{}` rejected", desc.label);
            return Err(ProgramError::Invalid {
                label: desc.label.to_string(),
                message: error.to_string(),
            });
        }

        let id = self.programs.insert(entry);
        self.pipelines.insert(probe_key(id), probe);
        log::debug!("created program `{}`", desc.label);
        Ok(id)
    }

    fn create_mesh(&mut self, label: &str, vertices: &[Vertex3d], indices: &[u32]) -> MeshId {
        let device = &self.gpu.device;
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        self.meshes.insert(MeshEntry {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        })
    }

    fn create_vertex_array(&mut self, label: &str, positions: &[[f32; 2]]) -> VertexArrayId {
        let buffer = self
            .gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(positions),
                usage: wgpu::BufferUsages::VERTEX,
            });
        self.vertex_arrays.insert(VertexArrayEntry {
            buffer,
            count: positions.len() as u32,
        })
    }

    fn depth_test(&self) -> bool {
        self.depth_test
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
    }

    fn begin_pass(&mut self, pass: &PassBegin<'_>) {
        self.end_pass();
        let Some(frame) = self.frame.as_mut() else {
            log::trace!("pass `{}` begun outside a frame, ignored", pass.label);
            return;
        };

        let (color_view, depth_slice, color_format, color_extent) = match pass.color {
            ColorTarget::Backbuffer => (
                &frame.view,
                None,
                self.gpu.config.format,
                (self.gpu.config.width, self.gpu.config.height),
            ),
            ColorTarget::Texture(id) | ColorTarget::Slice { texture: id, .. } => {
                let Some(entry) = self.textures.get(id) else {
                    log::warn!("pass `{}` targets an unknown texture", pass.label);
                    return;
                };
                let slice = match pass.color {
                    ColorTarget::Slice { slice, .. } => Some(slice),
                    _ => None,
                };
                (
                    &entry.view,
                    slice,
                    entry.desc.format.to_wgpu(),
                    (entry.desc.width, entry.desc.height),
                )
            }
        };

        let depth = match pass.depth {
            DepthTarget::None => None,
            DepthTarget::Backbuffer => Some((&self.depth_view, BACKBUFFER_DEPTH_FORMAT)),
            DepthTarget::Texture(id) => match self.textures.get(id) {
                Some(entry) if entry.desc.format.is_depth() => {
                    Some((&entry.view, entry.desc.format.to_wgpu()))
                }
                _ => {
                    log::warn!("pass `{}` has an unusable depth target", pass.label);
                    None
                }
            },
        };

        let color_attachment = wgpu::RenderPassColorAttachment {
            view: color_view,
            depth_slice,
            resolve_target: None,
            ops: wgpu::Operations {
                load: load_op(pass.clear.color.map(|[r, g, b, a]| wgpu::Color {
                    r: f64::from(r),
                    g: f64::from(g),
                    b: f64::from(b),
                    a: f64::from(a),
                })),
                store: wgpu::StoreOp::Store,
            },
        };
        let depth_attachment = depth.map(|(view, _)| wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: Some(wgpu::Operations {
                load: load_op(pass.clear.depth),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        });

        let mut render_pass = frame
            .encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(pass.label),
                color_attachments: &[Some(color_attachment)],
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            })
            .forget_lifetime();

        let width = pass.viewport.0.min(color_extent.0).max(1);
        let height = pass.viewport.1.min(color_extent.1).max(1);
        render_pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);

        self.pass = Some(OpenPass {
            pass: render_pass,
            color_format,
            depth_format: depth.map(|(_, format)| format),
        });
    }

    fn draw(&mut self, draw: &Draw<'_>) {
        let Some(open) = self.pass.as_ref() else {
            log::trace!("draw outside a pass dropped");
            return;
        };
        let key = PipelineKey {
            program: draw.program,
            color: open.color_format,
            depth: open.depth_format,
            depth_test: self.depth_test,
        };

        let Some(program) = self.programs.get(draw.program) else {
            log::warn!("draw with unknown program {:?}", draw.program);
            return;
        };
        let expected_input = match draw.geometry {
            Geometry::Arrays { .. } => VertexInput::FullScreen,
            Geometry::Mesh(_) => VertexInput::Mesh,
        };
        if program.vertex_input != expected_input {
            log::warn!("program `{}` cannot draw {:?}", program.label, draw.geometry);
            return;
        }
        let empty = match draw.geometry {
            Geometry::Arrays { vertex_array, count } => self
                .vertex_arrays
                .get(vertex_array)
                .is_none_or(|va| va.count.min(count) == 0),
            Geometry::Mesh(mesh) => self.meshes.get(mesh).is_none_or(|m| m.index_count == 0),
        };
        if empty {
            log::trace!("draw with `{}` has no geometry, skipped", program.label);
            return;
        }

        let block = program.layout.size().max(MIN_UNIFORM_BLOCK);
        let offset = align_to(self.uniform_staging.len(), self.uniform_alignment);
        if offset + block > UNIFORM_ARENA_SIZE {
            log::warn!("uniform arena full, draw with `{}` skipped", program.label);
            return;
        }
        self.uniform_staging.resize(offset + block, 0);
        program
            .layout
            .pack(draw.uniforms, &mut self.uniform_staging[offset..offset + block]);

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &self.uniform_buffer,
                offset: offset as u64,
                size: NonZeroU64::new(block as u64),
            }),
        }];
        for (i, slot) in program.slots.iter().enumerate() {
            let bound = draw
                .textures
                .iter()
                .find(|(name, _)| *name == slot.name)
                .and_then(|(_, id)| self.textures.get(*id));
            let texture = match bound {
                Some(entry) if entry.fits(slot.kind) => entry,
                Some(entry) => {
                    log::warn!(
                        "`{}` cannot bind to {:?} slot `{}`",
                        entry.desc.label,
                        slot.kind,
                        slot.name
                    );
                    self.fallbacks.get(slot.kind)
                }
                None => self.fallbacks.get(slot.kind),
            };
            let binding = 1 + 2 * i as u32;
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
            if slot.kind != TextureSlotKind::Depth2d {
                entries.push(wgpu::BindGroupEntry {
                    binding: binding + 1,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                });
            }
        }
        let bind_group = self
            .gpu
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&program.label),
                layout: &program.bind_group_layout,
                entries: &entries,
            });

        let geometry = draw.geometry;
        let Some(pipeline) = self.pipeline_for(draw.program, key).cloned() else {
            return;
        };
        let Some(open) = self.pass.as_mut() else {
            return;
        };
        open.pass.set_pipeline(&pipeline);
        open.pass.set_bind_group(0, &bind_group, &[]);
        match geometry {
            Geometry::Arrays { vertex_array, count } => {
                if let Some(va) = self.vertex_arrays.get(vertex_array) {
                    open.pass.set_vertex_buffer(0, va.buffer.slice(..));
                    open.pass.draw(0..count.min(va.count), 0..1);
                }
            }
            Geometry::Mesh(mesh) => {
                if let Some(mesh) = self.meshes.get(mesh) {
                    open.pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                    open.pass
                        .set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    open.pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                }
            }
        }
    }

    fn end_pass(&mut self) {
        self.pass = None;
    }
}
