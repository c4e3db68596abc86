//! [`RenderBackend`] implementation over a wgpu device.
//!
//! Work is recorded into one command encoder until [`WgpuBackend::finish`] hands
//! the command buffer to the host. Uniform values set through
//! [`RenderBackend::set_uniform`] are staged on the CPU and snapshotted into a
//! fresh uniform buffer at each blit, so a set-then-blit sequence sees exactly
//! the values set before it even when several blits share one command buffer.
//!
//! Transient targets are pooled by size and format: a released target's texture
//! is reused by the next allocation with the same key.

use std::collections::HashMap;

use glam::Vec3;
use wgpu::util::DeviceExt;

use crate::backend::{
    AllocationError, DrawSettings, FilterMode, RenderBackend, SortingCriteria, TargetDescriptor,
};
use crate::camera::CameraView;
use crate::effect::ScatteringPrograms;
use crate::shaders::{
    GAUSSIAN_BLUR_SHADER_SOURCE, OCCLUDER_SHADER_SOURCE, RADIAL_BLUR_SHADER_SOURCE, ShaderError,
    validate_wgsl,
};
use crate::uniforms::{GaussianBlurParams, RadialBlurParams, UniformSlot, UniformValue};

/// Handle to a texture owned by a [`WgpuBackend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(u32);

/// Handle to a program owned by a [`WgpuBackend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(u32);

/// Errors raised by [`WgpuBackend`] operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("unknown target {0:?}")]
    UnknownTarget(TextureId),

    #[error("unknown program {0:?}")]
    UnknownProgram(ProgramId),

    #[error("target {0:?} was not created with TEXTURE_BINDING usage")]
    NotSampleable(TextureId),

    #[error("target {0:?} cannot be both source and destination of a blit")]
    SameTarget(TextureId),

    #[error("program {program:?} is not a {expected} program")]
    ProgramMismatch {
        program: ProgramId,
        expected: &'static str,
    },

    #[error("readback of {0:?} is not supported")]
    UnsupportedReadback(wgpu::TextureFormat),

    #[error("readback failed: {0}")]
    Readback(String),

    #[error(transparent)]
    Shader(#[from] ShaderError),
}

/// Opaque world-space geometry drawn into the occlusion mask.
pub struct OccluderMesh {
    /// `vec3<f32>` world-space positions.
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
    pub index_format: wgpu::IndexFormat,
    /// Center of the mesh bounds, used for front-to-back sorting.
    pub bounds_center: Vec3,
    pub render_queue: u32,
    pub pass_tag: &'static str,
}

impl OccluderMesh {
    /// Upload positions and 16-bit indices as an opaque forward-pass mesh.
    pub fn new(device: &wgpu::Device, label: &str, positions: &[[f32; 3]], indices: &[u16]) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(positions),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
            index_format: wgpu::IndexFormat::Uint16,
            bounds_center: bounds_center(positions),
            render_queue: 2000,
            pass_tag: "forward",
        }
    }
}

/// Center of the axis-aligned bounds of `positions`; the origin when empty.
fn bounds_center(positions: &[[f32; 3]]) -> Vec3 {
    let mut iter = positions.iter().map(|p| Vec3::from_array(*p));
    let Some(first) = iter.next() else {
        return Vec3::ZERO;
    };
    let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
    (min + max) * 0.5
}

/// Describes a fullscreen program (vertex stage `vs_fullscreen`).
pub struct FullscreenProgramDescriptor<'a> {
    pub label: &'a str,
    pub source: &'a str,
    pub fragment_entry: &'a str,
    /// Slots the program accepts; others are rejected by `set_uniform`.
    pub uniform_slots: &'a [UniformSlot],
    /// Size in bytes of the `@group(0)` uniform block.
    pub uniform_size: usize,
    pub blend: Option<wgpu::BlendState>,
}

/// Pixels copied back from a target, tightly packed RGBA8.
pub struct Readback {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

const ADDITIVE_BLEND: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent::OVER,
};

const RADIAL_SLOTS: [UniformSlot; 3] = [
    UniformSlot::Center,
    UniformSlot::Intensity,
    UniformSlot::BlurWidth,
];

const GAUSSIAN_SLOTS: [UniformSlot; 4] = [
    UniformSlot::Radius,
    UniformSlot::Resolution,
    UniformSlot::HorizontalStep,
    UniformSlot::VerticalStep,
];

const OCCLUDER_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];

struct TargetEntry {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    filter: FilterMode,
    /// Allocated through `allocate_target` and returned to the pool on release.
    pooled: bool,
}

/// Submissions a released texture may sit idle before it is destroyed.
const MAX_IDLE_SUBMISSIONS: u64 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PoolKey {
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
}

/// A released texture and the submission count at release time.
struct Idle<T> {
    item: T,
    released_at: u64,
}

/// Drop idle entries released more than `max_age` submissions before `now`,
/// and keys left empty. Returns how many entries were dropped.
fn evict_stale<T>(pool: &mut HashMap<PoolKey, Vec<Idle<T>>>, now: u64, max_age: u64) -> usize {
    let before: usize = pool.values().map(Vec::len).sum();
    pool.retain(|_, idle| {
        idle.retain(|entry| now.saturating_sub(entry.released_at) <= max_age);
        !idle.is_empty()
    });
    before - pool.values().map(Vec::len).sum::<usize>()
}

/// Map the result of an error scope around `create_texture` to an allocation error.
fn texture_creation_result(
    format: wgpu::TextureFormat,
    error: Option<wgpu::Error>,
) -> Result<(), AllocationError> {
    match error {
        None => Ok(()),
        Some(error) => Err(AllocationError::Rejected {
            format,
            reason: error.to_string(),
        }),
    }
}

enum ProgramStyle {
    Fullscreen {
        fragment_entry: String,
        blend: Option<wgpu::BlendState>,
    },
    Occluder,
}

struct ProgramEntry {
    label: String,
    module: wgpu::ShaderModule,
    layout: wgpu::PipelineLayout,
    style: ProgramStyle,
    slots: Vec<UniformSlot>,
    staging: Vec<u8>,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

struct Samplers {
    point: wgpu::Sampler,
    bilinear: wgpu::Sampler,
    trilinear: wgpu::Sampler,
}

impl Samplers {
    fn new(device: &wgpu::Device) -> Self {
        let create = |label: &str, filter: wgpu::FilterMode, mipmap_filter: wgpu::MipmapFilterMode| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter,
                ..Default::default()
            })
        };
        Self {
            point: create(
                "sunshaft-point-sampler",
                wgpu::FilterMode::Nearest,
                wgpu::MipmapFilterMode::Nearest,
            ),
            bilinear: create(
                "sunshaft-bilinear-sampler",
                wgpu::FilterMode::Linear,
                wgpu::MipmapFilterMode::Nearest,
            ),
            trilinear: create(
                "sunshaft-trilinear-sampler",
                wgpu::FilterMode::Linear,
                wgpu::MipmapFilterMode::Linear,
            ),
        }
    }

    fn get(&self, filter: FilterMode) -> &wgpu::Sampler {
        match filter {
            FilterMode::Point => &self.point,
            FilterMode::Bilinear => &self.bilinear,
            FilterMode::Trilinear => &self.trilinear,
        }
    }
}

/// Records the light scattering passes with wgpu.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    encoder: wgpu::CommandEncoder,
    uniform_bgl: wgpu::BindGroupLayout,
    texture_bgl: wgpu::BindGroupLayout,
    samplers: Samplers,
    targets: HashMap<TextureId, TargetEntry>,
    idle_targets: HashMap<PoolKey, Vec<Idle<wgpu::Texture>>>,
    submissions: u64,
    programs: HashMap<ProgramId, ProgramEntry>,
    next_texture: u32,
    next_program: u32,
    sky_color: wgpu::Color,
    debug_depth: u32,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let uniform_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sunshaft-uniform-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sunshaft-texture-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let samplers = Samplers::new(&device);
        let encoder = create_encoder(&device);

        Self {
            device,
            queue,
            encoder,
            uniform_bgl,
            texture_bgl,
            samplers,
            targets: HashMap::new(),
            idle_targets: HashMap::new(),
            submissions: 0,
            programs: HashMap::new(),
            next_texture: 0,
            next_program: 0,
            sky_color: wgpu::Color::WHITE,
            debug_depth: 0,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Color the sky pass clears the occlusion mask to.
    pub fn set_sky_color(&mut self, color: [f32; 4]) {
        self.sky_color = wgpu::Color {
            r: f64::from(color[0]),
            g: f64::from(color[1]),
            b: f64::from(color[2]),
            a: f64::from(color[3]),
        };
    }

    /// Validate and register a fullscreen program.
    pub fn create_fullscreen_program(
        &mut self,
        desc: &FullscreenProgramDescriptor<'_>,
    ) -> Result<ProgramId, BackendError> {
        validate_wgsl(desc.label, desc.source)?;
        let module = self.create_module(desc.label, desc.source);
        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &[&self.uniform_bgl, &self.texture_bgl],
                immediate_size: 0,
            });
        Ok(self.register_program(ProgramEntry {
            label: desc.label.to_string(),
            module,
            layout,
            style: ProgramStyle::Fullscreen {
                fragment_entry: desc.fragment_entry.to_string(),
                blend: desc.blend,
            },
            slots: desc.uniform_slots.to_vec(),
            staging: vec![0; desc.uniform_size],
            pipelines: HashMap::new(),
        }))
    }

    /// Validate and register an occluder program (entry points `vs_occluder` / `fs_occluder`).
    pub fn create_occluder_program(
        &mut self,
        label: &str,
        source: &str,
    ) -> Result<ProgramId, BackendError> {
        validate_wgsl(label, source)?;
        let module = self.create_module(label, source);
        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[&self.uniform_bgl],
                immediate_size: 0,
            });
        Ok(self.register_program(ProgramEntry {
            label: label.to_string(),
            module,
            layout,
            style: ProgramStyle::Occluder,
            slots: Vec::new(),
            staging: Vec::new(),
            pipelines: HashMap::new(),
        }))
    }

    /// Build the occluder, radial blur and Gaussian blur programs.
    ///
    /// A program that fails to build is logged and left as `None`.
    pub fn create_default_programs(&mut self) -> ScatteringPrograms<ProgramId> {
        let occluder = self.create_occluder_program("sunshaft-occluder", OCCLUDER_SHADER_SOURCE);
        let radial_blur = self.create_fullscreen_program(&FullscreenProgramDescriptor {
            label: "sunshaft-radial-blur",
            source: RADIAL_BLUR_SHADER_SOURCE,
            fragment_entry: "fs_radial_blur",
            uniform_slots: &RADIAL_SLOTS,
            uniform_size: std::mem::size_of::<RadialBlurParams>(),
            blend: Some(ADDITIVE_BLEND),
        });
        let gaussian_blur = self.create_fullscreen_program(&FullscreenProgramDescriptor {
            label: "sunshaft-gaussian-blur",
            source: GAUSSIAN_BLUR_SHADER_SOURCE,
            fragment_entry: "fs_gaussian_blur",
            uniform_slots: &GAUSSIAN_SLOTS,
            uniform_size: std::mem::size_of::<GaussianBlurParams>(),
            blend: Some(ADDITIVE_BLEND),
        });

        let keep = |result: Result<ProgramId, BackendError>| match result {
            Ok(id) => Some(id),
            Err(e) => {
                log::error!("Failed to create light scattering program: {e}");
                None
            }
        };
        ScatteringPrograms {
            occluder: keep(occluder),
            radial_blur: keep(radial_blur),
            gaussian_blur: keep(gaussian_blur),
        }
    }

    /// Register a host-owned texture (e.g. a camera color target).
    ///
    /// Releasing an imported texture only forgets it.
    pub fn import_texture(&mut self, texture: wgpu::Texture, filter: FilterMode) -> TextureId {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = self.next_texture_id();
        self.targets.insert(
            id,
            TargetEntry {
                texture,
                view,
                filter,
                pooled: false,
            },
        );
        id
    }

    pub fn texture(&self, id: TextureId) -> Option<&wgpu::Texture> {
        self.targets.get(&id).map(|entry| &entry.texture)
    }

    /// Number of targets currently allocated or imported and not yet released.
    pub fn live_target_count(&self) -> usize {
        self.targets.len()
    }

    /// Number of released textures waiting for reuse.
    pub fn idle_target_count(&self) -> usize {
        self.idle_targets.values().map(Vec::len).sum()
    }

    /// Record a clear of `target` to `color`.
    pub fn clear_target(&mut self, target: TextureId, color: wgpu::Color) -> Result<(), BackendError> {
        let view = self.view(target)?;
        self.clear_view(&view, color, "sunshaft-clear");
        Ok(())
    }

    /// Finish recording and return the command buffer for the host to submit.
    ///
    /// Unbalanced debug groups are closed first.
    pub fn finish(&mut self) -> wgpu::CommandBuffer {
        if self.debug_depth > 0 {
            log::warn!("Closing {} unbalanced debug group(s)", self.debug_depth);
            while self.debug_depth > 0 {
                self.encoder.pop_debug_group();
                self.debug_depth -= 1;
            }
        }
        let encoder = std::mem::replace(&mut self.encoder, create_encoder(&self.device));
        self.submissions += 1;
        let evicted = evict_stale(&mut self.idle_targets, self.submissions, MAX_IDLE_SUBMISSIONS);
        if evicted > 0 {
            log::debug!("Destroyed {evicted} idle target(s)");
        }
        encoder.finish()
    }

    /// Finish and submit the recorded work.
    pub fn submit(&mut self) -> wgpu::SubmissionIndex {
        let commands = self.finish();
        self.queue.submit([commands])
    }

    /// Submit pending work and read `target` back as RGBA8 rows.
    ///
    /// Supports 4-byte RGBA/BGRA 8-bit formats; BGRA is swizzled to RGBA.
    pub fn read_rgba8(&mut self, target: TextureId) -> Result<Readback, BackendError> {
        let entry = self
            .targets
            .get(&target)
            .ok_or(BackendError::UnknownTarget(target))?;
        let texture = entry.texture.clone();
        let format = texture.format();
        let is_bgra = match format {
            wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => false,
            wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => true,
            other => return Err(BackendError::UnsupportedReadback(other)),
        };
        if !texture.usage().contains(wgpu::TextureUsages::COPY_SRC) {
            return Err(BackendError::UnsupportedReadback(format));
        }

        let width = texture.width();
        let height = texture.height();
        let bytes_per_pixel = 4u32;
        let unpadded = width * bytes_per_pixel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sunshaft-readback"),
            size: u64::from(padded * height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        self.encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.submit();

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| BackendError::Readback(e.to_string()))?;
        rx.recv()
            .map_err(|e| BackendError::Readback(e.to_string()))?
            .map_err(|e| BackendError::Readback(e.to_string()))?;

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        for row in 0..height {
            let start = (row * padded) as usize;
            let row_data = &mapped[start..start + unpadded as usize];
            if is_bgra {
                for chunk in row_data.chunks_exact(4) {
                    pixels.extend_from_slice(&[chunk[2], chunk[1], chunk[0], chunk[3]]);
                }
            } else {
                pixels.extend_from_slice(row_data);
            }
        }
        drop(mapped);
        buffer.unmap();

        Ok(Readback {
            width,
            height,
            pixels,
        })
    }

    fn create_module(&self, label: &str, source: &str) -> wgpu::ShaderModule {
        self.device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
    }

    fn register_program(&mut self, entry: ProgramEntry) -> ProgramId {
        self.next_program += 1;
        let id = ProgramId(self.next_program);
        log::debug!("Registered program '{}' as {id:?}", entry.label);
        self.programs.insert(id, entry);
        id
    }

    fn next_texture_id(&mut self) -> TextureId {
        self.next_texture += 1;
        TextureId(self.next_texture)
    }

    fn view(&self, target: TextureId) -> Result<wgpu::TextureView, BackendError> {
        self.targets
            .get(&target)
            .map(|entry| entry.view.clone())
            .ok_or(BackendError::UnknownTarget(target))
    }

    /// Pipeline of `program` for a color target of `format`, built on first use.
    fn pipeline(
        &mut self,
        program: ProgramId,
        format: wgpu::TextureFormat,
    ) -> Result<wgpu::RenderPipeline, BackendError> {
        let entry = self
            .programs
            .get_mut(&program)
            .ok_or(BackendError::UnknownProgram(program))?;
        if let Some(pipeline) = entry.pipelines.get(&format) {
            return Ok(pipeline.clone());
        }
        let pipeline = match &entry.style {
            ProgramStyle::Fullscreen {
                fragment_entry,
                blend,
            } => create_fullscreen_pipeline(
                &self.device,
                &entry.module,
                &entry.layout,
                fragment_entry,
                format,
                *blend,
                &entry.label,
            ),
            ProgramStyle::Occluder => {
                create_occluder_pipeline(&self.device, &entry.module, &entry.layout, format, &entry.label)
            }
        };
        log::debug!("Built '{}' pipeline for {format:?}", entry.label);
        entry.pipelines.insert(format, pipeline.clone());
        Ok(pipeline)
    }

    fn clear_view(&mut self, view: &wgpu::TextureView, color: wgpu::Color, label: &str) {
        let _pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(color),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
    }

    fn uniform_bind_group(&self, contents: &[u8], label: &str) -> wgpu::BindGroup {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::UNIFORM,
            });
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.uniform_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        })
    }

    fn try_allocate(
        &mut self,
        descriptor: &TargetDescriptor,
        filter: FilterMode,
        label: &'static str,
    ) -> Result<TextureId, AllocationError> {
        let (width, height) = (descriptor.width, descriptor.height);
        if width == 0 || height == 0 {
            return Err(AllocationError::ZeroExtent { width, height });
        }
        let limit = self.device.limits().max_texture_dimension_2d;
        if width > limit || height > limit {
            return Err(AllocationError::ExceedsLimit {
                width,
                height,
                limit,
            });
        }
        let usage = target_usage();
        let features = descriptor
            .format
            .guaranteed_format_features(self.device.features());
        if !features.allowed_usages.contains(usage) {
            return Err(AllocationError::Rejected {
                format: descriptor.format,
                reason: "format cannot be both rendered to and sampled".to_string(),
            });
        }

        let key = PoolKey {
            width,
            height,
            format: descriptor.format,
        };
        let texture = match self.idle_targets.get_mut(&key).and_then(Vec::pop) {
            Some(idle) => idle.item,
            None => {
                log::trace!("Creating {label} texture {width}x{height} {:?}", descriptor.format);
                // Inner scope is popped first.
                let oom_scope = self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
                let validation_scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
                let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size: wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: descriptor.format,
                    usage,
                    view_formats: &[],
                });
                let validation = pollster::block_on(validation_scope.pop());
                let oom = pollster::block_on(oom_scope.pop());
                texture_creation_result(descriptor.format, oom.or(validation))?;
                texture
            }
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = self.next_texture_id();
        self.targets.insert(
            id,
            TargetEntry {
                texture,
                view,
                filter,
                pooled: true,
            },
        );
        Ok(id)
    }

    fn try_draw_renderers(
        &mut self,
        target: TextureId,
        camera: &CameraView,
        draw_list: &[OccluderMesh],
        settings: &DrawSettings<ProgramId>,
    ) -> Result<(), BackendError> {
        let program = settings.override_program;
        match self.programs.get(&program) {
            Some(ProgramEntry {
                style: ProgramStyle::Occluder,
                ..
            }) => {}
            Some(_) => {
                return Err(BackendError::ProgramMismatch {
                    program,
                    expected: "occluder",
                });
            }
            None => return Err(BackendError::UnknownProgram(program)),
        }
        let entry = self
            .targets
            .get(&target)
            .ok_or(BackendError::UnknownTarget(target))?;
        let view = entry.view.clone();
        let format = entry.texture.format();
        let pipeline = self.pipeline(program, format)?;

        let visible = draw_order(draw_list, camera, settings);
        if visible.is_empty() {
            return Ok(());
        }

        let matrix = camera.world_to_clip.to_cols_array();
        let camera_bg = self.uniform_bind_group(bytemuck::cast_slice(&matrix), "sunshaft-occluder-camera");

        let mut pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("sunshaft-occluders"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &camera_bg, &[]);
        for mesh in visible {
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), mesh.index_format);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
        Ok(())
    }

    fn try_set_uniform(
        &mut self,
        program: ProgramId,
        slot: UniformSlot,
        value: UniformValue,
    ) -> Result<(), BackendError> {
        let entry = self
            .programs
            .get_mut(&program)
            .ok_or(BackendError::UnknownProgram(program))?;
        if !entry.slots.contains(&slot) || !value.write_to(&mut entry.staging, slot.offset()) {
            log::warn!(
                "Program '{}' has no uniform '{}' of {} bytes",
                entry.label,
                slot.name(),
                value.size()
            );
        }
        Ok(())
    }

    fn try_blit(
        &mut self,
        source: TextureId,
        destination: TextureId,
        program: ProgramId,
    ) -> Result<(), BackendError> {
        if source == destination {
            return Err(BackendError::SameTarget(source));
        }
        let src = self
            .targets
            .get(&source)
            .ok_or(BackendError::UnknownTarget(source))?;
        if !src
            .texture
            .usage()
            .contains(wgpu::TextureUsages::TEXTURE_BINDING)
        {
            return Err(BackendError::NotSampleable(source));
        }
        let src_view = src.view.clone();
        let sampler = self.samplers.get(src.filter).clone();
        let dst = self
            .targets
            .get(&destination)
            .ok_or(BackendError::UnknownTarget(destination))?;
        let dst_view = dst.view.clone();
        let format = dst.texture.format();

        match self.programs.get(&program) {
            Some(ProgramEntry {
                style: ProgramStyle::Fullscreen { .. },
                ..
            }) => {}
            Some(_) => {
                return Err(BackendError::ProgramMismatch {
                    program,
                    expected: "fullscreen",
                });
            }
            None => return Err(BackendError::UnknownProgram(program)),
        }
        let pipeline = self.pipeline(program, format)?;
        let uniform_bg = match self.programs.get(&program) {
            Some(entry) => self.uniform_bind_group(&entry.staging, &entry.label),
            None => return Err(BackendError::UnknownProgram(program)),
        };
        let texture_bg = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sunshaft-blit-source"),
            layout: &self.texture_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&src_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let mut pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("sunshaft-blit"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &dst_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &uniform_bg, &[]);
        pass.set_bind_group(1, &texture_bg, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }
}

impl RenderBackend for WgpuBackend {
    type Target = TextureId;
    type Program = ProgramId;
    type DrawList = [OccluderMesh];

    fn allocate_target(
        &mut self,
        descriptor: &TargetDescriptor,
        filter: FilterMode,
        label: &'static str,
    ) -> Result<TextureId, AllocationError> {
        self.try_allocate(descriptor, filter, label)
    }

    fn release_target(&mut self, target: TextureId) {
        match self.targets.remove(&target) {
            Some(entry) if entry.pooled => {
                let key = PoolKey {
                    width: entry.texture.width(),
                    height: entry.texture.height(),
                    format: entry.texture.format(),
                };
                self.idle_targets.entry(key).or_default().push(Idle {
                    item: entry.texture,
                    released_at: self.submissions,
                });
            }
            Some(_) => {}
            None => log::warn!("Released unknown target {target:?}"),
        }
    }

    fn push_debug_group(&mut self, label: &str) {
        self.encoder.push_debug_group(label);
        self.debug_depth += 1;
    }

    fn pop_debug_group(&mut self) {
        if self.debug_depth == 0 {
            log::warn!("pop_debug_group without a matching push");
            return;
        }
        self.encoder.pop_debug_group();
        self.debug_depth -= 1;
    }

    fn draw_sky(&mut self, target: TextureId, _camera: &CameraView) {
        match self.view(target) {
            Ok(view) => self.clear_view(&view, self.sky_color, "sunshaft-sky"),
            Err(e) => log::warn!("Sky pass skipped: {e}"),
        }
    }

    fn draw_renderers(
        &mut self,
        target: TextureId,
        camera: &CameraView,
        draw_list: &[OccluderMesh],
        settings: &DrawSettings<ProgramId>,
    ) {
        if let Err(e) = self.try_draw_renderers(target, camera, draw_list, settings) {
            log::warn!("Occluder pass skipped: {e}");
        }
    }

    fn set_uniform(&mut self, program: ProgramId, slot: UniformSlot, value: UniformValue) {
        if let Err(e) = self.try_set_uniform(program, slot, value) {
            log::warn!("Uniform '{}' not set: {e}", slot.name());
        }
    }

    fn blit(&mut self, source: TextureId, destination: TextureId, program: ProgramId) {
        if let Err(e) = self.try_blit(source, destination, program) {
            log::warn!("Blit skipped: {e}");
        }
    }
}

/// Meshes accepted by `settings`, in draw order.
fn draw_order<'a>(
    draw_list: &'a [OccluderMesh],
    camera: &CameraView,
    settings: &DrawSettings<ProgramId>,
) -> Vec<&'a OccluderMesh> {
    let mut visible: Vec<&OccluderMesh> = draw_list
        .iter()
        .filter(|mesh| settings.accepts(mesh.render_queue, mesh.pass_tag))
        .collect();
    if settings.sorting == SortingCriteria::CommonOpaque {
        let distance = |mesh: &OccluderMesh| mesh.bounds_center.distance_squared(camera.world_position);
        visible.sort_by(|a, b| distance(a).total_cmp(&distance(b)));
    }
    visible
}

fn target_usage() -> wgpu::TextureUsages {
    wgpu::TextureUsages::RENDER_ATTACHMENT
        | wgpu::TextureUsages::TEXTURE_BINDING
        | wgpu::TextureUsages::COPY_SRC
}

fn create_encoder(device: &wgpu::Device) -> wgpu::CommandEncoder {
    device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("sunshaft-encoder"),
    })
}

/// Create a fullscreen render pipeline with the given fragment entry point.
fn create_fullscreen_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    fragment_entry: &str,
    target_format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_fullscreen"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format: target_format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview_mask: None,
        cache: None,
    })
}

/// Create the occluder pipeline: world-space positions, no depth, no culling.
fn create_occluder_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    target_format: wgpu::TextureFormat,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_occluder"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &OCCLUDER_ATTRIBUTES,
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_occluder"),
            targets: &[Some(wgpu::ColorTargetState {
                format: target_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview_mask: None,
        cache: None,
    })
}
