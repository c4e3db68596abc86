//! Screen-space volumetric light scattering ("god rays") as a host-driven render stage.
//!
//! Each camera-frame the stage renders an occlusion mask into a reduced-resolution
//! buffer, projects the dominant light into viewport space, optionally composites a
//! separable Gaussian blur of the mask, and finally composites a radial streak blur
//! centred on the projected light. GPU work goes through the [`RenderBackend`] trait;
//! [`WgpuBackend`] is the wgpu implementation.

pub mod backend;
pub mod camera;
pub mod composite;
pub mod effect;
pub mod frame;
pub mod gpu;
pub mod occlusion;
pub mod params;
pub mod projection;
pub mod shaders;
pub mod stage;
pub mod uniforms;
pub mod wgpu_backend;

#[cfg(test)]
mod recording;

pub use backend::{
    AllocationError, DrawSettings, FilterMode, OCCLUDER_PASS_TAGS, RenderBackend,
    RenderQueueRange, SortingCriteria, TargetDescriptor,
};
pub use camera::{Camera, CameraView};
pub use effect::{LightScatteringEffect, PROFILING_SCOPE, ProgramKind, ScatteringPrograms};
pub use frame::{
    FramePhase, OCCLUSION_BUFFER_LABEL, ScatteringFrame, SkipReason, intermediate_descriptor,
    scaled_extent,
};
pub use gpu::{
    HeadlessContext, HeadlessContextError, HeadlessOptions, adapter_summary, init_headless_blocking,
};
pub use params::{EffectParameters, ParameterError, intermediate_format};
pub use projection::{ScreenLightPosition, project_light};
pub use shaders::{
    GAUSSIAN_BLUR_SHADER_SOURCE, OCCLUDER_SHADER_SOURCE, RADIAL_BLUR_SHADER_SOURCE, ShaderError,
    validate_wgsl,
};
pub use stage::{CameraFrame, RenderStage, StageEvent};
pub use sunshaft_config::ColorFormat;
pub use uniforms::{GaussianBlurParams, RadialBlurParams, UniformSlot, UniformValue};
pub use wgpu_backend::{
    BackendError, FullscreenProgramDescriptor, OccluderMesh, ProgramId, Readback, TextureId,
    WgpuBackend,
};
