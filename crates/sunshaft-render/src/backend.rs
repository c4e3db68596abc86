//! GPU resource and command interface the light scattering stage renders through.
//!
//! The stage never touches a device directly. Hosts implement [`RenderBackend`]
//! over their own texture allocator and command recorder; [`crate::WgpuBackend`]
//! is the reference implementation.

use crate::camera::CameraView;
use crate::uniforms::{UniformSlot, UniformValue};

/// Shader-pass tags the occluder override is applied to.
pub const OCCLUDER_PASS_TAGS: [&str; 4] = [
    "forward",
    "forward_only",
    "lightweight_forward",
    "default_unlit",
];

/// Size and format of a color render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub width: u32,
    pub height: u32,
    /// Bits of the depth attachment; 0 for color-only targets.
    pub depth_bits: u32,
    pub format: wgpu::TextureFormat,
}

/// Sampling filter a target is read with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Point,
    Bilinear,
    Trilinear,
}

/// Inclusive range of render-queue priorities.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderQueueRange {
    pub min: u32,
    pub max: u32,
}

impl RenderQueueRange {
    /// Opaque geometry and alpha-tested geometry.
    pub const OPAQUE: Self = Self { min: 0, max: 2500 };

    pub fn contains(&self, queue: u32) -> bool {
        (self.min..=self.max).contains(&queue)
    }
}

/// How the host orders renderers within a draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortingCriteria {
    /// The host's default opaque order (front to back).
    CommonOpaque,
    /// Keep the draw list order.
    Unsorted,
}

/// Filtering, sorting and material override for a renderer draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawSettings<P> {
    /// Program drawn instead of each renderer's own material.
    pub override_program: P,
    pub sorting: SortingCriteria,
    pub queue_range: RenderQueueRange,
    /// Only renderers whose pass tag is listed are drawn.
    pub pass_tags: &'static [&'static str],
}

impl<P> DrawSettings<P> {
    /// Opaque renderers in common-opaque order, drawn with `program`.
    pub fn opaque_override(program: P) -> Self {
        Self {
            override_program: program,
            sorting: SortingCriteria::CommonOpaque,
            queue_range: RenderQueueRange::OPAQUE,
            pass_tags: &OCCLUDER_PASS_TAGS,
        }
    }

    /// Whether a renderer with the given queue and pass tag passes the filter.
    pub fn accepts(&self, queue: u32, pass_tag: &str) -> bool {
        self.queue_range.contains(queue) && self.pass_tags.iter().any(|tag| *tag == pass_tag)
    }
}

/// Errors raised when a transient target cannot be allocated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    /// Width or height rounded to zero.
    #[error("target extent must be non-zero, got {width}x{height}")]
    ZeroExtent { width: u32, height: u32 },

    /// The device cannot hold a texture this large.
    #[error("target {width}x{height} exceeds the device limit of {limit}")]
    ExceedsLimit { width: u32, height: u32, limit: u32 },

    /// The allocator refused the request.
    #[error("allocator rejected {format:?} target: {reason}")]
    Rejected {
        format: wgpu::TextureFormat,
        reason: String,
    },
}

/// Texture allocation and command recording used by the stage.
///
/// Every method records work or changes backend-owned state; none of them
/// blocks on the GPU. Submission is the host's job.
pub trait RenderBackend {
    /// Handle to a color render target.
    type Target: Copy + Eq + std::fmt::Debug;
    /// Handle to a shader program.
    type Program: Copy + Eq + std::fmt::Debug;
    /// Host-side list of visible renderers.
    type DrawList: ?Sized;

    /// Allocate a transient color target.
    fn allocate_target(
        &mut self,
        descriptor: &TargetDescriptor,
        filter: FilterMode,
        label: &'static str,
    ) -> Result<Self::Target, AllocationError>;

    /// Release a target returned by [`allocate_target`](Self::allocate_target).
    fn release_target(&mut self, target: Self::Target);

    /// Open a named profiling scope.
    fn push_debug_group(&mut self, label: &str);

    /// Close the innermost profiling scope.
    fn pop_debug_group(&mut self);

    /// Draw the sky/background into `target`, overwriting its contents.
    fn draw_sky(&mut self, target: Self::Target, camera: &CameraView);

    /// Draw the renderers of `draw_list` accepted by `settings` into `target`.
    fn draw_renderers(
        &mut self,
        target: Self::Target,
        camera: &CameraView,
        draw_list: &Self::DrawList,
        settings: &DrawSettings<Self::Program>,
    );

    /// Set a uniform value on `program`; it stays set until overwritten.
    fn set_uniform(&mut self, program: Self::Program, slot: UniformSlot, value: UniformValue);

    /// Run `program` as a fullscreen pass reading `source` and writing `destination`.
    fn blit(&mut self, source: Self::Target, destination: Self::Target, program: Self::Program);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_range_bounds() {
        assert!(RenderQueueRange::OPAQUE.contains(0));
        assert!(RenderQueueRange::OPAQUE.contains(2000));
        assert!(RenderQueueRange::OPAQUE.contains(2500));
        assert!(!RenderQueueRange::OPAQUE.contains(3000));
    }

    #[test]
    fn test_opaque_override_filters_by_tag_and_queue() {
        let settings = DrawSettings::opaque_override(7u32);
        assert_eq!(settings.sorting, SortingCriteria::CommonOpaque);
        assert!(settings.accepts(2000, "forward"));
        assert!(settings.accepts(2450, "default_unlit"));
        assert!(!settings.accepts(2000, "shadow_caster"));
        assert!(!settings.accepts(3000, "forward"));
    }

    #[test]
    fn test_allocation_error_messages() {
        let err = AllocationError::ZeroExtent {
            width: 0,
            height: 4,
        };
        assert_eq!(err.to_string(), "target extent must be non-zero, got 0x4");
    }
}
