//! Per camera-frame ownership of the intermediate occlusion buffer.

use std::fmt::Debug;

use crate::backend::{AllocationError, FilterMode, RenderBackend, TargetDescriptor};
use crate::effect::ProgramKind;
use crate::params::{EffectParameters, intermediate_format};
use crate::projection::ScreenLightPosition;

/// Debug label of the intermediate occlusion buffer.
pub const OCCLUSION_BUFFER_LABEL: &str = "occludes-map";

/// Scale a camera extent, rounding half-way values to even.
pub fn scaled_extent(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let scale_axis = |value: u32| (value as f32 * scale).round_ties_even() as u32;
    (scale_axis(width), scale_axis(height))
}

/// Descriptor of the intermediate buffer for a camera target.
///
/// Color only (no depth), with the format chosen by the effect's color format.
pub fn intermediate_descriptor(
    camera: &TargetDescriptor,
    params: &EffectParameters,
) -> TargetDescriptor {
    let (width, height) = scaled_extent(camera.width, camera.height, params.resolution_scale());
    TargetDescriptor {
        width,
        height,
        depth_bits: 0,
        format: intermediate_format(params.color_format(), camera.format),
    }
}

/// Why a frame produced no output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The intermediate buffer could not be allocated.
    AllocationFailed,
    /// A program the frame needs was never created.
    MissingProgram(ProgramKind),
}

/// Progress of one camera-frame through the stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePhase {
    Prepared,
    Occluded,
    Projected,
    Diffused,
    Composited,
    Skipped(SkipReason),
    Released,
}

/// Transient state of one stage invocation.
///
/// Holds the intermediate buffer from `prepare` until `release`. Dropping a
/// frame that still holds its buffer leaks the buffer in the backend.
pub struct ScatteringFrame<T: Copy + Debug> {
    target: Option<T>,
    descriptor: TargetDescriptor,
    phase: FramePhase,
    light_position: Option<ScreenLightPosition>,
}

impl<T: Copy + Debug> ScatteringFrame<T> {
    /// Allocate the intermediate buffer for a camera target.
    ///
    /// Never fails: an allocation error yields a frame in the
    /// `Skipped(AllocationFailed)` phase that holds no buffer.
    pub fn allocate<B>(backend: &mut B, camera: &TargetDescriptor, params: &EffectParameters) -> Self
    where
        B: RenderBackend<Target = T> + ?Sized,
    {
        let descriptor = intermediate_descriptor(camera, params);
        match Self::try_allocate(backend, &descriptor) {
            Ok(target) => Self {
                target: Some(target),
                descriptor,
                phase: FramePhase::Prepared,
                light_position: None,
            },
            Err(e) => {
                log::debug!("Skipping light scattering this frame: {e}");
                Self {
                    target: None,
                    descriptor,
                    phase: FramePhase::Skipped(SkipReason::AllocationFailed),
                    light_position: None,
                }
            }
        }
    }

    fn try_allocate<B>(backend: &mut B, descriptor: &TargetDescriptor) -> Result<T, AllocationError>
    where
        B: RenderBackend<Target = T> + ?Sized,
    {
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(AllocationError::ZeroExtent {
                width: descriptor.width,
                height: descriptor.height,
            });
        }
        backend.allocate_target(descriptor, FilterMode::Trilinear, OCCLUSION_BUFFER_LABEL)
    }

    /// The intermediate buffer, if this frame holds one.
    pub fn target(&self) -> Option<T> {
        self.target
    }

    /// Descriptor the buffer was (or would have been) allocated with.
    pub fn descriptor(&self) -> &TargetDescriptor {
        &self.descriptor
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Light position computed during `execute`, if it got that far.
    pub fn light_position(&self) -> Option<ScreenLightPosition> {
        self.light_position
    }

    pub(crate) fn advance(&mut self, phase: FramePhase) {
        log::trace!("Light scattering frame {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    pub(crate) fn set_light_position(&mut self, position: ScreenLightPosition) {
        self.light_position = Some(position);
    }

    /// Return the buffer to the backend.
    ///
    /// Returns `false` when there was nothing to release.
    pub fn release<B>(&mut self, backend: &mut B) -> bool
    where
        B: RenderBackend<Target = T> + ?Sized,
    {
        match self.target.take() {
            Some(target) => {
                backend.release_target(target);
                self.phase = FramePhase::Released;
                true
            }
            None => false,
        }
    }
}

impl<T: Copy + Debug> Drop for ScatteringFrame<T> {
    fn drop(&mut self) {
        if let Some(target) = self.target {
            log::warn!("ScatteringFrame dropped without release() - leaking target {target:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Call, RecordingBackend};
    use sunshaft_config::{ColorFormat, EffectConfig};

    fn camera(width: u32, height: u32) -> TargetDescriptor {
        TargetDescriptor {
            width,
            height,
            depth_bits: 24,
            format: wgpu::TextureFormat::Bgra8UnormSrgb,
        }
    }

    fn params(scale: f32, color_format: ColorFormat) -> EffectParameters {
        EffectParameters::try_from(&EffectConfig {
            resolution_scale: scale,
            color_format,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_scaled_extent_half() {
        assert_eq!(scaled_extent(1920, 1080, 0.5), (960, 540));
        assert_eq!(scaled_extent(1280, 720, 1.0), (1280, 720));
    }

    #[test]
    fn test_scaled_extent_rounds_half_to_even() {
        // 5 * 0.5 = 2.5 -> 2, 7 * 0.5 = 3.5 -> 4
        assert_eq!(scaled_extent(5, 7, 0.5), (2, 4));
    }

    #[test]
    fn test_scaled_extent_known_sizes() {
        // 1366 * 0.75 = 1024.5 ties to 1024
        assert_eq!(scaled_extent(1366, 768, 0.75), (1024, 576));
        assert_eq!(scaled_extent(3840, 2160, 0.1), (384, 216));
        assert_eq!(scaled_extent(640, 480, 0.25), (160, 120));
        // 0.5 ties to 0
        assert_eq!(scaled_extent(1, 1, 0.5), (0, 0));
    }

    #[test]
    fn test_single_pixel_camera_at_half_scale_skips() {
        let mut backend = RecordingBackend::new();
        let mut frame =
            ScatteringFrame::allocate(&mut backend, &camera(1, 1), &params(0.5, ColorFormat::Hdr));
        assert_eq!(frame.phase(), FramePhase::Skipped(SkipReason::AllocationFailed));
        assert!(backend.calls().is_empty());
        assert!(!frame.release(&mut backend));
    }

    #[test]
    fn test_intermediate_descriptor_has_no_depth() {
        let descriptor = intermediate_descriptor(&camera(1920, 1080), &params(0.5, ColorFormat::Hdr));
        assert_eq!(descriptor.width, 960);
        assert_eq!(descriptor.height, 540);
        assert_eq!(descriptor.depth_bits, 0);
        assert_eq!(descriptor.format, wgpu::TextureFormat::Rgba16Float);
    }

    #[test]
    fn test_allocate_requests_trilinear_buffer() {
        let mut backend = RecordingBackend::new();
        let mut frame =
            ScatteringFrame::allocate(&mut backend, &camera(1920, 1080), &params(0.5, ColorFormat::Default));
        assert_eq!(frame.phase(), FramePhase::Prepared);
        let target = frame.target().expect("allocation should succeed");

        match &backend.calls()[0] {
            Call::Allocate {
                descriptor,
                filter,
                label,
                ..
            } => {
                assert_eq!((descriptor.width, descriptor.height), (960, 540));
                assert_eq!(descriptor.format, wgpu::TextureFormat::Rgba8Unorm);
                assert_eq!(*filter, FilterMode::Trilinear);
                assert_eq!(*label, OCCLUSION_BUFFER_LABEL);
            }
            other => panic!("expected allocation, got {other:?}"),
        }

        assert!(frame.release(&mut backend));
        assert_eq!(frame.phase(), FramePhase::Released);
        assert_eq!(backend.calls().last(), Some(&Call::Release(target)));
        assert!(!frame.release(&mut backend), "second release should be a no-op");
    }

    #[test]
    fn test_zero_extent_skips_without_calling_backend() {
        let mut backend = RecordingBackend::new();
        let mut frame =
            ScatteringFrame::allocate(&mut backend, &camera(1, 1), &params(0.1, ColorFormat::Hdr));
        assert_eq!(frame.target(), None);
        assert_eq!(frame.phase(), FramePhase::Skipped(SkipReason::AllocationFailed));
        assert!(backend.calls().is_empty());
        assert!(!frame.release(&mut backend));
    }

    #[test]
    fn test_backend_rejection_skips_frame() {
        let mut backend = RecordingBackend::new();
        backend.fail_allocations(true);
        let frame =
            ScatteringFrame::allocate(&mut backend, &camera(800, 600), &params(0.5, ColorFormat::Hdr));
        assert_eq!(frame.target(), None);
        assert_eq!(frame.phase(), FramePhase::Skipped(SkipReason::AllocationFailed));
    }

    #[test]
    fn test_buffer_size_follows_each_prepare() {
        let mut backend = RecordingBackend::new();
        let p = params(0.5, ColorFormat::Hdr);
        let mut small = ScatteringFrame::allocate(&mut backend, &camera(640, 480), &p);
        small.release(&mut backend);
        let mut large = ScatteringFrame::allocate(&mut backend, &camera(2560, 1440), &p);
        assert_eq!(large.descriptor().width, 1280);
        assert_eq!(large.descriptor().height, 720);
        large.release(&mut backend);
    }
}
