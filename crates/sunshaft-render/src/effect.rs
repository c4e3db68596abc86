//! The light scattering stage.
//!
//! Sequences, per camera-frame:
//!
//! 1. **Prepare**: allocate the reduced-resolution occlusion buffer.
//! 2. **Occlusion**: sky, then opaque renderers with the occluder override.
//! 3. **Projection**: viewport position of the dominant light.
//! 4. **Diffuse** (optional): Gaussian blur of the mask onto the camera target.
//! 5. **Radial**: streak blur of the mask centred on the light, onto the camera target.
//! 6. **Release**: free the occlusion buffer.
//!
//! Steps 2 and 3 run inside the `"volumetric-light-scattering"` debug group.

use std::fmt::Debug;

use crate::backend::{RenderBackend, TargetDescriptor};
use crate::composite::{composite_diffuse, composite_radial, set_radial_uniforms};
use crate::frame::{FramePhase, ScatteringFrame, SkipReason};
use crate::occlusion::render_occlusion;
use crate::params::EffectParameters;
use crate::projection::project_light;
use crate::stage::{CameraFrame, RenderStage, StageEvent};

/// Debug group the occlusion and projection work is recorded under.
pub const PROFILING_SCOPE: &str = "volumetric-light-scattering";

/// The programs the effect draws with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    Occluder,
    RadialBlur,
    GaussianBlur,
}

/// Program handles created by the host at build time.
///
/// `None` marks a program that failed to load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScatteringPrograms<P> {
    pub occluder: Option<P>,
    pub radial_blur: Option<P>,
    pub gaussian_blur: Option<P>,
}

impl<P> Default for ScatteringPrograms<P> {
    fn default() -> Self {
        Self {
            occluder: None,
            radial_blur: None,
            gaussian_blur: None,
        }
    }
}

/// Programs a frame needs, all present.
struct ResolvedPrograms<P> {
    occluder: P,
    radial_blur: P,
    gaussian_blur: Option<P>,
}

impl<P: Copy> ScatteringPrograms<P> {
    /// Kinds that are missing, in pass order.
    pub fn missing(&self) -> Vec<ProgramKind> {
        [
            (ProgramKind::Occluder, self.occluder.is_none()),
            (ProgramKind::RadialBlur, self.radial_blur.is_none()),
            (ProgramKind::GaussianBlur, self.gaussian_blur.is_none()),
        ]
        .into_iter()
        .filter_map(|(kind, missing)| missing.then_some(kind))
        .collect()
    }

    fn resolve(&self, diffuse_enabled: bool) -> Result<ResolvedPrograms<P>, ProgramKind> {
        let occluder = self.occluder.ok_or(ProgramKind::Occluder)?;
        let radial_blur = self.radial_blur.ok_or(ProgramKind::RadialBlur)?;
        let gaussian_blur = if diffuse_enabled {
            Some(self.gaussian_blur.ok_or(ProgramKind::GaussianBlur)?)
        } else {
            None
        };
        Ok(ResolvedPrograms {
            occluder,
            radial_blur,
            gaussian_blur,
        })
    }
}

/// Screen-space volumetric light scattering stage.
///
/// Immutable after construction; all per-frame state lives in the
/// [`ScatteringFrame`] returned by `prepare`.
#[derive(Debug, Clone)]
pub struct LightScatteringEffect<P> {
    params: EffectParameters,
    programs: ScatteringPrograms<P>,
}

impl<P: Copy + Debug> LightScatteringEffect<P> {
    pub fn new(params: EffectParameters, programs: ScatteringPrograms<P>) -> Self {
        for kind in programs.missing() {
            if kind == ProgramKind::GaussianBlur && !params.diffuse_enabled() {
                continue;
            }
            log::warn!("Light scattering {kind:?} program is missing; the effect will be skipped");
        }
        log::info!(
            "Light scattering effect created (scale {}, diffuse {}, format {:?})",
            params.resolution_scale(),
            params.diffuse_enabled(),
            params.color_format()
        );
        Self { params, programs }
    }

    pub fn params(&self) -> &EffectParameters {
        &self.params
    }

    pub fn programs(&self) -> &ScatteringPrograms<P> {
        &self.programs
    }
}

impl<B, P> RenderStage<B> for LightScatteringEffect<P>
where
    B: RenderBackend<Program = P> + ?Sized,
    P: Copy + Eq + Debug,
{
    type Frame = ScatteringFrame<B::Target>;

    fn event(&self) -> StageEvent {
        StageEvent::BeforePostProcessing
    }

    fn prepare(&self, backend: &mut B, camera_target: &TargetDescriptor) -> Self::Frame {
        ScatteringFrame::allocate(backend, camera_target, &self.params)
    }

    fn execute(&self, backend: &mut B, frame: &mut Self::Frame, camera: &CameraFrame<'_, B>) {
        if frame.phase() != FramePhase::Prepared {
            log::trace!("Light scattering execute skipped in phase {:?}", frame.phase());
            return;
        }
        let Some(mask) = frame.target() else {
            return;
        };
        let programs = match self.programs.resolve(self.params.diffuse_enabled()) {
            Ok(programs) => programs,
            Err(kind) => {
                log::debug!("Light scattering skipped: {kind:?} program missing");
                frame.advance(FramePhase::Skipped(SkipReason::MissingProgram(kind)));
                return;
            }
        };

        backend.push_debug_group(PROFILING_SCOPE);
        render_occlusion(
            backend,
            mask,
            &camera.camera,
            camera.draw_list,
            programs.occluder,
        );
        frame.advance(FramePhase::Occluded);

        let light = project_light(&camera.camera, camera.light_forward);
        frame.set_light_position(light);
        frame.advance(FramePhase::Projected);
        set_radial_uniforms(backend, programs.radial_blur, light, &self.params);
        backend.pop_debug_group();

        if let Some(gaussian) = programs.gaussian_blur {
            composite_diffuse(backend, mask, camera.color_target, gaussian, &self.params);
            frame.advance(FramePhase::Diffused);
        }

        composite_radial(backend, mask, camera.color_target, programs.radial_blur);
        frame.advance(FramePhase::Composited);
    }

    fn release(&self, backend: &mut B, mut frame: Self::Frame) {
        frame.release(backend);
    }
}
