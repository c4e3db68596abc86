//! Radial scatter and diffuse blur compositing passes.
//!
//! Both passes read the occlusion mask and write the camera color target. The
//! diffuse pass (when enabled) runs first; the radial pass always runs last.

use crate::backend::RenderBackend;
use crate::params::EffectParameters;
use crate::projection::ScreenLightPosition;
use crate::uniforms::{UniformSlot, UniformValue};

/// Upload `_Center`, `_Intensity` and `_BlurWidth` to the radial program.
pub fn set_radial_uniforms<B>(
    backend: &mut B,
    program: B::Program,
    light: ScreenLightPosition,
    params: &EffectParameters,
) where
    B: RenderBackend + ?Sized,
{
    backend.set_uniform(
        program,
        UniformSlot::Center,
        UniformValue::Vector(light.to_uniform()),
    );
    backend.set_uniform(
        program,
        UniformSlot::Intensity,
        UniformValue::Float(params.intensity()),
    );
    backend.set_uniform(
        program,
        UniformSlot::BlurWidth,
        UniformValue::Float(params.blur_width()),
    );
}

/// Blit the occlusion mask onto the camera target through the radial program.
///
/// Expects [`set_radial_uniforms`] to have been called for this frame.
pub fn composite_radial<B>(
    backend: &mut B,
    mask: B::Target,
    color_target: B::Target,
    program: B::Program,
) where
    B: RenderBackend + ?Sized,
{
    backend.blit(mask, color_target, program);
}

/// Upload the Gaussian uniforms and blit the mask onto the camera target.
pub fn composite_diffuse<B>(
    backend: &mut B,
    mask: B::Target,
    color_target: B::Target,
    program: B::Program,
    params: &EffectParameters,
) where
    B: RenderBackend + ?Sized,
{
    let uniforms = [
        (UniformSlot::Radius, params.diffuse_radius()),
        (UniformSlot::Resolution, params.light_quality()),
        (UniformSlot::HorizontalStep, params.horizontal_step()),
        (UniformSlot::VerticalStep, params.vertical_step()),
    ];
    for (slot, value) in uniforms {
        backend.set_uniform(program, slot, UniformValue::Float(value));
    }
    backend.blit(mask, color_target, program);
}
