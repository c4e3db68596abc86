//! Occlusion mask rendering.

use crate::backend::{DrawSettings, RenderBackend};
use crate::camera::CameraView;

/// Render the occlusion mask into `target`.
///
/// The sky is drawn first and fully overwrites the target; every opaque renderer
/// in `draw_list` is then drawn on top with `occluder` replacing its material.
pub fn render_occlusion<B>(
    backend: &mut B,
    target: B::Target,
    camera: &CameraView,
    draw_list: &B::DrawList,
    occluder: B::Program,
) where
    B: RenderBackend + ?Sized,
{
    backend.draw_sky(target, camera);
    backend.draw_renderers(
        target,
        camera,
        draw_list,
        &DrawSettings::opaque_override(occluder),
    );
}
