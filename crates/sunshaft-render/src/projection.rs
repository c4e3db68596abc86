//! Screen-space position of the dominant directional light.

use glam::{Vec2, Vec3, Vec4};

use crate::camera::CameraView;

/// Viewport-normalized light position: (0, 0) bottom-left, (1, 1) top-right.
///
/// Not clamped. Lights outside the view frustum produce coordinates outside
/// `[0, 1]`, lights behind the camera can flip sign, and a light on the camera
/// plane produces non-finite components.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenLightPosition(pub Vec2);

impl ScreenLightPosition {
    pub fn x(&self) -> f32 {
        self.0.x
    }

    pub fn y(&self) -> f32 {
        self.0.y
    }

    /// The `(x, y, 0, 0)` vector uploaded as the radial blur center.
    pub fn to_uniform(&self) -> Vec4 {
        Vec4::new(self.0.x, self.0.y, 0.0, 0.0)
    }
}

/// Project the point one unit along `light_forward` from the camera into viewport space.
///
/// Uses the same transform as the camera's geometry. Depth is discarded.
pub fn project_light(camera: &CameraView, light_forward: Vec3) -> ScreenLightPosition {
    let world = camera.world_position + light_forward;
    let clip = camera.world_to_clip * world.extend(1.0);
    let ndc = clip.truncate() / clip.w;
    ScreenLightPosition(Vec2::new(ndc.x * 0.5 + 0.5, ndc.y * 0.5 + 0.5))
}
