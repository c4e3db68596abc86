//! Camera transforms consumed by the stage.
//!
//! Hosts hand the stage a [`CameraView`] per frame. [`Camera`] is a small
//! reverse-Z perspective camera that produces one.

use glam::{Mat3, Mat4, Quat, Vec3};

/// Per-frame camera data the stage reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    pub world_position: Vec3,
    /// Unit forward vector in world space.
    pub forward: Vec3,
    /// World space to clip space (projection × view).
    pub world_to_clip: Mat4,
}

/// Perspective camera. Looks down its local -Z with +Y up.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Width / height.
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    /// Camera at `position` looking at `target`.
    ///
    /// `up` is a hint; world +Z replaces it when it is parallel to the view
    /// direction. A zero-length view direction looks down -Z.
    pub fn look_at(position: Vec3, target: Vec3, up: Vec3) -> Self {
        let forward = match (target - position).try_normalize() {
            Some(forward) => forward,
            None => Vec3::NEG_Z,
        };
        let right = forward
            .cross(up)
            .try_normalize()
            .or_else(|| forward.cross(Vec3::Z).try_normalize())
            .unwrap_or(Vec3::X);
        let true_up = right.cross(forward);
        let rotation = Quat::from_mat3(&Mat3::from_cols(right, true_up, -forward)).normalize();

        Self {
            position,
            rotation,
            ..Self::default()
        }
    }

    /// Set the vertical field of view (degrees) and aspect ratio from a target size.
    pub fn with_perspective(mut self, fov_y_degrees: f32, width: u32, height: u32) -> Self {
        self.fov_y = fov_y_degrees.to_radians();
        self.aspect_ratio = width as f32 / height.max(1) as f32;
        self
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position).inverse()
    }

    /// Reverse-Z: the near plane maps to depth 1, the far plane to 0.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect_ratio, self.far, self.near)
    }

    /// Snapshot of the transforms the stage needs this frame.
    pub fn view(&self) -> CameraView {
        CameraView {
            world_position: self.position,
            forward: self.forward(),
            world_to_clip: self.projection_matrix() * self.view_matrix(),
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov_y: std::f32::consts::FRAC_PI_4,
            aspect_ratio: 16.0 / 9.0,
            near: 0.1,
            far: 10000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vec_eq(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-5, "expected {b:?}, got {a:?}");
    }

    #[test]
    fn test_identity_camera_looks_down_neg_z() {
        assert_vec_eq(Camera::default().forward(), Vec3::NEG_Z);
    }

    #[test]
    fn test_look_at_points_forward_at_target() {
        let camera = Camera::look_at(Vec3::new(1.0, 2.0, 3.0), Vec3::new(1.0, 2.0, 10.0), Vec3::Y);
        assert_vec_eq(camera.forward(), Vec3::Z);
        assert_vec_eq(camera.rotation * Vec3::Y, Vec3::Y);
    }

    #[test]
    fn test_look_at_straight_up_uses_fallback_up() {
        let camera = Camera::look_at(Vec3::ZERO, Vec3::new(0.0, 5.0, 0.0), Vec3::Y);
        assert_vec_eq(camera.forward(), Vec3::Y);
        assert!(camera.forward().dot(camera.rotation * Vec3::Y).abs() < 1e-5);
    }

    #[test]
    fn test_look_at_own_position_keeps_default_forward() {
        let camera = Camera::look_at(Vec3::ONE, Vec3::ONE, Vec3::Y);
        assert_vec_eq(camera.forward(), Vec3::NEG_Z);
    }

    #[test]
    fn test_with_perspective_sets_aspect_from_size() {
        let camera = Camera::default().with_perspective(90.0, 1920, 1080);
        assert!((camera.aspect_ratio - 16.0 / 9.0).abs() < 1e-6);
        assert!((camera.fov_y - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_view_matrix_inverse_is_camera_transform() {
        let camera = Camera {
            position: Vec3::new(10.0, 20.0, 30.0),
            rotation: Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            ..Camera::default()
        };
        let reconstructed = camera.view_matrix().inverse().col(3).truncate();
        assert!((reconstructed - camera.position).length() < 1e-4);
    }

    #[test]
    fn test_reverse_z_depth_range() {
        let camera = Camera::default();
        let proj = camera.projection_matrix();
        let near = proj * glam::Vec4::new(0.0, 0.0, -camera.near, 1.0);
        let far = proj * glam::Vec4::new(0.0, 0.0, -camera.far, 1.0);
        assert!((near.z / near.w - 1.0).abs() < 1e-4);
        assert!((far.z / far.w).abs() < 1e-4);
    }

    #[test]
    fn test_view_snapshot_matches_camera() {
        let camera = Camera::look_at(Vec3::new(0.0, 1.0, -5.0), Vec3::ZERO, Vec3::Y);
        let view = camera.view();
        assert_eq!(view.world_position, camera.position);
        assert_vec_eq(view.forward, camera.forward());
        assert_eq!(
            view.world_to_clip,
            camera.projection_matrix() * camera.view_matrix()
        );
    }
}
