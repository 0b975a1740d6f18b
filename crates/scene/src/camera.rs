//! First-person camera with velocity-based movement.

use glam::{Mat4, Quat, Vec3};

/// Mouse sensitivity in radians per pixel of motion.
const MOUSE_SENSITIVITY: f32 = 1.0 / 200.0;

/// Per-update speed factor applied to the velocity vector.
const MOVE_SPEED: f32 = 0.5;

/// A free-flying first-person camera.
///
/// Orientation is stored as separate yaw and pitch angles rather than a
/// quaternion so mouse input cannot introduce roll.
#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vec3,
    /// Movement intent in camera-local space; set from key input.
    pub velocity: Vec3,
    /// Rotation around Y, radians.
    pub yaw: f32,
    /// Rotation around X, radians; clamped to avoid flipping over.
    pub pitch: f32,
    /// Vertical field of view, radians.
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            velocity: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            fov_y: 70.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 10000.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current orientation as a quaternion: yaw around Y, then pitch
    /// around the rotated X axis.
    pub fn rotation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch)
    }

    /// Applies mouse motion in pixels.
    pub fn process_mouse(&mut self, delta_x: f32, delta_y: f32) {
        self.yaw -= delta_x * MOUSE_SENSITIVITY;
        self.pitch = (self.pitch - delta_y * MOUSE_SENSITIVITY)
            .clamp(-std::f32::consts::FRAC_PI_2, std::f32::consts::FRAC_PI_2);
    }

    /// Advances the position by the current velocity, rotated into world
    /// space. Called once per frame.
    pub fn update(&mut self) {
        self.position += self.rotation() * (self.velocity * MOVE_SPEED);
    }

    /// View matrix: the inverse of the camera's world transform.
    pub fn view_matrix(&self) -> Mat4 {
        let camera_world = Mat4::from_translation(self.position) * Mat4::from_quat(self.rotation());
        camera_world.inverse()
    }

    /// Perspective projection with the Vulkan Y flip baked in.
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Updates the aspect ratio after a resize.
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_camera_looks_down_negative_z() {
        let camera = Camera::default();
        let forward = camera.rotation() * Vec3::NEG_Z;
        assert!((forward - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = Camera::default();
        camera.process_mouse(0.0, -10000.0);
        assert!(camera.pitch <= std::f32::consts::FRAC_PI_2);

        camera.process_mouse(0.0, 10000.0);
        assert!(camera.pitch >= -std::f32::consts::FRAC_PI_2);
    }

    #[test]
    fn test_update_moves_along_view_direction() {
        let mut camera = Camera::default();
        camera.velocity = Vec3::new(0.0, 0.0, -1.0);
        let before = camera.position;
        camera.update();
        // Identity orientation: forward velocity moves toward -Z.
        assert!(camera.position.z < before.z);
        assert_eq!(camera.position.x, before.x);
    }

    #[test]
    fn test_yaw_rotates_movement() {
        let mut camera = Camera::default();
        camera.yaw = std::f32::consts::FRAC_PI_2;
        camera.velocity = Vec3::new(0.0, 0.0, -1.0);
        let before = camera.position;
        camera.update();
        // Yawed 90 degrees: forward now points along -X.
        assert!(camera.position.x < before.x);
        assert!((camera.position.z - before.z).abs() < 1e-5);
    }

    #[test]
    fn test_view_matrix_inverts_position() {
        let mut camera = Camera::default();
        camera.position = Vec3::new(3.0, 1.0, 2.0);
        let view = camera.view_matrix();
        let origin_in_view = view.transform_point3(camera.position);
        assert!(origin_in_view.length() < 1e-5);
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::default();
        let proj = camera.projection_matrix();
        assert!(proj.y_axis.y < 0.0);
    }

    #[test]
    fn test_set_aspect_updates_perspective() {
        let mut camera = Camera::default();
        camera.set_aspect(2.0);
        assert_eq!(camera.aspect, 2.0);
        // fov is untouched by a resize.
        assert_eq!(camera.fov_y, 70.0_f32.to_radians());
    }
}
