//! Pinhole camera state captured once per frame.

use glam::{Quat, Vec3};

/// Camera looking down its local `+Z` axis, with `+Y` up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    /// Rays stop marching after this distance.
    pub far_clip: f32,
    /// Distance below which a march step counts as a hit.
    pub precision: f32,
    /// Direction towards the sun. Drives the sky colour and the shading.
    pub light_direction: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov_degrees: 60.0,
            far_clip: 100.0,
            precision: 0.001,
            light_direction: Vec3::new(0.4, 0.7, -0.6).normalize(),
        }
    }
}

impl Camera {
    /// Camera at `eye` oriented so that its forward axis points at `target`.
    #[must_use]
    pub fn looking_at(eye: Vec3, target: Vec3) -> Self {
        let forward = (target - eye).normalize_or_zero();
        let rotation = if forward == Vec3::ZERO {
            Quat::IDENTITY
        } else {
            Quat::from_rotation_arc(Vec3::Z, forward)
        };
        Self {
            position: eye,
            rotation,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    #[must_use]
    pub fn with_light_direction(mut self, direction: Vec3) -> Self {
        self.light_direction = direction.normalize_or_zero();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looking_at_points_forward_at_target() {
        let camera = Camera::looking_at(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO);
        assert!((camera.forward() - Vec3::Z).length() < 1e-6);

        let camera = Camera::looking_at(Vec3::new(3.0, 0.0, 0.0), Vec3::ZERO);
        assert!((camera.forward() - Vec3::NEG_X).length() < 1e-5);
    }

    #[test]
    fn degenerate_target_keeps_identity() {
        let camera = Camera::looking_at(Vec3::ONE, Vec3::ONE);
        assert_eq!(camera.rotation, Quat::IDENTITY);
    }
}
