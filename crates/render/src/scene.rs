//! Per-frame volume snapshots.

use volumes::{Quat, Vec3, Volume, VolumeError};

/// Produces the volume list of one frame.
pub trait SceneSource {
    /// Advances the scene by `delta_seconds` and returns the frame's volumes.
    ///
    /// # Errors
    ///
    /// [`VolumeError`] when the scene cannot build a valid volume.
    fn snapshot(&mut self, delta_seconds: f32) -> Result<Vec<Volume>, VolumeError>;
}

/// A fixed set of volumes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticScene {
    pub volumes: Vec<Volume>,
}

impl StaticScene {
    #[must_use]
    pub fn new(volumes: Vec<Volume>) -> Self {
        Self { volumes }
    }
}

impl SceneSource for StaticScene {
    fn snapshot(&mut self, _delta_seconds: f32) -> Result<Vec<Volume>, VolumeError> {
        Ok(self.volumes.clone())
    }
}

/// One box spinning about a fixed axis.
#[derive(Debug, Clone, PartialEq)]
pub struct RotatingBoxScene {
    pub position: Vec3,
    pub size: Vec3,
    pub axis: Vec3,
    /// Degrees per second.
    pub speed: f32,
    /// Accumulated angle in degrees.
    pub angle: f32,
}

impl RotatingBoxScene {
    #[must_use]
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            size: Vec3::ONE,
            axis: Vec3::Y,
            speed: 20.0,
            angle: 0.0,
        }
    }

    #[must_use]
    pub fn rotation(&self) -> Quat {
        Quat::from_axis_angle(self.axis.normalize_or_zero(), self.angle.to_radians())
    }
}

impl Default for RotatingBoxScene {
    fn default() -> Self {
        Self::new(Vec3::ZERO)
    }
}

impl SceneSource for RotatingBoxScene {
    fn snapshot(&mut self, delta_seconds: f32) -> Result<Vec<Volume>, VolumeError> {
        self.angle = (self.angle + self.speed * delta_seconds) % 360.0;
        let volume = Volume::cuboid(self.position, self.size)?.with_rotation(self.rotation())?;
        Ok(vec![volume])
    }
}
