use crate::{BoxVolume, Quat, Sdf, Sphere, Vec3, VolumeError};

/// Shape tag. The discriminant is the tag written into GPU volume records.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VolumeKind {
    Sphere = 0,
    Box = 1,
}

impl VolumeKind {
    #[must_use]
    pub const fn tag(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for VolumeKind {
    type Error = VolumeError;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Self::Sphere),
            1 => Ok(Self::Box),
            other => Err(VolumeError::UnknownKind(other)),
        }
    }
}

/// Concrete shape resolved from a [`Volume`]'s kind and transform.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Shape {
    Sphere(Sphere),
    Box(BoxVolume),
}

impl Sdf for Shape {
    fn distance(&self, point: Vec3) -> f32 {
        match self {
            Shape::Sphere(s) => s.distance(point),
            Shape::Box(b) => b.distance(point),
        }
    }

    fn signed_distance(&self, point: Vec3) -> f32 {
        match self {
            Shape::Sphere(s) => s.signed_distance(point),
            Shape::Box(b) => b.signed_distance(point),
        }
    }

    fn normal(&self, point: Vec3) -> Vec3 {
        match self {
            Shape::Sphere(s) => s.normal(point),
            Shape::Box(b) => b.normal(point),
        }
    }
}

/// A primitive instance: shape tag plus transform.
///
/// Volumes are per-frame snapshots. The constructor enforces non-negative,
/// finite scale and normalizes the rotation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Volume {
    kind: VolumeKind,
    position: Vec3,
    scale: Vec3,
    rotation: Quat,
}

impl Volume {
    /// # Errors
    ///
    /// Returns [`VolumeError`] when `scale` has a negative or non-finite
    /// component, `position` is not finite, or `rotation` cannot be normalized.
    pub fn new(
        kind: VolumeKind,
        position: Vec3,
        scale: Vec3,
        rotation: Quat,
    ) -> Result<Self, VolumeError> {
        if !position.is_finite() {
            return Err(VolumeError::NonFinitePosition);
        }
        for (axis, value) in [('x', scale.x), ('y', scale.y), ('z', scale.z)] {
            if !value.is_finite() {
                return Err(VolumeError::NonFiniteScale { axis });
            }
            if value < 0.0 {
                return Err(VolumeError::NegativeScale { axis, value });
            }
        }
        Ok(Self {
            kind,
            position,
            scale,
            rotation: normalized(rotation)?,
        })
    }

    /// Sphere of the given diameter.
    ///
    /// # Errors
    ///
    /// See [`Volume::new`].
    pub fn sphere(position: Vec3, diameter: f32) -> Result<Self, VolumeError> {
        Self::new(VolumeKind::Sphere, position, Vec3::splat(diameter), Quat::IDENTITY)
    }

    /// Box with full edge lengths `size`.
    ///
    /// # Errors
    ///
    /// See [`Volume::new`].
    pub fn cuboid(position: Vec3, size: Vec3) -> Result<Self, VolumeError> {
        Self::new(VolumeKind::Box, position, size, Quat::IDENTITY)
    }

    #[must_use]
    pub fn kind(&self) -> VolumeKind {
        self.kind
    }

    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[must_use]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    #[must_use]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// # Errors
    ///
    /// Returns [`VolumeError::InvalidRotation`] for a zero or non-finite quaternion.
    pub fn with_rotation(mut self, rotation: Quat) -> Result<Self, VolumeError> {
        self.rotation = normalized(rotation)?;
        Ok(self)
    }

    #[must_use]
    pub fn shape(&self) -> Shape {
        match self.kind {
            VolumeKind::Sphere => Shape::Sphere(Sphere::from_scale(self.position, self.scale)),
            VolumeKind::Box => Shape::Box(BoxVolume::from_scale(self.position, self.scale)),
        }
    }

    /// Maps a world-space point into the volume's unrotated frame, pivoting
    /// around `position`.
    #[must_use]
    pub fn local_point(&self, point: Vec3) -> Vec3 {
        self.rotation.inverse() * (point - self.position) + self.position
    }

    /// [`Sdf::signed_distance`] with `rotation` applied.
    #[must_use]
    pub fn oriented_signed_distance(&self, point: Vec3) -> f32 {
        self.shape().signed_distance(self.local_point(point))
    }

    /// [`Sdf::normal`] with `rotation` applied.
    #[must_use]
    pub fn oriented_normal(&self, point: Vec3) -> Vec3 {
        self.rotation * self.shape().normal(self.local_point(point))
    }
}

impl Sdf for Volume {
    fn distance(&self, point: Vec3) -> f32 {
        self.shape().distance(point)
    }

    fn signed_distance(&self, point: Vec3) -> f32 {
        self.shape().signed_distance(point)
    }

    fn normal(&self, point: Vec3) -> Vec3 {
        self.shape().normal(point)
    }
}

fn normalized(rotation: Quat) -> Result<Quat, VolumeError> {
    let len_sq = rotation.length_squared();
    if !rotation.is_finite() || len_sq <= f32::EPSILON {
        return Err(VolumeError::InvalidRotation);
    }
    Ok(rotation.normalize())
}
