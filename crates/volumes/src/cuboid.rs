use crate::{Sdf, Vec3};

/// Axis-aligned box.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoxVolume {
    pub center: Vec3,
    pub half_extents: Vec3,
}

impl BoxVolume {
    #[must_use]
    pub const fn new(center: Vec3, half_extents: Vec3) -> Self {
        Self { center, half_extents }
    }

    /// `scale` is the full edge length on each axis.
    #[must_use]
    pub fn from_scale(position: Vec3, scale: Vec3) -> Self {
        Self::new(position, scale * 0.5)
    }

    /// Per-axis distance from the box faces, clamped to zero inside the slab.
    fn exterior_gap(&self, point: Vec3) -> Vec3 {
        ((point - self.center).abs() - self.half_extents).max(Vec3::ZERO)
    }
}

impl Sdf for BoxVolume {
    /// Squared distance to the nearest face along each clipped axis.
    ///
    /// Returns exactly `0` for every point inside the box; there is no interior
    /// distance information. Use [`Sdf::signed_distance`] when a true SDF is needed.
    fn distance(&self, point: Vec3) -> f32 {
        self.exterior_gap(point).length_squared()
    }

    fn signed_distance(&self, point: Vec3) -> f32 {
        let q = (point - self.center).abs() - self.half_extents;
        q.max(Vec3::ZERO).length() + q.max_element().min(0.0)
    }

    /// Face normal picked by a fixed priority of bound tests:
    /// `+y`, `-y`, `-x`, `+z`, `-z`, falling back to `+x`.
    fn normal(&self, point: Vec3) -> Vec3 {
        let rel = point - self.center;
        let h = self.half_extents;

        if rel.y > h.y {
            Vec3::Y
        } else if rel.y < -h.y {
            Vec3::NEG_Y
        } else if rel.x < -h.x {
            Vec3::NEG_X
        } else if rel.z > h.z {
            Vec3::Z
        } else if rel.z < -h.z {
            Vec3::NEG_Z
        } else {
            Vec3::X
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_signed_distance_at_center() {
        let b = BoxVolume::from_scale(Vec3::ZERO, Vec3::splat(2.0));
        assert!((b.signed_distance(Vec3::ZERO) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn corner_gap_sums_squares() {
        let b = BoxVolume::from_scale(Vec3::ZERO, Vec3::ONE);
        let p = Vec3::new(1.5, 1.5, 0.0);
        assert!((b.distance(p) - 2.0).abs() < 1e-6);
        assert!((b.signed_distance(p) - 2.0_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn positive_x_is_the_fallback() {
        let b = BoxVolume::from_scale(Vec3::ZERO, Vec3::ONE);
        assert_eq!(b.normal(Vec3::new(3.0, 0.0, 0.0)), Vec3::X);
        assert_eq!(b.normal(Vec3::ZERO), Vec3::X);
    }
}
