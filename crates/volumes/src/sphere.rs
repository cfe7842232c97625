use crate::{Sdf, Vec3};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    #[must_use]
    pub const fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Builds a sphere from a volume transform. Only `scale.z` is used: the
    /// diameter of the sphere.
    #[must_use]
    pub fn from_scale(position: Vec3, scale: Vec3) -> Self {
        Self::new(position, scale.z * 0.5)
    }

    /// `|p - center|^2 - radius^2`.
    ///
    /// Cheap proxy for ordering and culling. It has the same sign as
    /// [`Sdf::distance`] but is not its square.
    #[must_use]
    pub fn distance_squared(&self, point: Vec3) -> f32 {
        point.distance_squared(self.center) - self.radius * self.radius
    }
}

impl Sdf for Sphere {
    fn distance(&self, point: Vec3) -> f32 {
        point.distance(self.center) - self.radius
    }

    fn signed_distance(&self, point: Vec3) -> f32 {
        self.distance(point)
    }

    /// Zero vector at the exact center, where no direction is defined.
    fn normal(&self, point: Vec3) -> Vec3 {
        (point - self.center).normalize_or_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_is_half_of_scale_z() {
        let s = Sphere::from_scale(Vec3::ZERO, Vec3::new(7.0, 3.0, 2.0));
        assert!((s.radius - 1.0).abs() < 1e-6);
    }

    #[test]
    fn squared_proxy_is_not_square_of_distance() {
        let s = Sphere::new(Vec3::ZERO, 1.0);
        let p = Vec3::new(3.0, 0.0, 0.0);
        // distance = 2, distance^2 = 4, proxy = 9 - 1 = 8
        assert!((s.distance(p) - 2.0).abs() < 1e-6);
        assert!((s.distance_squared(p) - 8.0).abs() < 1e-6);
    }

    #[test]
    fn normal_at_center_is_zero() {
        let s = Sphere::new(Vec3::ONE, 1.0);
        assert_eq!(s.normal(Vec3::ONE), Vec3::ZERO);
    }
}
