//! Signed distance primitives used by the raymarcher.
//!
//! Every primitive implements [`Sdf`]. Two distance notions coexist:
//!
//! - [`Sdf::distance`] keeps each shape's historical contract. For spheres it
//!   is the linear signed distance. For boxes it is the *squared* exterior
//!   distance and is exactly `0` anywhere inside the box.
//! - [`Sdf::signed_distance`] is the common contract: a true signed distance,
//!   negative inside, zero on the surface, positive outside. Code that needs
//!   polymorphic substitutability (marching, culling by distance) uses this one.
//!
//! Shapes ignore [`Volume::rotation`]. Callers that want orientation use
//! [`Volume::oriented_signed_distance`] and [`Volume::oriented_normal`], which
//! evaluate the shape in the volume's local frame.

pub mod error;
mod cuboid;
mod sphere;
mod volume;

pub use cuboid::BoxVolume;
pub use error::VolumeError;
pub use glam::{Quat, Vec3};
pub use sphere::Sphere;
pub use volume::{Shape, Volume, VolumeKind};

/// Distance and normal queries shared by all primitives.
pub trait Sdf {
    /// Shape-specific distance to the surface. See the crate docs for how this
    /// differs between shapes.
    fn distance(&self, point: Vec3) -> f32;

    /// True signed distance: negative inside, zero on the surface, positive outside.
    fn signed_distance(&self, point: Vec3) -> f32;

    /// Outward unit normal at (or near) `point`.
    fn normal(&self, point: Vec3) -> Vec3;
}
