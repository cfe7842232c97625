//! Wire records shared with the kernel.
//!
//! Layouts match the structs declared in `kernels/render.wgsl` under WGSL
//! storage-buffer rules. All types are `Pod` so they serialize with
//! `bytemuck` without copies.

use crate::camera::Camera;
use bytemuck::{Pod, Zeroable};
use volumes::{Quat, Vec3, Volume, VolumeError, VolumeKind};

/// Camera snapshot bound to slot 0.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraGpu {
    pub resolution: [u32; 2],
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub far_clip: f32,
    pub position: [f32; 4],
    /// Quaternion as `[x, y, z, w]`.
    pub rotation: [f32; 4],
    pub light_direction: [f32; 4],
    pub precision: f32,
    pub _pad: [f32; 3],
}

impl CameraGpu {
    #[must_use]
    pub fn new(camera: &Camera, (width, height): (u32, u32)) -> Self {
        Self {
            resolution: [width, height],
            fov: camera.fov_degrees,
            far_clip: camera.far_clip,
            position: camera.position.extend(1.0).to_array(),
            rotation: camera.rotation.to_array(),
            light_direction: camera.light_direction.extend(0.0).to_array(),
            precision: camera.precision,
            _pad: [0.0; 3],
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.resolution[0]
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.resolution[1]
    }

    #[must_use]
    pub fn position(&self) -> Vec3 {
        Vec3::from_slice(&self.position[..3])
    }

    #[must_use]
    pub fn rotation(&self) -> Quat {
        Quat::from_array(self.rotation)
    }

    #[must_use]
    pub fn light_direction(&self) -> Vec3 {
        Vec3::from_slice(&self.light_direction[..3])
    }
}

/// One entry of the volume array bound to slot 1.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct VolumeGpu {
    pub position: [f32; 4],
    pub scale: [f32; 4],
    /// Quaternion as `[x, y, z, w]`.
    pub rotation: [f32; 4],
    /// [`VolumeKind::tag`].
    pub kind: u32,
    pub _pad: [u32; 3],
}

impl From<&Volume> for VolumeGpu {
    fn from(volume: &Volume) -> Self {
        Self {
            position: volume.position().extend(1.0).to_array(),
            scale: volume.scale().extend(0.0).to_array(),
            rotation: volume.rotation().to_array(),
            kind: volume.kind().tag(),
            _pad: [0; 3],
        }
    }
}

impl TryFrom<&VolumeGpu> for Volume {
    type Error = VolumeError;

    fn try_from(record: &VolumeGpu) -> Result<Self, Self::Error> {
        Volume::new(
            VolumeKind::try_from(record.kind)?,
            Vec3::from_slice(&record.position[..3]),
            Vec3::from_slice(&record.scale[..3]),
            Quat::from_array(record.rotation),
        )
    }
}

/// Volume count bound to slot 2.
pub type VolumeCount = u32;

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn records_match_kernel_layout() {
        assert_eq!(size_of::<CameraGpu>(), 80);
        assert_eq!(size_of::<VolumeGpu>(), 64);
        assert_eq!(size_of::<VolumeCount>(), 4);
    }

    #[test]
    fn volume_survives_the_wire() {
        let volume = Volume::cuboid(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.5, 1.0, 2.0))
            .unwrap()
            .with_rotation(Quat::from_rotation_y(0.3))
            .unwrap();
        let bytes = bytemuck::bytes_of(&VolumeGpu::from(&volume)).to_vec();
        let record: VolumeGpu = bytemuck::pod_read_unaligned(&bytes);
        let decoded = Volume::try_from(&record).unwrap();
        assert_eq!(decoded.kind(), volume.kind());
        assert_eq!(decoded.position(), volume.position());
        assert_eq!(decoded.scale(), volume.scale());
        assert!(decoded.rotation().abs_diff_eq(volume.rotation(), 1e-6));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut record = VolumeGpu::from(&Volume::sphere(Vec3::ZERO, 1.0).unwrap());
        record.kind = 7;
        assert_eq!(Volume::try_from(&record), Err(VolumeError::UnknownKind(7)));
    }
}
