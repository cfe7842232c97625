//! Host implementation of the `rm_render_entry` kernel.
//!
//! Same algorithm as `kernels/render.wgsl`: one pinhole ray per pixel, a
//! procedural sky, sphere tracing against the closest volume and Lambert
//! shading of hits. Output pixels are BGRA.

use crate::gpu_types::{CameraGpu, VolumeCount, VolumeGpu};
use compute::layout::{SLOT_CAMERA, SLOT_OUTPUT, SLOT_VOLUMES, SLOT_VOLUME_COUNT};
use compute::{ComputeError, HostKernel, KernelArgs};
use glam::{Vec3, Vec4};
use rayon::prelude::*;
use std::mem::size_of;
use volumes::Volume;

/// Upper bound on march iterations per ray.
pub const MAX_STEPS: u32 = 256;

/// Squared distance between a ray and the light direction inside which the
/// sun disc is drawn.
const SUN_DISC: f32 = 0.0025;

const HORIZON_DAY: Vec4 = Vec4::new(0.82, 0.92, 0.98, 1.0);
const HORIZON_SUNSET: Vec4 = Vec4::new(1.0, 0.48, 0.0, 1.0);
const NIGHT: Vec4 = Vec4::new(0.0, 0.0, 0.0, 1.0);
const HIGH_ATMOSPHERE: Vec4 = Vec4::new(0.23, 0.41, 0.70, 1.0);
const GROUND_ATMOSPHERE: Vec4 = Vec4::new(0.58, 0.53, 0.45, 1.0);
const SUN_DAY: Vec4 = Vec4::ONE;
const SUN_SET: Vec4 = Vec4::new(1.0, 0.33, 0.0, 1.0);

#[derive(Debug, Default, Clone, Copy)]
pub struct HostRaymarcher;

impl HostKernel for HostRaymarcher {
    fn execute(&self, args: &mut KernelArgs<'_>, global_work_size: usize) -> Result<(), ComputeError> {
        let camera: CameraGpu = args
            .input(SLOT_CAMERA)?
            .get(..size_of::<CameraGpu>())
            .map(bytemuck::pod_read_unaligned)
            .ok_or(ComputeError::ShapeMismatch("camera record truncated"))?;
        let count: VolumeCount = args
            .input(SLOT_VOLUME_COUNT)?
            .get(..size_of::<VolumeCount>())
            .map(bytemuck::pod_read_unaligned)
            .ok_or(ComputeError::ShapeMismatch("volume count truncated"))?;
        let volumes = args
            .input(SLOT_VOLUMES)?
            .chunks_exact(size_of::<VolumeGpu>())
            .take(count as usize)
            .map(|record| {
                let record: VolumeGpu = bytemuck::pod_read_unaligned(record);
                Volume::try_from(&record)
                    .map_err(|_| ComputeError::ShapeMismatch("invalid volume record"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let width = camera.width() as usize;
        if width == 0 || camera.height() == 0 {
            return Err(ComputeError::ShapeMismatch("camera resolution is zero"));
        }
        let output = args.output(SLOT_OUTPUT)?;
        let pixels = global_work_size.min(output.len() / 4);
        output[..pixels * 4]
            .par_chunks_exact_mut(4)
            .enumerate()
            .for_each(|(i, pixel)| {
                let (x, y) = ((i % width) as u32, (i / width) as u32);
                pixel.copy_from_slice(&shade_pixel(&camera, &volumes, x, y));
            });
        Ok(())
    }
}

/// World-space direction of the primary ray through pixel `(x, y)`.
#[must_use]
pub fn ray_direction(camera: &CameraGpu, x: u32, y: u32) -> Vec3 {
    let width = camera.width() as f32;
    let height = camera.height() as f32;
    let aspect = width / height;
    let half_fov = (camera.fov * 0.5).to_radians().tan();
    let px = (2.0 * ((x as f32 + 0.5) / width) - 1.0) * half_fov * aspect;
    let py = (1.0 - 2.0 * ((y as f32 + 0.5) / height)) * half_fov;
    camera.rotation() * Vec3::new(px, py, 1.0).normalize()
}

/// Colour of a ray that hits nothing.
#[must_use]
pub fn background_colour(dir: Vec3, light: Vec3) -> Vec4 {
    if light == Vec3::ZERO {
        return NIGHT;
    }
    let altitude = light.y.abs();
    let (dense, high, ground) = if light.y < 0.0 {
        (HORIZON_SUNSET.lerp(NIGHT, altitude.sqrt()), NIGHT, NIGHT)
    } else {
        (
            HORIZON_SUNSET.lerp(HORIZON_DAY, altitude.sqrt()),
            NIGHT.lerp(HIGH_ATMOSPHERE, altitude.powf(0.6)),
            NIGHT.lerp(GROUND_ATMOSPHERE, altitude.powf(0.6)),
        )
    };
    let sky = if dir.y > 0.0 {
        dense.lerp(high, dir.y.powf(0.8))
    } else {
        dense.lerp(ground, dir.y.abs().powf(0.25))
    };

    if dir.distance_squared(light) < SUN_DISC && dir.y > 0.0 {
        if light.y < 0.0 {
            SUN_SET
        } else {
            SUN_SET.lerp(SUN_DAY, (altitude * 2.0).sqrt())
        }
    } else {
        sky
    }
}

/// BGRA bytes of pixel `(x, y)` when the scene is empty.
#[must_use]
pub fn background_pixel(camera: &CameraGpu, x: u32, y: u32) -> [u8; 4] {
    let light = camera.light_direction().normalize_or_zero();
    to_bgra(background_colour(ray_direction(camera, x, y), light))
}

/// Marches from the camera along `dir`. Returns the surface normal of the
/// first hit, sampled one `precision` back along the ray so that it is
/// taken outside the surface.
#[must_use]
pub fn march(camera: &CameraGpu, volumes: &[Volume], dir: Vec3) -> Option<Vec3> {
    if volumes.is_empty() {
        return None;
    }
    let mut probe = camera.position();
    let mut travelled = 0.0;
    for _ in 0..MAX_STEPS {
        if travelled >= camera.far_clip {
            break;
        }
        let (index, distance) = closest(volumes, probe);
        if distance < camera.precision {
            return Some(volumes[index].oriented_normal(probe - dir * camera.precision));
        }
        probe += dir * distance;
        travelled += distance;
    }
    None
}

fn closest(volumes: &[Volume], point: Vec3) -> (usize, f32) {
    let mut best = (0, f32::INFINITY);
    for (i, volume) in volumes.iter().enumerate() {
        let d = volume.oriented_signed_distance(point);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

/// BGRA bytes of pixel `(x, y)`.
#[must_use]
pub fn shade_pixel(camera: &CameraGpu, volumes: &[Volume], x: u32, y: u32) -> [u8; 4] {
    let dir = ray_direction(camera, x, y);
    let light = camera.light_direction().normalize_or_zero();
    let colour = match march(camera, volumes, dir) {
        Some(normal) => {
            let intensity = normal.dot(light).max(0.0);
            Vec4::new(intensity, intensity, intensity, 1.0)
        }
        None => background_colour(dir, light),
    };
    to_bgra(colour)
}

fn to_bgra(colour: Vec4) -> [u8; 4] {
    let c = (colour.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
    [c.z as u8, c.y as u8, c.x as u8, c.w as u8]
}
