//! Per-frame pipeline: snapshot, upload, dispatch, readback, assembly.

use crate::camera::Camera;
use crate::context::RenderContext;
use crate::error::{BakeStage, FrameError};
use crate::gpu_types::{CameraGpu, VolumeCount, VolumeGpu};
use crate::pixels::{self, ChannelOrder};
use crate::scene::SceneSource;
use compute::layout::{SLOT_VOLUMES, SLOT_VOLUME_COUNT};
use compute::ComputeError;
use image::RgbaImage;
use std::time::{Duration, Instant};
use volumes::Volume;

/// Result of one bake. A failed frame still carries an image, built from
/// whatever the readback buffer last held.
#[derive(Debug)]
pub struct BakedFrame {
    pub image: RgbaImage,
    pub failure: Option<FrameError>,
    /// Wall-clock time of the whole bake.
    pub elapsed: Duration,
}

impl BakedFrame {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }
}

/// Drives frames through a [`RenderContext`]. One bake at a time.
pub struct FrameBaker {
    context: RenderContext,
    scene: Box<dyn SceneSource + Send>,
    /// Host copy of the pixel output, `width * height * 4` BGRA bytes.
    readback: Vec<u8>,
    last_frame: Option<Instant>,
    last_render_time: Option<Duration>,
}

impl FrameBaker {
    #[must_use]
    pub fn new(context: RenderContext, scene: Box<dyn SceneSource + Send>) -> Self {
        let readback = vec![0; context.config().output_size()];
        Self {
            context,
            scene,
            readback,
            last_frame: None,
            last_render_time: None,
        }
    }

    /// Renders one frame, advancing the scene by the time since the
    /// previous call.
    pub fn bake(&mut self, camera: &Camera) -> BakedFrame {
        let now = Instant::now();
        let delta = self
            .last_frame
            .map_or(0.0, |previous| now.duration_since(previous).as_secs_f32());
        self.last_frame = Some(now);
        self.bake_frame(camera, delta)
    }

    /// Renders one frame with an explicit scene time step.
    pub fn bake_frame(&mut self, camera: &Camera, delta_seconds: f32) -> BakedFrame {
        let start = Instant::now();
        let (width, height) = self.context.resolution();
        let snapshot = CameraGpu::new(camera, (width, height));

        let mut failure = match self.scene.snapshot(delta_seconds) {
            Ok(volumes) => self.run_device(&snapshot, &volumes).err(),
            Err(err) => Some(FrameError::from(err)),
        };

        let image = match pixels::to_image(width, height, &self.readback, ChannelOrder::Bgra) {
            Ok(image) => image,
            Err(err) => {
                failure.get_or_insert(FrameError::from(err));
                RgbaImage::new(width, height)
            }
        };

        let elapsed = start.elapsed();
        match &failure {
            Some(err) => tracing::error!(stage = %err.stage(), error = %err, "frame bake failed"),
            None => tracing::debug!(
                elapsed_ms = elapsed.as_secs_f64() * 1e3,
                "camera image bake took {:.2}ms",
                elapsed.as_secs_f64() * 1e3
            ),
        }
        BakedFrame {
            image,
            failure,
            elapsed,
        }
    }

    /// Device steps of a bake. Stops at the first failure; the readback
    /// buffer then keeps its previous contents.
    fn run_device(&mut self, camera: &CameraGpu, volumes: &[Volume]) -> Result<(), FrameError> {
        let backend = self.context.backend();
        let backend = backend.as_ref();
        let kernel = self.context.kernel();

        let count = VolumeCount::try_from(volumes.len()).map_err(|_| FrameError::Device {
            stage: BakeStage::AllocateVolumes,
            source: ComputeError::ShapeMismatch("volume count exceeds u32"),
        })?;
        let records: Vec<VolumeGpu> = volumes.iter().map(VolumeGpu::from).collect();
        self.context
            .pool
            .reserve(backend, records.len())
            .map_err(FrameError::at(BakeStage::AllocateVolumes))?;
        let pool = &self.context.pool;

        backend
            .set_kernel_arg(kernel, SLOT_VOLUMES, pool.volumes)
            .and_then(|()| backend.set_kernel_arg(kernel, SLOT_VOLUME_COUNT, pool.count))
            .map_err(FrameError::at(BakeStage::BindArguments))?;

        let write = || -> Result<(), ComputeError> {
            backend.write_buffer(self.context.camera_buffer(), 0, bytemuck::bytes_of(camera))?;
            if !records.is_empty() {
                backend.write_buffer(pool.volumes, 0, bytemuck::cast_slice(&records))?;
            }
            backend.write_buffer(pool.count, 0, bytemuck::bytes_of(&count))
        };
        write().map_err(FrameError::at(BakeStage::WriteInputs))?;

        let render_start = Instant::now();
        backend
            .enqueue_kernel(kernel, self.context.config().pixel_count())
            .and_then(|()| backend.finish())
            .map_err(FrameError::at(BakeStage::Dispatch))?;
        backend
            .read_buffer(self.context.output_buffer(), 0, &mut self.readback)
            .map_err(FrameError::at(BakeStage::ReadOutput))?;
        self.last_render_time = Some(render_start.elapsed());
        Ok(())
    }

    /// Kernel plus readback time of the last successful frame.
    #[must_use]
    pub fn last_render_time(&self) -> Option<Duration> {
        self.last_render_time
    }

    #[must_use]
    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut RenderContext {
        &mut self.context
    }

    pub fn scene_mut(&mut self) -> &mut (dyn SceneSource + Send) {
        self.scene.as_mut()
    }

    /// Hands the context back, e.g. for an explicit
    /// [`RenderContext::shutdown`].
    #[must_use]
    pub fn into_context(self) -> RenderContext {
        self.context
    }
}
