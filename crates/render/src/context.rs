//! Device resources owned by the renderer.
//!
//! [`RenderContext::initialize`] walks the setup state machine
//! (`Uninitialized -> PlatformSelected -> DeviceBound -> ProgramBuilt ->
//! BuffersBound -> Ready`). Any failure moves to `Failed`, releases what was
//! acquired so far and is returned as a fatal [`InitError`].

use crate::config::RenderConfig;
use crate::error::{InitError, InitStage};
use crate::gpu_types::{CameraGpu, VolumeCount, VolumeGpu};
use crate::kernel::HostRaymarcher;
use compute::layout::{
    RENDER_ENTRY, RENDER_ENTRY_ARGS, SLOT_CAMERA, SLOT_OUTPUT, SLOT_VOLUMES, SLOT_VOLUME_COUNT,
};
use compute::{
    platforms, BufferAccess, BufferId, ComputeBackend, ComputeError, KernelId, ProgramId,
    ProgramSource,
};
use std::mem::size_of;
use std::sync::Arc;

const KERNEL_EXTENSION: &str = "wgsl";

/// Largest `volume_capacity` accepted at setup.
pub const MAX_VOLUME_CAPACITY: usize = 1 << 20;

/// Byte size of a volume array holding `capacity` records.
fn volume_bytes(capacity: usize) -> Result<usize, ComputeError> {
    capacity
        .checked_mul(size_of::<VolumeGpu>())
        .ok_or_else(|| ComputeError::Allocation {
            size: usize::MAX,
            reason: format!("{capacity} volumes overflow the address space"),
        })
}

/// Reusable volume array and count buffers.
///
/// The array grows to at least double its capacity when a frame needs more
/// room and never shrinks, so a stable volume count never reallocates.
#[derive(Debug)]
pub(crate) struct VolumePool {
    pub(crate) volumes: BufferId,
    pub(crate) count: BufferId,
    capacity: usize,
}

impl VolumePool {
    fn allocate(backend: &dyn ComputeBackend, capacity: usize) -> Result<Self, ComputeError> {
        let capacity = capacity.max(1);
        let volumes =
            backend.create_buffer("volumes", volume_bytes(capacity)?, BufferAccess::ReadOnly)?;
        let count = match backend.create_buffer(
            "volume count",
            size_of::<VolumeCount>(),
            BufferAccess::ReadOnly,
        ) {
            Ok(count) => count,
            Err(err) => {
                let _ = backend.release_buffer(volumes);
                return Err(err);
            }
        };
        Ok(Self {
            volumes,
            count,
            capacity,
        })
    }

    /// Makes room for `needed` volumes. Returns `true` when the array buffer
    /// was replaced.
    pub(crate) fn reserve(
        &mut self,
        backend: &dyn ComputeBackend,
        needed: usize,
    ) -> Result<bool, ComputeError> {
        if needed <= self.capacity {
            return Ok(false);
        }
        let capacity = needed.max(self.capacity.saturating_mul(2));
        let fresh =
            backend.create_buffer("volumes", volume_bytes(capacity)?, BufferAccess::ReadOnly)?;
        if let Err(err) = backend.release_buffer(self.volumes) {
            tracing::warn!(error = %err, "failed to release outgrown volume buffer");
        }
        tracing::debug!(from = self.capacity, to = capacity, "volume buffer grown");
        self.volumes = fresh;
        self.capacity = capacity;
        Ok(true)
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Handles acquired during setup, released in reverse on failure.
enum Handle {
    Buffer(BufferId),
    Kernel(KernelId),
    Program(ProgramId),
}

fn release(backend: &dyn ComputeBackend, handles: Vec<Handle>) {
    for handle in handles.into_iter().rev() {
        let result = match handle {
            Handle::Buffer(id) => backend.release_buffer(id),
            Handle::Kernel(id) => backend.release_kernel(id),
            Handle::Program(id) => backend.release_program(id),
        };
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to release device handle");
        }
    }
}

fn validate(config: &RenderConfig) -> Result<(), InitError> {
    let (width, height) = config.resolution;
    if width == 0 || height == 0 {
        return Err(InitError::InvalidConfig(format!(
            "resolution {width}x{height} has no pixels"
        )));
    }
    if config.volume_capacity > MAX_VOLUME_CAPACITY {
        return Err(InitError::InvalidConfig(format!(
            "volume capacity {} exceeds {MAX_VOLUME_CAPACITY}",
            config.volume_capacity
        )));
    }
    Ok(())
}

fn advance(stage: &mut InitStage, next: InitStage) {
    tracing::debug!(from = ?*stage, to = ?next, "render context stage");
    *stage = next;
}

/// Program source for the render entry: the kernel directory for device
/// backends plus the host raymarcher for the CPU backend.
fn program_source(config: &RenderConfig) -> Result<ProgramSource, ComputeError> {
    Ok(ProgramSource::from_dir(&config.kernel_dir, KERNEL_EXTENSION)?
        .with_host_kernel(RENDER_ENTRY, Arc::new(HostRaymarcher)))
}

/// Builds the program and resolves the render entry point.
fn build_kernel(
    backend: &dyn ComputeBackend,
    config: &RenderConfig,
) -> Result<(ProgramId, KernelId), ComputeError> {
    let source = program_source(config)?;
    let program = backend.build_program(&source)?;
    match backend.create_kernel(program, RENDER_ENTRY, RENDER_ENTRY_ARGS) {
        Ok(kernel) => Ok((program, kernel)),
        Err(err) => {
            let _ = backend.release_program(program);
            Err(err)
        }
    }
}

/// Owned compute context: device, kernel and persistent buffers.
pub struct RenderContext {
    config: RenderConfig,
    backend: Arc<dyn ComputeBackend>,
    device_name: String,
    program: ProgramId,
    kernel: KernelId,
    camera: BufferId,
    output: BufferId,
    pub(crate) pool: VolumePool,
    stage: InitStage,
    released: bool,
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("device", &self.device_name)
            .field("resolution", &self.config.resolution)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

impl RenderContext {
    /// Selects a device, builds the kernel and allocates the persistent
    /// buffers.
    ///
    /// # Errors
    ///
    /// Every failure is fatal: an invalid configuration, no device, or any
    /// backend error during setup (reported with the last stage reached).
    pub fn initialize(config: RenderConfig) -> Result<Self, InitError> {
        validate(&config)?;

        let mut stage = InitStage::Uninitialized;
        let mut device = None;
        for platform in platforms(config.backend) {
            if let Some(first) = platform.devices.into_iter().next() {
                tracing::debug!(platform = %platform.name, device = %first.name(), "platform selected");
                device = Some(first);
                break;
            }
            tracing::warn!(platform = %platform.name, "platform exposes no devices");
        }
        let Some(device) = device else {
            advance(&mut stage, InitStage::Failed);
            return Err(InitError::NoDevice);
        };
        advance(&mut stage, InitStage::PlatformSelected);

        match device.open() {
            Ok(backend) => Self::bind(config, backend),
            Err(source) => {
                let reached = stage;
                advance(&mut stage, InitStage::Failed);
                tracing::error!(stage = %reached, error = %source, "device context creation failed");
                Err(InitError::Backend {
                    stage: reached,
                    source,
                })
            }
        }
    }

    /// Like [`initialize`](Self::initialize), on an already opened backend
    /// instead of the first enumerated device.
    ///
    /// # Errors
    ///
    /// An invalid configuration, or any backend error while building the
    /// kernel and allocating the persistent buffers.
    pub fn initialize_on(
        config: RenderConfig,
        backend: Arc<dyn ComputeBackend>,
    ) -> Result<Self, InitError> {
        validate(&config)?;
        Self::bind(config, backend)
    }

    fn bind(config: RenderConfig, backend: Arc<dyn ComputeBackend>) -> Result<Self, InitError> {
        let device_name = backend.device_name();
        tracing::info!(device = %device_name, "running on {device_name}");
        let mut stage = InitStage::DeviceBound;

        let mut acquired = Vec::new();
        match Self::acquire(backend.as_ref(), &config, &mut stage, &mut acquired) {
            Ok((program, kernel, camera, output, pool)) => {
                advance(&mut stage, InitStage::Ready);
                Ok(Self {
                    config,
                    backend,
                    device_name,
                    program,
                    kernel,
                    camera,
                    output,
                    pool,
                    stage,
                    released: false,
                })
            }
            Err(source) => {
                let reached = stage;
                advance(&mut stage, InitStage::Failed);
                tracing::error!(stage = %reached, error = %source, "render context initialization failed");
                release(backend.as_ref(), acquired);
                Err(InitError::Backend {
                    stage: reached,
                    source,
                })
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn acquire(
        backend: &dyn ComputeBackend,
        config: &RenderConfig,
        stage: &mut InitStage,
        acquired: &mut Vec<Handle>,
    ) -> Result<(ProgramId, KernelId, BufferId, BufferId, VolumePool), ComputeError> {
        let (program, kernel) = build_kernel(backend, config)?;
        acquired.push(Handle::Program(program));
        acquired.push(Handle::Kernel(kernel));
        advance(stage, InitStage::ProgramBuilt);

        let camera =
            backend.create_buffer("camera", size_of::<CameraGpu>(), BufferAccess::ReadOnly)?;
        acquired.push(Handle::Buffer(camera));
        let output = backend.create_buffer("pixels", config.output_size(), BufferAccess::WriteOnly)?;
        acquired.push(Handle::Buffer(output));
        let pool = VolumePool::allocate(backend, config.volume_capacity)?;
        acquired.push(Handle::Buffer(pool.volumes));
        acquired.push(Handle::Buffer(pool.count));

        backend.set_kernel_arg(kernel, SLOT_CAMERA, camera)?;
        backend.set_kernel_arg(kernel, SLOT_OUTPUT, output)?;
        advance(stage, InitStage::BuffersBound);
        Ok((program, kernel, camera, output, pool))
    }

    /// Rebuilds the kernel from the kernel directory and swaps it in.
    ///
    /// On failure the current kernel stays active.
    ///
    /// # Errors
    ///
    /// The build or binding error; nothing has changed when it is returned.
    pub fn reload_program(&mut self) -> Result<(), ComputeError> {
        let backend = self.backend.as_ref();
        let (program, kernel) = build_kernel(backend, &self.config)?;
        let bind = || -> Result<(), ComputeError> {
            backend.set_kernel_arg(kernel, SLOT_CAMERA, self.camera)?;
            backend.set_kernel_arg(kernel, SLOT_VOLUMES, self.pool.volumes)?;
            backend.set_kernel_arg(kernel, SLOT_VOLUME_COUNT, self.pool.count)?;
            backend.set_kernel_arg(kernel, SLOT_OUTPUT, self.output)
        };
        if let Err(err) = bind() {
            release(backend, vec![Handle::Program(program), Handle::Kernel(kernel)]);
            return Err(err);
        }
        release(
            backend,
            vec![Handle::Program(self.program), Handle::Kernel(self.kernel)],
        );
        self.program = program;
        self.kernel = kernel;
        tracing::info!(dir = ?self.config.kernel_dir, "kernel program reloaded");
        Ok(())
    }

    /// Releases every device resource. Dropping the context does the same.
    pub fn shutdown(mut self) {
        self.release_all();
    }

    fn release_all(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        release(
            self.backend.as_ref(),
            vec![
                Handle::Program(self.program),
                Handle::Kernel(self.kernel),
                Handle::Buffer(self.camera),
                Handle::Buffer(self.output),
                Handle::Buffer(self.pool.volumes),
                Handle::Buffer(self.pool.count),
            ],
        );
        self.stage = InitStage::Uninitialized;
        tracing::debug!(device = %self.device_name, "render context released");
    }

    #[must_use]
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    #[must_use]
    pub fn resolution(&self) -> (u32, u32) {
        self.config.resolution
    }

    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    #[must_use]
    pub fn stage(&self) -> InitStage {
        self.stage
    }

    /// Volumes the per-frame buffer holds without growing.
    #[must_use]
    pub fn volume_capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub(crate) fn backend(&self) -> Arc<dyn ComputeBackend> {
        Arc::clone(&self.backend)
    }

    pub(crate) fn kernel(&self) -> KernelId {
        self.kernel
    }

    pub(crate) fn camera_buffer(&self) -> BufferId {
        self.camera
    }

    pub(crate) fn output_buffer(&self) -> BufferId {
        self.output
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        self.release_all();
    }
}
