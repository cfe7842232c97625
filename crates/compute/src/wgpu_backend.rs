//! GPU implementation of [`ComputeBackend`] built on [`wgpu`].
//!
//! Programs are WGSL: every unit of the [`ProgramSource`] is concatenated
//! into one shader module. Kernels use the pipeline's derived bind group 0,
//! with argument slot `n` at `@binding(n)`; every buffer is a storage buffer.
//! Transfers must be 4-byte aligned.

use crate::layout::{workgroup_count, WORKGROUP_SIZE};
use crate::{
    check_range, BufferAccess, BufferId, ComputeBackend, ComputeError, KernelId, ProgramId,
    ProgramSource,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const ALIGN: usize = wgpu::COPY_BUFFER_ALIGNMENT as usize;

struct GpuBuffer {
    buffer: wgpu::Buffer,
    size: usize,
}

struct GpuKernel {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    args: Vec<Option<BufferId>>,
    bind_group: Option<wgpu::BindGroup>,
}

pub struct WgpuBackend {
    _instance: Arc<wgpu::Instance>,
    info: wgpu::AdapterInfo,
    device: wgpu::Device,
    queue: wgpu::Queue,
    next_id: AtomicU64,
    buffers: Mutex<HashMap<BufferId, GpuBuffer>>,
    programs: Mutex<HashMap<ProgramId, wgpu::ShaderModule>>,
    kernels: Mutex<HashMap<KernelId, GpuKernel>>,
}

impl WgpuBackend {
    /// Opens the default high-performance adapter.
    ///
    /// # Errors
    ///
    /// [`ComputeError::DeviceUnavailable`] when no adapter is found, or
    /// [`ComputeError::QueueCreation`] when the device request fails.
    pub fn new() -> Result<Self, ComputeError> {
        let instance = Arc::new(wgpu::Instance::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or_else(|| ComputeError::DeviceUnavailable("no wgpu adapter found".into()))?;
        Self::from_adapter(instance, adapter)
    }

    /// # Errors
    ///
    /// [`ComputeError::QueueCreation`] when the device request fails.
    pub fn from_adapter(
        instance: Arc<wgpu::Instance>,
        adapter: wgpu::Adapter,
    ) -> Result<Self, ComputeError> {
        let info = adapter.get_info();
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("raymarch device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
            },
            None,
        ))
        .map_err(|err| ComputeError::QueueCreation(format!("{}: {err}", info.name)))?;

        tracing::info!(adapter = %info.name, backend = ?info.backend, "wgpu device opened");
        Ok(Self {
            _instance: instance,
            info,
            device,
            queue,
            next_id: AtomicU64::new(0),
            buffers: Mutex::new(HashMap::new()),
            programs: Mutex::new(HashMap::new()),
            kernels: Mutex::new(HashMap::new()),
        })
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Runs `f` inside validation and out-of-memory error scopes.
    fn scoped<T>(&self, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        (value, validation.or(oom))
    }

    fn wait(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }
}

fn aligned(offset: usize, len: usize) -> Result<(), ComputeError> {
    if offset % ALIGN != 0 || len % ALIGN != 0 {
        return Err(ComputeError::ShapeMismatch(
            "wgpu transfers must be 4-byte aligned",
        ));
    }
    Ok(())
}

impl ComputeBackend for WgpuBackend {
    fn device_name(&self) -> String {
        format!("{} ({:?})", self.info.name, self.info.backend)
    }

    fn create_buffer(
        &self,
        label: &str,
        size: usize,
        access: BufferAccess,
    ) -> Result<BufferId, ComputeError> {
        if size == 0 {
            return Err(ComputeError::Allocation {
                size,
                reason: "zero-sized buffer".into(),
            });
        }
        let padded = size.div_ceil(ALIGN) * ALIGN;
        let (buffer, error) = self.scoped(|| {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: padded as u64,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        });
        if let Some(err) = error {
            return Err(ComputeError::Allocation {
                size,
                reason: err.to_string(),
            });
        }
        let id = BufferId(self.next());
        self.buffers.lock().insert(id, GpuBuffer { buffer, size });
        tracing::trace!(?id, label, size, ?access, "wgpu buffer created");
        Ok(id)
    }

    fn buffer_size(&self, buffer: BufferId) -> Result<usize, ComputeError> {
        self.buffers
            .lock()
            .get(&buffer)
            .map(|b| b.size)
            .ok_or(ComputeError::UnknownBuffer(buffer))
    }

    fn release_buffer(&self, buffer: BufferId) -> Result<(), ComputeError> {
        let mut kernels = self.kernels.lock();
        let released = self
            .buffers
            .lock()
            .remove(&buffer)
            .ok_or(ComputeError::UnknownBuffer(buffer))?;
        for kernel in kernels.values_mut() {
            for slot in &mut kernel.args {
                if *slot == Some(buffer) {
                    *slot = None;
                    kernel.bind_group = None;
                }
            }
        }
        released.buffer.destroy();
        Ok(())
    }

    fn build_program(&self, source: &ProgramSource) -> Result<ProgramId, ComputeError> {
        if source.units().is_empty() {
            return Err(ComputeError::ProgramBuild("no kernel source units".into()));
        }
        let text = source.concatenated();
        let (module, error) = self.scoped(|| {
            self.device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("raymarch program"),
                    source: wgpu::ShaderSource::Wgsl(text.into()),
                })
        });
        if let Some(err) = error {
            return Err(ComputeError::ProgramBuild(err.to_string()));
        }
        let id = ProgramId(self.next());
        self.programs.lock().insert(id, module);
        Ok(id)
    }

    fn create_kernel(
        &self,
        program: ProgramId,
        entry_point: &str,
        arg_count: u32,
    ) -> Result<KernelId, ComputeError> {
        let programs = self.programs.lock();
        let module = programs
            .get(&program)
            .ok_or(ComputeError::UnknownProgram(program))?;
        let (pipeline, error) = self.scoped(|| {
            self.device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(entry_point),
                    layout: None,
                    module,
                    entry_point,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                })
        });
        if let Some(err) = error {
            return Err(ComputeError::EntryPoint {
                name: entry_point.to_owned(),
                reason: err.to_string(),
            });
        }
        let layout = pipeline.get_bind_group_layout(0);
        let id = KernelId(self.next());
        self.kernels.lock().insert(
            id,
            GpuKernel {
                pipeline,
                layout,
                args: vec![None; arg_count as usize],
                bind_group: None,
            },
        );
        Ok(id)
    }

    fn release_kernel(&self, kernel: KernelId) -> Result<(), ComputeError> {
        self.kernels
            .lock()
            .remove(&kernel)
            .map(|_| ())
            .ok_or(ComputeError::UnknownKernel(kernel))
    }

    fn release_program(&self, program: ProgramId) -> Result<(), ComputeError> {
        self.programs
            .lock()
            .remove(&program)
            .map(|_| ())
            .ok_or(ComputeError::UnknownProgram(program))
    }

    fn set_kernel_arg(
        &self,
        kernel: KernelId,
        slot: u32,
        buffer: BufferId,
    ) -> Result<(), ComputeError> {
        let mut kernels = self.kernels.lock();
        let bound = kernels
            .get_mut(&kernel)
            .ok_or(ComputeError::UnknownKernel(kernel))?;
        if !self.buffers.lock().contains_key(&buffer) {
            return Err(ComputeError::UnknownBuffer(buffer));
        }
        let count = u32::try_from(bound.args.len()).unwrap_or(u32::MAX);
        let arg = bound
            .args
            .get_mut(slot as usize)
            .ok_or(ComputeError::SlotOutOfRange { slot, count })?;
        if *arg != Some(buffer) {
            *arg = Some(buffer);
            bound.bind_group = None;
        }
        Ok(())
    }

    fn write_buffer(
        &self,
        buffer: BufferId,
        offset: usize,
        data: &[u8],
    ) -> Result<(), ComputeError> {
        aligned(offset, data.len())?;
        let buffers = self.buffers.lock();
        let target = buffers
            .get(&buffer)
            .ok_or(ComputeError::UnknownBuffer(buffer))?;
        check_range(offset, data.len(), target.size)?;
        let ((), error) = self.scoped(|| {
            self.queue.write_buffer(&target.buffer, offset as u64, data);
            self.queue.submit(std::iter::empty());
        });
        drop(buffers);
        self.wait();
        match error {
            Some(err) => Err(ComputeError::Transfer(err.to_string())),
            None => Ok(()),
        }
    }

    fn enqueue_kernel(&self, kernel: KernelId, global_work_size: usize) -> Result<(), ComputeError> {
        let mut kernels = self.kernels.lock();
        let bound = kernels
            .get_mut(&kernel)
            .ok_or(ComputeError::UnknownKernel(kernel))?;

        if bound.bind_group.is_none() {
            let buffers = self.buffers.lock();
            let mut entries = Vec::with_capacity(bound.args.len());
            for (slot, arg) in bound.args.iter().enumerate() {
                let binding = u32::try_from(slot).unwrap_or(u32::MAX);
                let id = arg.ok_or(ComputeError::UnboundArgument(binding))?;
                let buffer = buffers.get(&id).ok_or(ComputeError::UnknownBuffer(id))?;
                entries.push(wgpu::BindGroupEntry {
                    binding,
                    resource: buffer.buffer.as_entire_binding(),
                });
            }
            let (group, error) = self.scoped(|| {
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("kernel arguments"),
                    layout: &bound.layout,
                    entries: &entries,
                })
            });
            if let Some(err) = error {
                return Err(ComputeError::Execution(err.to_string()));
            }
            bound.bind_group = Some(group);
        }

        let groups = u32::try_from(workgroup_count(global_work_size))
            .map_err(|_| ComputeError::Execution("global work size too large".into()))?;
        if groups == 0 {
            return Ok(());
        }
        let max = self.device.limits().max_compute_workgroups_per_dimension.max(1);
        let x = groups.min(max);
        let y = groups.div_ceil(x);
        if y > max {
            return Err(ComputeError::Execution(format!(
                "{global_work_size} invocations exceed {max}x{max} workgroups of {WORKGROUP_SIZE}"
            )));
        }

        let Some(bind_group) = bound.bind_group.as_ref() else {
            return Err(ComputeError::Execution("kernel arguments are not bound".into()));
        };
        let ((), error) = self.scoped(|| {
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("kernel dispatch"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&bound.pipeline);
                pass.set_bind_group(0, bind_group, &[]);
                pass.dispatch_workgroups(x, y, 1);
            }
            self.queue.submit(Some(encoder.finish()));
        });
        match error {
            Some(err) => Err(ComputeError::Execution(err.to_string())),
            None => Ok(()),
        }
    }

    fn finish(&self) -> Result<(), ComputeError> {
        self.wait();
        Ok(())
    }

    fn read_buffer(
        &self,
        buffer: BufferId,
        offset: usize,
        out: &mut [u8],
    ) -> Result<(), ComputeError> {
        aligned(offset, 0)?;
        if out.is_empty() {
            return Ok(());
        }
        let buffers = self.buffers.lock();
        let source = buffers
            .get(&buffer)
            .ok_or(ComputeError::UnknownBuffer(buffer))?;
        check_range(offset, out.len(), source.size)?;
        let copy_len = (out.len().div_ceil(ALIGN) * ALIGN) as u64;

        let (staging, error) = self.scoped(|| {
            let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("readback staging"),
                size: copy_len,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
            encoder.copy_buffer_to_buffer(&source.buffer, offset as u64, &staging, 0, copy_len);
            self.queue.submit(Some(encoder.finish()));
            staging
        });
        drop(buffers);
        if let Some(err) = error {
            return Err(ComputeError::Readback(err.to_string()));
        }

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.wait();
        rx.recv()
            .map_err(|err| ComputeError::Readback(err.to_string()))?
            .map_err(|err| ComputeError::Readback(err.to_string()))?;
        {
            let mapped = slice.get_mapped_range();
            out.copy_from_slice(&mapped[..out.len()]);
        }
        staging.unmap();
        Ok(())
    }
}
