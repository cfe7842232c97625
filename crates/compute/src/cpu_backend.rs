use crate::backend::ArgSlot;
use crate::{
    check_range, BufferAccess, BufferId, ComputeBackend, ComputeError, HostKernel, KernelArgs,
    KernelId, ProgramId, ProgramSource,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct HostBuffer {
    label: String,
    data: Vec<u8>,
    access: BufferAccess,
}

struct HostProgram {
    kernels: BTreeMap<String, Arc<dyn HostKernel>>,
}

struct BoundKernel {
    program: ProgramId,
    entry_point: String,
    body: Arc<dyn HostKernel>,
    args: Vec<Option<BufferId>>,
}

/// Name the host device reports, e.g. `Host CPU (8 threads)`.
#[must_use]
pub fn host_device_name() -> String {
    let threads = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    format!("Host CPU ({threads} threads)")
}

/// Executes host kernels synchronously on the calling thread.
///
/// Kernels are looked up by entry point among the host implementations
/// registered on the [`ProgramSource`]; text units are ignored.
#[derive(Default)]
pub struct CpuBackend {
    next_id: AtomicU64,
    buffers: Mutex<HashMap<BufferId, HostBuffer>>,
    programs: Mutex<HashMap<ProgramId, HostProgram>>,
    kernels: Mutex<HashMap<KernelId, BoundKernel>>,
}

impl CpuBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Number of live buffers, programs and kernels.
    #[must_use]
    pub fn live_objects(&self) -> (usize, usize, usize) {
        (
            self.buffers.lock().len(),
            self.programs.lock().len(),
            self.kernels.lock().len(),
        )
    }
}

impl ComputeBackend for CpuBackend {
    fn device_name(&self) -> String {
        host_device_name()
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
        let id = BufferId(self.next());
        self.buffers.lock().insert(
            id,
            HostBuffer {
                label: label.to_owned(),
                data: vec![0; size],
                access,
            },
        );
        tracing::trace!(?id, label, size, "host buffer created");
        Ok(id)
    }

    fn buffer_size(&self, buffer: BufferId) -> Result<usize, ComputeError> {
        self.buffers
            .lock()
            .get(&buffer)
            .map(|b| b.data.len())
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
                }
            }
        }
        tracing::trace!(?buffer, label = %released.label, "host buffer released");
        Ok(())
    }

    fn build_program(&self, source: &ProgramSource) -> Result<ProgramId, ComputeError> {
        let kernels: BTreeMap<_, _> = source
            .host_entry_points()
            .filter_map(|name| source.host_kernel(name).map(|k| (name.to_owned(), Arc::clone(k))))
            .collect();
        if kernels.is_empty() {
            return Err(ComputeError::ProgramBuild(
                "program source registers no host kernels".into(),
            ));
        }
        let id = ProgramId(self.next());
        self.programs.lock().insert(id, HostProgram { kernels });
        Ok(id)
    }

    fn create_kernel(
        &self,
        program: ProgramId,
        entry_point: &str,
        arg_count: u32,
    ) -> Result<KernelId, ComputeError> {
        let body = {
            let programs = self.programs.lock();
            let built = programs
                .get(&program)
                .ok_or(ComputeError::UnknownProgram(program))?;
            built
                .kernels
                .get(entry_point)
                .cloned()
                .ok_or_else(|| ComputeError::EntryPoint {
                    name: entry_point.to_owned(),
                    reason: "no host implementation registered".into(),
                })?
        };
        let id = KernelId(self.next());
        self.kernels.lock().insert(
            id,
            BoundKernel {
                program,
                entry_point: entry_point.to_owned(),
                body,
                args: vec![None; arg_count as usize],
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
            .ok_or(ComputeError::UnknownProgram(program))?;
        let orphaned = self
            .kernels
            .lock()
            .values()
            .filter(|k| k.program == program)
            .count();
        if orphaned > 0 {
            tracing::debug!(?program, orphaned, "program released with live kernels");
        }
        Ok(())
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
        *arg = Some(buffer);
        Ok(())
    }

    fn write_buffer(
        &self,
        buffer: BufferId,
        offset: usize,
        data: &[u8],
    ) -> Result<(), ComputeError> {
        let mut buffers = self.buffers.lock();
        let target = buffers
            .get_mut(&buffer)
            .ok_or(ComputeError::UnknownBuffer(buffer))?;
        check_range(offset, data.len(), target.data.len())?;
        target.data[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn enqueue_kernel(&self, kernel: KernelId, global_work_size: usize) -> Result<(), ComputeError> {
        // Lock order: kernels, then buffers.
        let kernels = self.kernels.lock();
        let bound = kernels
            .get(&kernel)
            .ok_or(ComputeError::UnknownKernel(kernel))?;

        let mut ids = Vec::with_capacity(bound.args.len());
        for (slot, arg) in bound.args.iter().enumerate() {
            let slot = u32::try_from(slot).unwrap_or(u32::MAX);
            ids.push(arg.ok_or(ComputeError::UnboundArgument(slot))?);
        }

        let mut buffers = self.buffers.lock();
        let mut written = HashSet::new();
        for id in &ids {
            let buffer = buffers.get(id).ok_or(ComputeError::UnknownBuffer(*id))?;
            if buffer.access.kernel_writes() && !written.insert(*id) {
                return Err(ComputeError::Execution(format!(
                    "buffer {id:?} bound to more than one writable slot"
                )));
            }
        }

        // Writable buffers are moved out for the duration of the call so the
        // kernel can hold them mutably next to shared views of the inputs.
        let mut outputs: HashMap<BufferId, Vec<u8>> = written
            .iter()
            .filter_map(|id| buffers.get_mut(id).map(|b| (*id, std::mem::take(&mut b.data))))
            .collect();

        let result = {
            let mut out_views: HashMap<BufferId, &mut [u8]> = outputs
                .iter_mut()
                .map(|(id, data)| (*id, data.as_mut_slice()))
                .collect();
            let mut slots = Vec::with_capacity(ids.len());
            for id in &ids {
                match out_views.remove(id) {
                    Some(view) => slots.push(ArgSlot::Output(view)),
                    None => slots.push(ArgSlot::Input(buffers[id].data.as_slice())),
                }
            }
            let mut args = KernelArgs::new(slots);
            bound.body.execute(&mut args, global_work_size)
        };

        for (id, data) in outputs {
            if let Some(buffer) = buffers.get_mut(&id) {
                buffer.data = data;
            }
        }

        result.map_err(|err| {
            tracing::debug!(entry_point = %bound.entry_point, error = %err, "host kernel failed");
            err
        })
    }

    fn finish(&self) -> Result<(), ComputeError> {
        Ok(())
    }

    fn read_buffer(
        &self,
        buffer: BufferId,
        offset: usize,
        out: &mut [u8],
    ) -> Result<(), ComputeError> {
        let buffers = self.buffers.lock();
        let source = buffers
            .get(&buffer)
            .ok_or(ComputeError::UnknownBuffer(buffer))?;
        check_range(offset, out.len(), source.data.len())?;
        out.copy_from_slice(&source.data[offset..offset + out.len()]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// out[i] = in[i] * 2 for every byte up to the work size.
    struct Double;

    impl HostKernel for Double {
        fn execute(
            &self,
            args: &mut KernelArgs<'_>,
            global_work_size: usize,
        ) -> Result<(), ComputeError> {
            let input = args.input(0)?;
            let output = args.output(1)?;
            if input.len() < global_work_size || output.len() < global_work_size {
                return Err(ComputeError::ShapeMismatch("work size exceeds buffers"));
            }
            for (o, i) in output.iter_mut().zip(input).take(global_work_size) {
                *o = i.wrapping_mul(2);
            }
            Ok(())
        }
    }

    fn source() -> ProgramSource {
        ProgramSource::new().with_host_kernel("double", Arc::new(Double))
    }

    #[test]
    fn dispatch_runs_host_kernel() {
        let cpu = CpuBackend::new();
        let input = cpu.create_buffer("in", 4, BufferAccess::ReadOnly).unwrap();
        let output = cpu.create_buffer("out", 4, BufferAccess::WriteOnly).unwrap();
        let program = cpu.build_program(&source()).unwrap();
        let kernel = cpu.create_kernel(program, "double", 2).unwrap();
        cpu.set_kernel_arg(kernel, 0, input).unwrap();
        cpu.set_kernel_arg(kernel, 1, output).unwrap();

        cpu.write_buffer(input, 0, &[1, 2, 3, 4]).unwrap();
        cpu.enqueue_kernel(kernel, 3).unwrap();
        cpu.finish().unwrap();

        let mut out = [0u8; 4];
        cpu.read_buffer(output, 0, &mut out).unwrap();
        assert_eq!(out, [2, 4, 6, 0]);
    }

    #[test]
    fn unknown_entry_point_is_reported() {
        let cpu = CpuBackend::new();
        let program = cpu.build_program(&source()).unwrap();
        let err = cpu.create_kernel(program, "triple", 2).unwrap_err();
        assert!(matches!(err, ComputeError::EntryPoint { ref name, .. } if name == "triple"));
    }

    #[test]
    fn source_without_host_kernels_fails_to_build() {
        let cpu = CpuBackend::new();
        let err = cpu
            .build_program(&ProgramSource::new().with_unit("k.wgsl", "fn main() {}"))
            .unwrap_err();
        assert!(matches!(err, ComputeError::ProgramBuild(_)));
    }

    #[test]
    fn unbound_slot_blocks_dispatch() {
        let cpu = CpuBackend::new();
        let input = cpu.create_buffer("in", 4, BufferAccess::ReadOnly).unwrap();
        let program = cpu.build_program(&source()).unwrap();
        let kernel = cpu.create_kernel(program, "double", 2).unwrap();
        cpu.set_kernel_arg(kernel, 0, input).unwrap();
        assert!(matches!(
            cpu.enqueue_kernel(kernel, 4),
            Err(ComputeError::UnboundArgument(1))
        ));
    }

    #[test]
    fn releasing_a_buffer_unbinds_it() {
        let cpu = CpuBackend::new();
        let input = cpu.create_buffer("in", 4, BufferAccess::ReadOnly).unwrap();
        let output = cpu.create_buffer("out", 4, BufferAccess::WriteOnly).unwrap();
        let program = cpu.build_program(&source()).unwrap();
        let kernel = cpu.create_kernel(program, "double", 2).unwrap();
        cpu.set_kernel_arg(kernel, 0, input).unwrap();
        cpu.set_kernel_arg(kernel, 1, output).unwrap();

        cpu.release_buffer(output).unwrap();
        assert!(matches!(
            cpu.enqueue_kernel(kernel, 4),
            Err(ComputeError::UnboundArgument(1))
        ));
        assert!(matches!(
            cpu.release_buffer(output),
            Err(ComputeError::UnknownBuffer(_))
        ));
    }

    #[test]
    fn out_of_bounds_transfers_are_rejected() {
        let cpu = CpuBackend::new();
        let buffer = cpu.create_buffer("b", 8, BufferAccess::ReadWrite).unwrap();
        assert!(matches!(
            cpu.write_buffer(buffer, 6, &[0; 4]),
            Err(ComputeError::OutOfBounds { .. })
        ));
        let mut out = [0u8; 9];
        assert!(cpu.read_buffer(buffer, 0, &mut out).is_err());
        assert!(cpu.create_buffer("empty", 0, BufferAccess::ReadOnly).is_err());
    }

    #[test]
    fn failed_kernel_keeps_output_contents() {
        let cpu = CpuBackend::new();
        let input = cpu.create_buffer("in", 2, BufferAccess::ReadOnly).unwrap();
        let output = cpu.create_buffer("out", 2, BufferAccess::WriteOnly).unwrap();
        let program = cpu.build_program(&source()).unwrap();
        let kernel = cpu.create_kernel(program, "double", 2).unwrap();
        cpu.set_kernel_arg(kernel, 0, input).unwrap();
        cpu.set_kernel_arg(kernel, 1, output).unwrap();
        cpu.write_buffer(output, 0, &[7, 9]).unwrap();

        assert!(cpu.enqueue_kernel(kernel, 16).is_err());
        let mut out = [0u8; 2];
        cpu.read_buffer(output, 0, &mut out).unwrap();
        assert_eq!(out, [7, 9]);
    }
}
