use crate::{BufferAccess, BufferId, ComputeError, KernelId, ProgramId, ProgramSource};

/// Command-queue style compute device.
///
/// Every operation is blocking from the caller's point of view: when
/// [`write_buffer`](Self::write_buffer) returns the data is on the device,
/// and [`read_buffer`](Self::read_buffer) observes all previously enqueued
/// work once [`finish`](Self::finish) has returned.
///
/// Implementations use interior mutability so a backend can be shared as
/// `Arc<dyn ComputeBackend>`.
pub trait ComputeBackend: Send + Sync + 'static {
    /// Human readable name of the bound device.
    fn device_name(&self) -> String;

    /// Allocates `size` bytes of device memory.
    ///
    /// # Errors
    ///
    /// [`ComputeError::Allocation`] for zero-sized or unsatisfiable requests.
    fn create_buffer(
        &self,
        label: &str,
        size: usize,
        access: BufferAccess,
    ) -> Result<BufferId, ComputeError>;

    /// Size in bytes the buffer was created with.
    ///
    /// # Errors
    ///
    /// [`ComputeError::UnknownBuffer`] for released or foreign handles.
    fn buffer_size(&self, buffer: BufferId) -> Result<usize, ComputeError>;

    /// Frees a buffer. Kernel slots bound to it become unbound.
    ///
    /// # Errors
    ///
    /// [`ComputeError::UnknownBuffer`] for released or foreign handles.
    fn release_buffer(&self, buffer: BufferId) -> Result<(), ComputeError>;

    /// Builds a program from kernel sources.
    ///
    /// # Errors
    ///
    /// [`ComputeError::ProgramBuild`] when the sources do not compile for
    /// this backend.
    fn build_program(&self, source: &ProgramSource) -> Result<ProgramId, ComputeError>;

    /// Resolves an entry point of a built program into a kernel taking
    /// `arg_count` buffer arguments.
    ///
    /// # Errors
    ///
    /// [`ComputeError::EntryPoint`] when the program has no such entry point.
    fn create_kernel(
        &self,
        program: ProgramId,
        entry_point: &str,
        arg_count: u32,
    ) -> Result<KernelId, ComputeError>;

    /// # Errors
    ///
    /// [`ComputeError::UnknownKernel`] for released or foreign handles.
    fn release_kernel(&self, kernel: KernelId) -> Result<(), ComputeError>;

    /// # Errors
    ///
    /// [`ComputeError::UnknownProgram`] for released or foreign handles.
    fn release_program(&self, program: ProgramId) -> Result<(), ComputeError>;

    /// Binds `buffer` to argument `slot` of `kernel`. Bindings persist across
    /// dispatches until rebound.
    ///
    /// # Errors
    ///
    /// [`ComputeError::SlotOutOfRange`] or an unknown-handle error.
    fn set_kernel_arg(&self, kernel: KernelId, slot: u32, buffer: BufferId)
        -> Result<(), ComputeError>;

    /// Blocking host-to-device copy of `data` at `offset`.
    ///
    /// # Errors
    ///
    /// [`ComputeError::OutOfBounds`] when the range exceeds the buffer, or
    /// [`ComputeError::Transfer`] when the device rejects the copy.
    fn write_buffer(&self, buffer: BufferId, offset: usize, data: &[u8])
        -> Result<(), ComputeError>;

    /// Enqueues `kernel` with one invocation per unit of `global_work_size`.
    ///
    /// # Errors
    ///
    /// [`ComputeError::UnboundArgument`] when a slot has no buffer, or
    /// [`ComputeError::Execution`] when the device rejects the dispatch.
    fn enqueue_kernel(&self, kernel: KernelId, global_work_size: usize)
        -> Result<(), ComputeError>;

    /// Blocks until all enqueued work has completed.
    ///
    /// # Errors
    ///
    /// [`ComputeError::Execution`] when the device reports a failure.
    fn finish(&self) -> Result<(), ComputeError>;

    /// Blocking device-to-host copy into `out`, starting at `offset`.
    ///
    /// # Errors
    ///
    /// [`ComputeError::OutOfBounds`] or [`ComputeError::Readback`].
    fn read_buffer(&self, buffer: BufferId, offset: usize, out: &mut [u8])
        -> Result<(), ComputeError>;
}

/// Kernel body executed on the host by [`crate::CpuBackend`].
pub trait HostKernel: Send + Sync {
    /// Runs `global_work_size` invocations against the bound arguments.
    ///
    /// # Errors
    ///
    /// Implementations report malformed arguments as
    /// [`ComputeError::ShapeMismatch`].
    fn execute(&self, args: &mut KernelArgs<'_>, global_work_size: usize)
        -> Result<(), ComputeError>;
}

pub(crate) enum ArgSlot<'a> {
    Input(&'a [u8]),
    Output(&'a mut [u8]),
}

/// Buffer arguments handed to a [`HostKernel`], indexed by slot.
///
/// Buffers created with a kernel-writable [`BufferAccess`] are outputs, all
/// others are inputs.
pub struct KernelArgs<'a> {
    slots: Vec<ArgSlot<'a>>,
}

impl<'a> KernelArgs<'a> {
    pub(crate) fn new(slots: Vec<ArgSlot<'a>>) -> Self {
        Self { slots }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Read-only view of an input slot.
    ///
    /// # Errors
    ///
    /// [`ComputeError::SlotOutOfRange`] or [`ComputeError::ShapeMismatch`]
    /// when the slot is an output.
    pub fn input(&self, slot: u32) -> Result<&'a [u8], ComputeError> {
        match self.slots.get(slot as usize) {
            Some(ArgSlot::Input(data)) => Ok(*data),
            Some(ArgSlot::Output(_)) => Err(ComputeError::ShapeMismatch(
                "slot is bound to a kernel-writable buffer",
            )),
            None => Err(self.out_of_range(slot)),
        }
    }

    /// Mutable view of an output slot.
    ///
    /// # Errors
    ///
    /// [`ComputeError::SlotOutOfRange`] or [`ComputeError::ShapeMismatch`]
    /// when the slot is read-only.
    pub fn output(&mut self, slot: u32) -> Result<&mut [u8], ComputeError> {
        let count = self.slots.len();
        match self.slots.get_mut(slot as usize) {
            Some(ArgSlot::Output(data)) => Ok(&mut data[..]),
            Some(ArgSlot::Input(_)) => Err(ComputeError::ShapeMismatch(
                "slot is bound to a read-only buffer",
            )),
            None => Err(ComputeError::SlotOutOfRange {
                slot,
                count: u32::try_from(count).unwrap_or(u32::MAX),
            }),
        }
    }

    fn out_of_range(&self, slot: u32) -> ComputeError {
        ComputeError::SlotOutOfRange {
            slot,
            count: u32::try_from(self.slots.len()).unwrap_or(u32::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_enforce_direction() {
        let input = [1u8, 2, 3, 4];
        let mut output = [0u8; 4];
        let mut args = KernelArgs::new(vec![ArgSlot::Input(&input), ArgSlot::Output(&mut output)]);

        let data = args.input(0).unwrap();
        args.output(1).unwrap().copy_from_slice(data);

        assert!(matches!(args.input(1), Err(ComputeError::ShapeMismatch(_))));
        assert!(matches!(args.output(0), Err(ComputeError::ShapeMismatch(_))));
        assert!(matches!(
            args.input(2),
            Err(ComputeError::SlotOutOfRange { slot: 2, count: 2 })
        ));
        drop(args);
        assert_eq!(output, input);
    }
}
