use compute::{
    platforms, BackendSelection, BufferAccess, ComputeBackend, ComputeError, HostKernel,
    KernelArgs, ProgramSource,
};
use std::sync::Arc;

/// Writes the slot-0 word into every output word.
struct Fill;

impl HostKernel for Fill {
    fn execute(&self, args: &mut KernelArgs<'_>, n: usize) -> Result<(), ComputeError> {
        let word: [u8; 4] = args
            .input(0)?
            .get(..4)
            .and_then(|w| w.try_into().ok())
            .ok_or(ComputeError::ShapeMismatch("fill word"))?;
        for chunk in args.output(1)?.chunks_exact_mut(4).take(n) {
            chunk.copy_from_slice(&word);
        }
        Ok(())
    }
}

fn host() -> Arc<dyn ComputeBackend> {
    platforms(BackendSelection::Cpu)
        .into_iter()
        .flat_map(|p| p.devices)
        .next()
        .unwrap()
        .open()
        .unwrap()
}

#[test]
fn bindings_persist_across_dispatches() {
    let backend = host();
    let source = ProgramSource::new().with_host_kernel("fill", Arc::new(Fill));
    let program = backend.build_program(&source).unwrap();
    let kernel = backend.create_kernel(program, "fill", 2).unwrap();
    let word = backend.create_buffer("word", 4, BufferAccess::ReadOnly).unwrap();
    let out = backend.create_buffer("out", 16, BufferAccess::WriteOnly).unwrap();
    backend.set_kernel_arg(kernel, 0, word).unwrap();
    backend.set_kernel_arg(kernel, 1, out).unwrap();

    for value in [0xAAu8, 0x55] {
        backend.write_buffer(word, 0, &[value; 4]).unwrap();
        backend.enqueue_kernel(kernel, 4).unwrap();
        backend.finish().unwrap();
        let mut bytes = [0u8; 16];
        backend.read_buffer(out, 0, &mut bytes).unwrap();
        assert_eq!(bytes, [value; 16]);
    }
}

#[test]
fn slot_out_of_range_is_rejected() {
    let backend = host();
    let source = ProgramSource::new().with_host_kernel("fill", Arc::new(Fill));
    let program = backend.build_program(&source).unwrap();
    let kernel = backend.create_kernel(program, "fill", 2).unwrap();
    let word = backend.create_buffer("word", 4, BufferAccess::ReadOnly).unwrap();
    assert!(matches!(
        backend.set_kernel_arg(kernel, 2, word),
        Err(ComputeError::SlotOutOfRange { slot: 2, count: 2 })
    ));
}

#[test]
fn released_handles_are_unknown() {
    let backend = host();
    let source = ProgramSource::new().with_host_kernel("fill", Arc::new(Fill));
    let program = backend.build_program(&source).unwrap();
    let kernel = backend.create_kernel(program, "fill", 2).unwrap();
    backend.release_kernel(kernel).unwrap();
    backend.release_program(program).unwrap();
    assert!(matches!(
        backend.release_kernel(kernel),
        Err(ComputeError::UnknownKernel(_))
    ));
    assert!(matches!(
        backend.create_kernel(program, "fill", 2),
        Err(ComputeError::UnknownProgram(_))
    ));
}
