// Golden-master tests: the same kernel run through wgpu and through its host
// twin on the CPU backend must produce identical buffers.

#[cfg(feature = "gpu")]
mod wgpu_tests {
    use compute::{
        BufferAccess, ComputeBackend, ComputeError, CpuBackend, HostKernel, KernelArgs,
        ProgramSource, WgpuBackend,
    };
    use std::sync::Arc;

    const SCALE_WGSL: &str = r"
@group(0) @binding(0) var<storage, read> input: array<f32>;
@group(0) @binding(1) var<storage, read_write> output: array<f32>;

@compute @workgroup_size(64)
fn scale(@builtin(global_invocation_id) gid: vec3<u32>,
         @builtin(num_workgroups) groups: vec3<u32>) {
    let i = gid.x + gid.y * groups.x * 64u;
    if (i >= arrayLength(&output)) {
        return;
    }
    output[i] = input[i] * 2.0 + 1.0;
}
";

    struct Scale;

    impl HostKernel for Scale {
        fn execute(&self, args: &mut KernelArgs<'_>, n: usize) -> Result<(), ComputeError> {
            let input: Vec<f32> = bytemuck::pod_collect_to_vec(args.input(0)?);
            let output = args.output(1)?;
            for (i, chunk) in output.chunks_exact_mut(4).enumerate().take(n) {
                chunk.copy_from_slice(&(input[i] * 2.0 + 1.0).to_le_bytes());
            }
            Ok(())
        }
    }

    fn run(backend: &dyn ComputeBackend, values: &[f32]) -> Vec<u8> {
        let bytes: &[u8] = bytemuck::cast_slice(values);
        let source = ProgramSource::new()
            .with_unit("scale.wgsl", SCALE_WGSL)
            .with_host_kernel("scale", Arc::new(Scale));

        let input = backend.create_buffer("in", bytes.len(), BufferAccess::ReadOnly).unwrap();
        let output = backend.create_buffer("out", bytes.len(), BufferAccess::WriteOnly).unwrap();
        let program = backend.build_program(&source).unwrap();
        let kernel = backend.create_kernel(program, "scale", 2).unwrap();
        backend.set_kernel_arg(kernel, 0, input).unwrap();
        backend.set_kernel_arg(kernel, 1, output).unwrap();

        backend.write_buffer(input, 0, bytes).unwrap();
        backend.enqueue_kernel(kernel, values.len()).unwrap();
        backend.finish().unwrap();

        let mut out = vec![0u8; bytes.len()];
        backend.read_buffer(output, 0, &mut out).unwrap();
        out
    }

    #[test]
    fn scale_kernel_matches_host() {
        let Ok(gpu) = WgpuBackend::new() else {
            eprintln!("no wgpu adapter, skipping");
            return;
        };
        #[allow(clippy::cast_precision_loss)]
        let values: Vec<f32> = (0..1000).map(|i| i as f32 * 0.5 - 17.0).collect();
        let expected = run(&CpuBackend::new(), &values);
        let actual = run(&gpu, &values);
        assert_eq!(expected, actual);
    }

    #[test]
    fn broken_source_fails_to_build() {
        let Ok(gpu) = WgpuBackend::new() else {
            return;
        };
        let source = ProgramSource::new().with_unit("bad.wgsl", "fn broken( {");
        assert!(matches!(
            gpu.build_program(&source),
            Err(ComputeError::ProgramBuild(_))
        ));
    }

    #[test]
    fn missing_entry_point_is_reported() {
        let Ok(gpu) = WgpuBackend::new() else {
            return;
        };
        let source = ProgramSource::new().with_unit("scale.wgsl", SCALE_WGSL);
        let program = gpu.build_program(&source).unwrap();
        assert!(matches!(
            gpu.create_kernel(program, "rm_render_entry", 4),
            Err(ComputeError::EntryPoint { .. })
        ));
    }
}
