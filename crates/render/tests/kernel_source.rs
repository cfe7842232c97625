use compute::layout::{RENDER_ENTRY, RENDER_ENTRY_ARGS, WORKGROUP_SIZE};
use std::fs;
use std::path::PathBuf;

fn kernel_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../kernels/render.wgsl")
}

fn parse() -> naga::Module {
    let src = fs::read_to_string(kernel_path()).expect("read kernel");
    naga::front::wgsl::parse_str(&src).expect("wgsl parse")
}

#[test]
fn render_kernel_validates() {
    let module = parse();
    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator.validate(&module).expect("wgsl validate");
}

#[test]
fn render_kernel_exposes_the_entry_point() {
    let module = parse();
    let entry = module
        .entry_points
        .iter()
        .find(|e| e.name == RENDER_ENTRY)
        .expect("entry point present");
    assert_eq!(entry.stage, naga::ShaderStage::Compute);
    assert_eq!(entry.workgroup_size, [WORKGROUP_SIZE, 1, 1]);
}

#[test]
fn render_kernel_binds_every_slot() {
    let module = parse();
    let mut bindings: Vec<u32> = module
        .global_variables
        .iter()
        .filter_map(|(_, var)| var.binding.as_ref())
        .filter(|b| b.group == 0)
        .map(|b| b.binding)
        .collect();
    bindings.sort_unstable();
    assert_eq!(bindings, (0..RENDER_ENTRY_ARGS).collect::<Vec<_>>());
}
