//! Argument slot layout of the render entry point.
//!
//! Slot numbers are shared by every backend and by the kernel sources in
//! `kernels/`. The WGSL kernel binds slot `n` at `@group(0) @binding(n)`.

/// Entry point resolved from the kernel program.
pub const RENDER_ENTRY: &str = "rm_render_entry";

pub const SLOT_CAMERA: u32 = 0;
pub const SLOT_VOLUMES: u32 = 1;
pub const SLOT_VOLUME_COUNT: u32 = 2;
pub const SLOT_OUTPUT: u32 = 3;

/// Number of argument slots taken by [`RENDER_ENTRY`].
pub const RENDER_ENTRY_ARGS: u32 = 4;

/// Invocations per workgroup on device backends. Must match
/// `@workgroup_size` in the kernel sources.
pub const WORKGROUP_SIZE: u32 = 64;

const _: () = assert!(SLOT_OUTPUT == RENDER_ENTRY_ARGS - 1);

/// Number of workgroups needed to cover `global_work_size` invocations.
#[must_use]
pub const fn workgroup_count(global_work_size: usize) -> usize {
    global_work_size.div_ceil(WORKGROUP_SIZE as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workgroups_cover_every_invocation() {
        assert_eq!(workgroup_count(0), 0);
        assert_eq!(workgroup_count(1), 1);
        assert_eq!(workgroup_count(64), 1);
        assert_eq!(workgroup_count(65), 2);
        assert_eq!(workgroup_count(800 * 600), 7500);
    }
}
