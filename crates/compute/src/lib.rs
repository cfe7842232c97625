#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Compute backend contract used by the renderer.
//!
//! A backend exposes device buffers, programs built from kernel sources,
//! kernels resolved by entry point name, argument slot binding, and blocking
//! write / dispatch / read operations. Two implementations exist:
//!
//! - [`CpuBackend`]: executes [`HostKernel`]s registered on the
//!   [`ProgramSource`]. Always available; used for tests and as a fallback.
//! - `WgpuBackend` (feature `gpu`): compiles the WGSL units of the program
//!   source and dispatches them through `wgpu`.
//!
//! Devices are discovered through [`platforms`]; opening a [`Device`] yields
//! an `Arc<dyn ComputeBackend>`.

use std::path::PathBuf;
use thiserror::Error;

pub mod backend;
pub mod cpu_backend;
pub mod layout;
pub mod platform;
pub mod source;
#[cfg(feature = "gpu")]
pub mod wgpu_backend;

pub use backend::{ComputeBackend, HostKernel, KernelArgs};
pub use cpu_backend::CpuBackend;
pub use platform::{platforms, BackendSelection, Device, Platform};
pub use source::{ProgramSource, SourceUnit};
#[cfg(feature = "gpu")]
pub use wgpu_backend::WgpuBackend;

#[derive(Error, Debug)]
pub enum ComputeError {
    #[error("no compute platform available")]
    NoPlatform,
    #[error("platform `{0}` exposes no devices")]
    NoDevice(String),
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("command queue creation failed: {0}")]
    QueueCreation(String),
    #[error("failed to read kernel source {path:?}: {source}")]
    SourceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("program build failed: {0}")]
    ProgramBuild(String),
    #[error("kernel entry point `{name}` unavailable: {reason}")]
    EntryPoint { name: String, reason: String },
    #[error("allocation of {size} bytes failed: {reason}")]
    Allocation { size: usize, reason: String },
    #[error("unknown buffer {0:?}")]
    UnknownBuffer(BufferId),
    #[error("unknown program {0:?}")]
    UnknownProgram(ProgramId),
    #[error("unknown kernel {0:?}")]
    UnknownKernel(KernelId),
    #[error("argument slot {slot} out of range for a kernel with {count} slots")]
    SlotOutOfRange { slot: u32, count: u32 },
    #[error("argument slot {0} is not bound")]
    UnboundArgument(u32),
    #[error("{len} bytes at offset {offset} exceed buffer of {size} bytes")]
    OutOfBounds { offset: usize, len: usize, size: usize },
    #[error("buffer shape mismatch: {0}")]
    ShapeMismatch(&'static str),
    #[error("transfer failed: {0}")]
    Transfer(String),
    #[error("kernel execution failed: {0}")]
    Execution(String),
    #[error("readback failed: {0}")]
    Readback(String),
}

/// Handle to a device buffer. Only meaningful for the backend that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub(crate) u64);

/// Handle to a built program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub(crate) u64);

/// Handle to a kernel resolved from a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelId(pub(crate) u64);

/// How the kernel accesses a buffer. The host may always write and read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl BufferAccess {
    #[must_use]
    pub const fn kernel_writes(self) -> bool {
        matches!(self, BufferAccess::WriteOnly | BufferAccess::ReadWrite)
    }
}

pub(crate) fn check_range(offset: usize, len: usize, size: usize) -> Result<(), ComputeError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(ComputeError::OutOfBounds { offset, len, size }),
    }
}
