use compute::BackendSelection;
use std::path::PathBuf;

/// Settings fixed for the lifetime of a [`crate::RenderContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    /// Output size in pixels, `(width, height)`.
    pub resolution: (u32, u32),
    /// Directory holding the `*.wgsl` kernel sources.
    pub kernel_dir: PathBuf,
    pub backend: BackendSelection,
    /// Volumes the per-frame buffers hold before they have to grow.
    pub volume_capacity: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            resolution: (800, 600),
            kernel_dir: PathBuf::from("kernels"),
            backend: BackendSelection::Auto,
            volume_capacity: 16,
        }
    }
}

impl RenderConfig {
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.resolution.0 as usize * self.resolution.1 as usize
    }

    /// Size of the pixel output buffer: four bytes per pixel.
    #[must_use]
    pub fn output_size(&self) -> usize {
        self.pixel_count() * 4
    }
}
