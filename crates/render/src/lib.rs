//! Frame orchestration for the SDF raymarcher.
//!
//! A [`RenderContext`] owns the compute device, the `rm_render_entry` kernel
//! and the persistent buffers. A [`FrameBaker`] drives one frame at a time
//! through it: scene snapshot, upload, dispatch, readback and
//! [`pixels`] assembly into an RGBA image.

pub mod baker;
pub mod camera;
mod config;
pub mod context;
mod error;
pub mod gpu_types;
pub mod kernel;
pub mod pixels;
pub mod scene;

pub use baker::{BakedFrame, FrameBaker};
pub use camera::Camera;
pub use config::RenderConfig;
pub use context::RenderContext;
pub use error::{BakeStage, FrameError, InitError, InitStage};
pub use scene::{RotatingBoxScene, SceneSource, StaticScene};
