use crate::pixels::AssemblyError;
use compute::ComputeError;
use std::fmt;
use thiserror::Error;
use volumes::VolumeError;

/// States of [`crate::RenderContext`] initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    Uninitialized,
    PlatformSelected,
    DeviceBound,
    ProgramBuilt,
    BuffersBound,
    Ready,
    Failed,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Fatal setup failures. The host cannot render without a context.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("invalid render configuration: {0}")]
    InvalidConfig(String),
    #[error("no compute platform exposes a device")]
    NoDevice,
    #[error("initialization failed after {stage}: {source}")]
    Backend {
        /// Last stage reached before the failure.
        stage: InitStage,
        #[source]
        source: ComputeError,
    },
}

/// Steps of a bake that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BakeStage {
    Snapshot,
    AllocateVolumes,
    BindArguments,
    WriteInputs,
    Dispatch,
    ReadOutput,
    Assemble,
}

impl fmt::Display for BakeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BakeStage::Snapshot => "scene snapshot",
            BakeStage::AllocateVolumes => "volume buffer allocation",
            BakeStage::BindArguments => "argument binding",
            BakeStage::WriteInputs => "input upload",
            BakeStage::Dispatch => "kernel dispatch",
            BakeStage::ReadOutput => "output readback",
            BakeStage::Assemble => "pixel assembly",
        })
    }
}

/// A recoverable failure of one frame. The frame still yields an image.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("scene snapshot failed: {0}")]
    Scene(#[from] VolumeError),
    #[error("frame failed during {stage}: {source}")]
    Device {
        stage: BakeStage,
        #[source]
        source: ComputeError,
    },
    #[error("pixel assembly failed: {0}")]
    Assembly(#[from] AssemblyError),
}

impl FrameError {
    pub(crate) fn at(stage: BakeStage) -> impl FnOnce(ComputeError) -> Self {
        move |source| Self::Device { stage, source }
    }

    #[must_use]
    pub fn stage(&self) -> BakeStage {
        match self {
            FrameError::Scene(_) => BakeStage::Snapshot,
            FrameError::Device { stage, .. } => *stage,
            FrameError::Assembly(_) => BakeStage::Assemble,
        }
    }
}
