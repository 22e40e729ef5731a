use crate::device::ProgramError;
use crate::gpu::GpuError;
use crate::model::ModelError;
use crate::render_graph::{FramebufferError, SequenceError};
use crate::screenshot::ScreenshotError;

/// Any failure the labs can report while building or rendering a frame.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error(transparent)]
    Program(#[from] ProgramError),
    #[error(transparent)]
    Framebuffer(#[from] FramebufferError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Sequence(#[from] SequenceError),
    #[error(transparent)]
    Screenshot(#[from] ScreenshotError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
