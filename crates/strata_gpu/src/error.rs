//! Error types for the GPU backend

use thiserror::Error;

use crate::program::ProgramKey;

/// Errors that can occur while creating a renderer
///
/// Once a renderer exists, failures are handled locally: quads that cannot
/// be drawn are skipped and context loss is reported through
/// [`crate::Renderer::is_context_lost`].
#[derive(Error, Debug)]
pub enum RendererError {
    #[error("graphics context is lost")]
    ContextLost,

    #[error("graphics context could not be made current")]
    ContextNotCurrent,

    #[error("off-screen framebuffer could not be created")]
    FramebufferUnavailable,

    #[error("program {key:?} failed to compile")]
    ProgramCompilation { key: ProgramKey },
}

/// Errors reported for generated shader sources
#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("WGSL parse error:\n{0}")]
    Parse(String),

    #[error("WGSL validation error: {0}")]
    Validation(String),
}

/// Result type for renderer creation
pub type Result<T> = std::result::Result<T, RendererError>;
