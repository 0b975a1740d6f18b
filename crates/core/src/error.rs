//! Top-level error type shared across the workspace.

use thiserror::Error;

/// Errors surfaced by the renderer outside the RHI layer.
///
/// The RHI has its own error type (`ember_rhi::RhiError`) carrying raw
/// Vulkan result codes; this type is the coarser-grained surface used by
/// the platform layer and the application.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related failures that escaped the RHI layer.
    #[error("vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or surface plumbing failures.
    #[error("window error: {0}")]
    Window(String),

    /// Asset loading failures (scene files, textures).
    #[error("asset error: {0}")]
    Asset(String),

    /// Shader binary loading failures.
    #[error("shader error: {0}")]
    Shader(String),

    /// IO errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything that indicates a bug rather than an environment problem.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
