//! Error types for asset loading.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for asset loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// Failed to load a glTF file.
    #[error("Failed to load glTF file '{path}': {message}")]
    GltfLoad {
        path: PathBuf,
        message: String,
    },

    /// glTF file contains no meshes.
    #[error("glTF file '{0}' contains no meshes")]
    NoMeshes(PathBuf),

    /// A mesh primitive has no position data.
    #[error("Mesh primitive '{0}' has no position data")]
    NoPositionData(String),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

/// Result type alias for asset operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
