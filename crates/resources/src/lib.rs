//! Asset loading: glTF geometry and image files.
//!
//! Loading is CPU-only here; the renderer uploads the returned data to
//! the GPU. Keeping the two apart means asset parsing is testable
//! without a Vulkan device.

mod error;

pub mod mesh;
pub mod scene;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use mesh::{MeshData, SurfaceData, load_gltf_meshes};
pub use scene::{
    MaterialDesc, NodeDesc, SamplerDesc, SceneDescription, TextureRef, discover_gltf_files,
    load_gltf_scene,
};
pub use texture::{ImageData, checkerboard_rgba, load_image_rgba, solid_rgba};
