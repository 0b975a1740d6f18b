//! Frame orchestration: per-frame resources, render passes, and the
//! main [`Renderer`] that ties the RHI, scene, and platform layers
//! together.

pub mod background;
pub mod frame;
pub mod loader;
pub mod material;
pub mod renderer;
pub mod stats;

/// Number of frames the CPU may record ahead of the GPU.
pub const FRAME_OVERLAP: usize = 2;

pub use renderer::Renderer;
pub use stats::RenderStats;
