//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance and device creation
//! - Swapchain management
//! - Command buffer recording
//! - Buffer and image allocation via gpu-allocator
//! - Growable descriptor set allocation
//! - Deferred resource destruction (deletion queues)
//! - Pipeline creation
//! - Synchronization primitives
//! - Blocking uploads for mesh and texture data
//!
//! The crate targets Vulkan 1.3 and relies on dynamic rendering,
//! synchronization2, and buffer device addresses throughout.

mod error;

pub mod buffer;
pub mod command;
pub mod deletion;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod rendering;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod upload;
pub mod vertex;

#[cfg(test)]
mod test_support;

pub use error::{RhiError, RhiResult};

pub use buffer::AllocatedBuffer;
pub use command::{CommandBuffer, CommandPool};
pub use deletion::{DeletionQueue, Release};
pub use descriptor::{
    DescriptorAllocatorGrowable, DescriptorLayoutBuilder, DescriptorWriter, PoolSizeRatio,
};
pub use device::Device;
pub use image::AllocatedImage;
pub use instance::Instance;
pub use pipeline::{BlendMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
pub use sampler::SamplerPool;
pub use shader::{Shader, ShaderStage};
pub use swapchain::Swapchain;
pub use sync::{Fence, GPU_TIMEOUT_NS, Semaphore};
pub use upload::{ImmediateSubmit, MeshBuffers};
pub use vertex::{DrawPushConstants, Vertex};

// Re-export ash types that users might need
pub use ash::vk;

// Re-export the allocator's memory location enum so callers can pick
// where buffers and images live without a direct gpu-allocator dependency.
pub use gpu_allocator::MemoryLocation;
