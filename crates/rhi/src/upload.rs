//! Blocking GPU uploads outside the frame loop.
//!
//! Mesh and texture data are staged through host-visible buffers and
//! copied on the graphics queue with a fence wait. This stalls, which is
//! acceptable at load time; an async transfer queue is the eventual
//! replacement if streaming is ever needed.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use tracing::debug;

use crate::buffer::AllocatedBuffer;
use crate::command::{CommandBuffer, CommandPool};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{AllocatedImage, generate_mipmaps};
use crate::sync::{Fence, GPU_TIMEOUT_NS};
use crate::vertex::Vertex;

/// Executes one-off command buffers, blocking until the GPU finishes.
pub struct ImmediateSubmit {
    device: Arc<Device>,
    _pool: CommandPool,
    command_buffer: CommandBuffer,
    fence: Fence,
}

impl ImmediateSubmit {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let graphics_family = device.queue_families().graphics;

        let pool = CommandPool::new_transient(Arc::clone(&device), graphics_family)?;
        let command_buffer = pool.allocate_one()?;
        let fence = Fence::new(Arc::clone(&device), false)?;

        Ok(Self {
            device,
            _pool: pool,
            command_buffer,
            fence,
        })
    }

    /// Records commands via `record` and submits them, waiting on a fence
    /// until the GPU is done.
    pub fn submit(&self, record: impl FnOnce(&CommandBuffer) -> RhiResult<()>) -> RhiResult<()> {
        self.command_buffer.reset()?;
        self.command_buffer.begin()?;
        record(&self.command_buffer)?;
        self.command_buffer.end()?;

        self.device.submit_commands(
            self.device.graphics_queue(),
            self.command_buffer.handle(),
            None,
            None,
            self.fence.handle(),
        )?;

        self.fence.wait(GPU_TIMEOUT_NS)?;
        self.fence.reset()?;
        Ok(())
    }
}

/// GPU-resident geometry for one mesh: an index buffer plus a vertex
/// storage buffer addressed from the vertex shader by device address.
pub struct MeshBuffers {
    pub vertex_buffer: AllocatedBuffer,
    pub index_buffer: AllocatedBuffer,
    pub vertex_buffer_address: vk::DeviceAddress,
}

/// Byte offsets of the vertex and index regions inside a combined staging
/// buffer: vertices first, indices packed directly after.
pub fn staging_layout(
    vertex_count: usize,
    index_count: usize,
) -> (vk::DeviceSize, vk::DeviceSize, vk::DeviceSize) {
    let vertex_bytes = (vertex_count * std::mem::size_of::<Vertex>()) as vk::DeviceSize;
    let index_bytes = (index_count * std::mem::size_of::<u32>()) as vk::DeviceSize;
    (vertex_bytes, index_bytes, vertex_bytes + index_bytes)
}

/// Uploads mesh geometry to device-local memory.
///
/// Both regions go through a single staging buffer and a single submit.
pub fn upload_mesh(
    device: &Arc<Device>,
    submitter: &ImmediateSubmit,
    name: &str,
    vertices: &[Vertex],
    indices: &[u32],
) -> RhiResult<MeshBuffers> {
    if vertices.is_empty() || indices.is_empty() {
        return Err(RhiError::InvalidHandle(format!(
            "mesh '{name}' has no geometry"
        )));
    }

    let (vertex_bytes, index_bytes, total_bytes) = staging_layout(vertices.len(), indices.len());

    let vertex_buffer = AllocatedBuffer::new(
        Arc::clone(device),
        name,
        vertex_bytes,
        vk::BufferUsageFlags::STORAGE_BUFFER
            | vk::BufferUsageFlags::TRANSFER_DST
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
        MemoryLocation::GpuOnly,
    )?;

    let index_buffer = AllocatedBuffer::new(
        Arc::clone(device),
        name,
        index_bytes,
        vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::GpuOnly,
    )?;

    let staging = AllocatedBuffer::new(
        Arc::clone(device),
        "mesh staging",
        total_bytes,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
    )?;

    staging.write_slice(0, vertices)?;
    staging.write_slice(vertex_bytes, indices)?;

    submitter.submit(|cmd| {
        cmd.copy_buffer(
            staging.handle(),
            vertex_buffer.handle(),
            &[vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: vertex_bytes,
            }],
        );
        cmd.copy_buffer(
            staging.handle(),
            index_buffer.handle(),
            &[vk::BufferCopy {
                src_offset: vertex_bytes,
                dst_offset: 0,
                size: index_bytes,
            }],
        );
        Ok(())
    })?;

    let vertex_buffer_address = vertex_buffer.device_address();

    debug!(
        "Uploaded mesh '{}': {} vertices, {} indices",
        name,
        vertices.len(),
        indices.len()
    );

    Ok(MeshBuffers {
        vertex_buffer,
        index_buffer,
        vertex_buffer_address,
    })
}

/// Byte size of a tightly packed RGBA8 image.
///
/// Widened before multiplying; width times height alone can exceed u32.
pub fn rgba8_byte_size(extent: vk::Extent3D) -> u64 {
    extent.width as u64 * extent.height as u64 * 4
}

/// Uploads RGBA8 pixel data into a new sampled texture.
///
/// With `mipmapped` set, the full mip chain is generated on the GPU after
/// the level-0 copy; otherwise the image is transitioned straight to
/// SHADER_READ_ONLY_OPTIMAL.
pub fn upload_image(
    device: &Arc<Device>,
    submitter: &ImmediateSubmit,
    name: &str,
    data: &[u8],
    extent: vk::Extent3D,
    format: vk::Format,
    mipmapped: bool,
) -> RhiResult<AllocatedImage> {
    let expected = rgba8_byte_size(extent);
    if data.len() as u64 != expected {
        return Err(RhiError::InvalidHandle(format!(
            "texture '{name}': {} bytes supplied, {} expected",
            data.len(),
            expected
        )));
    }

    let usage = if mipmapped {
        // Mip generation blits within the image, so it must also be a source.
        vk::ImageUsageFlags::SAMPLED
            | vk::ImageUsageFlags::TRANSFER_DST
            | vk::ImageUsageFlags::TRANSFER_SRC
    } else {
        vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST
    };

    let image = AllocatedImage::new(Arc::clone(device), name, extent, format, usage, mipmapped)?;

    let staging = AllocatedBuffer::new(
        Arc::clone(device),
        "texture staging",
        data.len() as vk::DeviceSize,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
    )?;
    staging.write_bytes(0, data)?;

    submitter.submit(|cmd| {
        cmd.transition_image(
            image.handle(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );

        let region = vk::BufferImageCopy::default()
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_extent(extent);

        cmd.copy_buffer_to_image(
            staging.handle(),
            image.handle(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );

        if mipmapped {
            generate_mipmaps(device, cmd, image.handle(), image.extent_2d());
        } else {
            cmd.transition_image(
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        }
        Ok(())
    })?;

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_layout_packs_indices_after_vertices() {
        let (vertex_bytes, index_bytes, total) = staging_layout(100, 300);
        assert_eq!(vertex_bytes, 100 * 48);
        assert_eq!(index_bytes, 300 * 4);
        assert_eq!(total, vertex_bytes + index_bytes);
    }

    #[test]
    fn test_staging_layout_single_triangle() {
        let (vertex_bytes, index_bytes, total) = staging_layout(3, 3);
        assert_eq!(vertex_bytes, 144);
        assert_eq!(index_bytes, 12);
        assert_eq!(total, 156);
    }

    #[test]
    fn test_rgba8_byte_size_survives_huge_extents() {
        let extent = vk::Extent3D {
            width: 32_768,
            height: 32_768,
            depth: 1,
        };
        // 32768 * 32768 * 4 does not fit in u32.
        assert_eq!(rgba8_byte_size(extent), 4_294_967_296);

        let small = vk::Extent3D {
            width: 16,
            height: 16,
            depth: 1,
        };
        assert_eq!(rgba8_byte_size(small), 1024);
    }
}
