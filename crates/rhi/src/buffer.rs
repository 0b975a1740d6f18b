//! GPU buffer allocation and mapped writes.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// A Vulkan buffer together with its gpu-allocator backing memory.
///
/// Construction takes raw usage flags and a [`MemoryLocation`] so one type
/// covers staging buffers, uniform buffers, vertex storage buffers, and
/// readback buffers. Dropping frees the allocation and destroys the buffer.
pub struct AllocatedBuffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
}

impl AllocatedBuffer {
    /// Creates a buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for a zero-size request, or the
    /// underlying Vulkan/allocator error.
    pub fn new(
        device: Arc<Device>,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "buffer size must be non-zero".to_string(),
            ));
        }

        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&create_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = {
            let mut allocator = device
                .allocator()
                .lock()
                .map_err(|_| RhiError::InvalidHandle("allocator mutex poisoned".to_string()))?;
            allocator.allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?
        };

        unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// The buffer's GPU virtual address, for shader-side pointer access.
    ///
    /// Requires the buffer to have been created with
    /// `SHADER_DEVICE_ADDRESS` usage.
    pub fn device_address(&self) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfo::default().buffer(self.buffer);
        unsafe { self.device.handle().get_buffer_device_address(&info) }
    }

    /// Copies `data` into the buffer at `offset` bytes.
    ///
    /// Only valid for host-visible buffers (`CpuToGpu` / `GpuToCpu`);
    /// device-local buffers have no mapping and return `InvalidHandle`.
    pub fn write_bytes(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if offset + data.len() as vk::DeviceSize > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "write of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                self.size
            )));
        }

        let allocation = self
            .allocation
            .as_ref()
            .ok_or_else(|| RhiError::InvalidHandle("buffer already freed".to_string()))?;

        let mapped = allocation
            .mapped_ptr()
            .ok_or_else(|| RhiError::InvalidHandle("buffer is not host-visible".to_string()))?;

        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                mapped.as_ptr().cast::<u8>().add(offset as usize),
                data.len(),
            );
        }
        Ok(())
    }

    /// Copies a slice of plain-old-data values into the buffer at `offset`.
    pub fn write_slice<T: bytemuck::Pod>(
        &self,
        offset: vk::DeviceSize,
        data: &[T],
    ) -> RhiResult<()> {
        self.write_bytes(offset, bytemuck::cast_slice(data))
    }

    /// Reads the buffer's contents back into a byte vector.
    ///
    /// Only valid for host-visible buffers.
    pub fn read_bytes(&self) -> RhiResult<Vec<u8>> {
        let allocation = self
            .allocation
            .as_ref()
            .ok_or_else(|| RhiError::InvalidHandle("buffer already freed".to_string()))?;

        let mapped = allocation
            .mapped_ptr()
            .ok_or_else(|| RhiError::InvalidHandle("buffer is not host-visible".to_string()))?;

        let mut out = vec![0u8; self.size as usize];
        unsafe {
            std::ptr::copy_nonoverlapping(
                mapped.as_ptr().cast::<u8>(),
                out.as_mut_ptr(),
                self.size as usize,
            );
        }
        Ok(out)
    }

    /// Takes ownership of the raw handle and allocation, disarming Drop.
    ///
    /// Used when destruction is deferred through a deletion queue.
    pub fn into_raw(mut self) -> (vk::Buffer, Allocation) {
        let buffer = self.buffer;
        self.buffer = vk::Buffer::null();
        // Drop checks for None, so the allocation will not double-free.
        let allocation = self.allocation.take().unwrap_or_else(Allocation::default);
        (buffer, allocation)
    }
}

impl Drop for AllocatedBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take()
            && let Ok(mut allocator) = self.device.allocator().lock()
        {
            let _ = allocator.free(allocation);
        }
        if self.buffer != vk::Buffer::null() {
            unsafe {
                self.device.handle().destroy_buffer(self.buffer, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AllocatedBuffer>();
    }
}
