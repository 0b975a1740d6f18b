//! GPU image allocation, views, and mipmap generation.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// A 2D Vulkan image plus its memory and default view.
///
/// Covers render targets (draw/depth images) and sampled textures.
pub struct AllocatedImage {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    extent: vk::Extent3D,
    format: vk::Format,
    mip_levels: u32,
}

impl AllocatedImage {
    /// Creates a device-local 2D image and a full-range view over it.
    ///
    /// With `mipmapped` set, the full mip chain down to 1x1 is allocated;
    /// filling it is the caller's job (see [`generate_mipmaps`]).
    pub fn new(
        device: Arc<Device>,
        name: &str,
        extent: vk::Extent3D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        mipmapped: bool,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidHandle(
                "image extent must be non-zero".to_string(),
            ));
        }

        let mip_levels = if mipmapped {
            mip_level_count(extent.width, extent.height)
        } else {
            1
        };

        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(extent)
            .mip_levels(mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&create_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = {
            let mut allocator = device
                .allocator()
                .lock()
                .map_err(|_| RhiError::InvalidHandle("allocator mutex poisoned".to_string()))?;
            allocator.allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?
        };

        unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect_for(format))
                    .base_mip_level(0)
                    .level_count(mip_levels)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let view = unsafe { device.handle().create_image_view(&view_info, None)? };

        Ok(Self {
            device,
            image,
            view,
            allocation: Some(allocation),
            extent,
            format,
            mip_levels,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    #[inline]
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }
}

impl Drop for AllocatedImage {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take()
            && let Ok(mut allocator) = self.device.allocator().lock()
        {
            let _ = allocator.free(allocation);
        }
        unsafe {
            self.device.handle().destroy_image(self.image, None);
        }
    }
}

/// Number of mip levels for a full chain down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).leading_zeros()
}

/// Image aspect implied by the format.
pub fn aspect_for(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM
        | vk::Format::D32_SFLOAT
        | vk::Format::X8_D24_UNORM_PACK32 => vk::ImageAspectFlags::DEPTH,
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Fills an image's mip chain by blitting each level into the next.
///
/// Expects every level in TRANSFER_DST_OPTIMAL; leaves the whole image in
/// SHADER_READ_ONLY_OPTIMAL.
pub fn generate_mipmaps(
    device: &Device,
    cmd: &CommandBuffer,
    image: vk::Image,
    extent: vk::Extent2D,
) {
    let mip_levels = mip_level_count(extent.width, extent.height);
    let mut level_extent = extent;

    for level in 0..mip_levels {
        let half = vk::Extent2D {
            width: (level_extent.width / 2).max(1),
            height: (level_extent.height / 2).max(1),
        };

        // Move this level to TRANSFER_SRC so the next level can read it.
        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .image(image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(level)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let barriers = [barrier];
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe {
            device
                .handle()
                .cmd_pipeline_barrier2(cmd.handle(), &dependency_info);
        }

        if level < mip_levels - 1 {
            let blit_region = vk::ImageBlit2::default()
                .src_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(level)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .dst_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(level + 1)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .src_offsets([
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D {
                        x: level_extent.width as i32,
                        y: level_extent.height as i32,
                        z: 1,
                    },
                ])
                .dst_offsets([
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D {
                        x: half.width as i32,
                        y: half.height as i32,
                        z: 1,
                    },
                ]);

            let regions = [blit_region];
            let blit_info = vk::BlitImageInfo2::default()
                .src_image(image)
                .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                .dst_image(image)
                .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .filter(vk::Filter::LINEAR)
                .regions(&regions);

            unsafe {
                device.handle().cmd_blit_image2(cmd.handle(), &blit_info);
            }

            level_extent = half;
        }
    }

    // All levels are now TRANSFER_SRC; make the image sampleable.
    cmd.transition_image(
        image,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_count_for_powers_of_two() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(512, 512), 10);
        assert_eq!(mip_level_count(1024, 1024), 11);
    }

    #[test]
    fn test_mip_count_uses_larger_dimension() {
        assert_eq!(mip_level_count(1024, 1), 11);
        assert_eq!(mip_level_count(1, 1024), 11);
        assert_eq!(mip_level_count(800, 600), 10);
    }

    #[test]
    fn test_mip_count_non_power_of_two() {
        // floor(log2(1000)) + 1 = 10
        assert_eq!(mip_level_count(1000, 1000), 10);
        assert_eq!(mip_level_count(3, 3), 2);
    }

    #[test]
    fn test_aspect_for_depth_formats() {
        assert_eq!(
            aspect_for(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_for(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            aspect_for(vk::Format::R16G16B16A16_SFLOAT),
            vk::ImageAspectFlags::COLOR
        );
    }
}
