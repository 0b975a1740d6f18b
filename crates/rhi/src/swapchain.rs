//! Swapchain creation, recreation, acquire, and present.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::RhiError;
use crate::instance::Instance;

/// Surface capabilities relevant to swapchain creation, queried once per
/// (re)build so a monitor change is picked up.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Queries the surface; errors if it offers no formats or present
    /// modes at all (a broken driver, effectively).
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self, RhiError> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        if formats.is_empty() || present_modes.is_empty() {
            return Err(RhiError::SwapchainError(
                "surface offers no formats or present modes".to_string(),
            ));
        }

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Prefers B8G8R8A8_SRGB with SRGB_NONLINEAR for correct gamma,
    /// falling back to UNORM and then to whatever comes first.
    pub fn select_format(&self) -> vk::SurfaceFormatKHR {
        let srgb_nonlinear = |f: &&vk::SurfaceFormatKHR| {
            f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        };

        if let Some(&format) = self
            .formats
            .iter()
            .filter(srgb_nonlinear)
            .find(|f| f.format == vk::Format::B8G8R8A8_SRGB)
        {
            return format;
        }

        if let Some(&format) = self
            .formats
            .iter()
            .filter(srgb_nonlinear)
            .find(|f| f.format == vk::Format::B8G8R8A8_UNORM)
        {
            warn!("Falling back to B8G8R8A8_UNORM surface format");
            return format;
        }

        warn!("Using first surface format: {:?}", self.formats[0].format);
        self.formats[0]
    }

    /// MAILBOX for low latency when offered; FIFO is always available.
    pub fn select_present_mode(&self) -> vk::PresentModeKHR {
        if self.present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
            vk::PresentModeKHR::MAILBOX
        } else {
            vk::PresentModeKHR::FIFO
        }
    }

    /// The surface's fixed extent when it has one, else the requested
    /// size clamped into the surface's limits.
    pub fn clamp_extent(&self, width: u32, height: u32) -> vk::Extent2D {
        if self.capabilities.current_extent.width != u32::MAX {
            return self.capabilities.current_extent;
        }

        vk::Extent2D {
            width: width.clamp(
                self.capabilities.min_image_extent.width,
                self.capabilities.max_image_extent.width,
            ),
            height: height.clamp(
                self.capabilities.min_image_extent.height,
                self.capabilities.max_image_extent.height,
            ),
        }
    }

    /// One above the minimum so acquire rarely blocks, capped by the
    /// maximum when the surface has one (zero means unbounded).
    pub fn image_count(&self) -> u32 {
        let wanted = self.capabilities.min_image_count + 1;
        match self.capabilities.max_image_count {
            0 => wanted,
            max => wanted.min(max),
        }
    }
}

/// Vulkan swapchain wrapper.
///
/// Owns the image views; the images themselves belong to the swapchain.
/// Not thread-safe; acquire, present, and recreate all happen on the
/// render thread.
pub struct Swapchain {
    device: Arc<Device>,
    loader: ash::khr::swapchain::Device,
    surface_loader: ash::khr::surface::Instance,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Creates a swapchain sized to the window.
    ///
    /// Images carry TRANSFER_DST usage because frames are rendered to an
    /// offscreen image and blitted in.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> Result<Self, RhiError> {
        let loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader =
            ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let mut swapchain = Self {
            device,
            loader,
            surface_loader,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            format: vk::Format::UNDEFINED,
            extent: vk::Extent2D::default(),
            present_mode: vk::PresentModeKHR::FIFO,
        };
        swapchain.rebuild(surface, width, height)?;
        Ok(swapchain)
    }

    /// Recreates the swapchain for a new window size.
    ///
    /// Waits for the device to idle first, so every in-flight frame that
    /// references the old images has retired.
    pub fn recreate(
        &mut self,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> Result<(), RhiError> {
        self.device.wait_idle()?;
        self.rebuild(surface, width, height)
    }

    /// Builds a fresh swapchain, retiring the previous one (if any) as
    /// the `old_swapchain` so the driver can carry resources over.
    fn rebuild(
        &mut self,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> Result<(), RhiError> {
        let support =
            SurfaceSupport::query(self.device.physical_device(), surface, &self.surface_loader)?;

        let surface_format = support.select_format();
        let present_mode = support.select_present_mode();
        let extent = support.clamp_extent(width, height);
        let image_count = support.image_count();

        let families = self.device.queue_families();
        let family_indices = [families.graphics, families.present];
        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(self.swapchain);

        create_info = if families.shared() {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            debug!(
                "Swapchain shared between graphics ({}) and present ({}) families",
                families.graphics, families.present
            );
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let new_swapchain = unsafe { self.loader.create_swapchain(&create_info, None)? };

        // The old chain served as old_swapchain above; it and its views
        // are dead now (recreate waited for idle, new() had none).
        self.destroy_image_views();
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
        }

        self.swapchain = new_swapchain;
        self.images = unsafe { self.loader.get_swapchain_images(new_swapchain)? };
        self.image_views = self
            .images
            .iter()
            .map(|&image| color_view(&self.device, image, surface_format.format))
            .collect::<Result<_, _>>()?;
        self.format = surface_format.format;
        self.extent = extent;
        self.present_mode = present_mode;

        info!(
            "Swapchain ready: {}x{}, {:?}, {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            self.images.len()
        );
        Ok(())
    }

    /// Acquires the next image, signaling `semaphore` when it is usable.
    ///
    /// Returns (image_index, suboptimal). An `ERROR_OUT_OF_DATE_KHR` error
    /// means the caller must recreate before trying again.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Presents `image_index` after `wait_semaphore` signals.
    ///
    /// Returns true when the swapchain is suboptimal and should be
    /// recreated at the next opportunity.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.loader.queue_present(queue, &present_info) }
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Swapchain image at `index`. Panics if out of bounds.
    #[inline]
    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index]
    }

    /// Image view at `index`. Panics if out of bounds.
    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }

    fn destroy_image_views(&mut self) {
        for view in self.image_views.drain(..) {
            unsafe { self.device.handle().destroy_image_view(view, None) };
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
        }
    }
}

/// A plain 2D color view over one swapchain image.
fn color_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView, RhiError> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .level_count(1)
                .layer_count(1),
        );

    unsafe {
        device
            .handle()
            .create_image_view(&create_info, None)
            .map_err(RhiError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn support_with(
        formats: Vec<vk::SurfaceFormatKHR>,
        present_modes: Vec<vk::PresentModeKHR>,
        capabilities: vk::SurfaceCapabilitiesKHR,
    ) -> SurfaceSupport {
        SurfaceSupport {
            capabilities,
            formats,
            present_modes,
        }
    }

    fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn test_select_format_prefers_bgra_srgb() {
        let support = support_with(
            vec![
                fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            ],
            vec![vk::PresentModeKHR::FIFO],
            Default::default(),
        );
        assert_eq!(support.select_format().format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_select_format_ignores_wrong_color_space() {
        // The sRGB format is only preferred in the sRGB color space.
        let support = support_with(
            vec![
                fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
                fmt(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            ],
            vec![vk::PresentModeKHR::FIFO],
            Default::default(),
        );
        assert_eq!(support.select_format().format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn test_select_format_falls_back_to_first() {
        let support = support_with(
            vec![fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            vec![vk::PresentModeKHR::FIFO],
            Default::default(),
        );
        assert_eq!(support.select_format().format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_select_present_mode() {
        let with_mailbox = support_with(
            vec![fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            Default::default(),
        );
        assert_eq!(
            with_mailbox.select_present_mode(),
            vk::PresentModeKHR::MAILBOX
        );

        let fifo_only = support_with(
            vec![fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE],
            Default::default(),
        );
        assert_eq!(fifo_only.select_present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_clamp_extent_uses_fixed_surface_extent() {
        let support = support_with(
            vec![],
            vec![],
            vk::SurfaceCapabilitiesKHR {
                current_extent: vk::Extent2D {
                    width: 1920,
                    height: 1080,
                },
                ..Default::default()
            },
        );
        let extent = support.clamp_extent(800, 600);
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn test_clamp_extent_respects_surface_limits() {
        let support = support_with(
            vec![],
            vec![],
            vk::SurfaceCapabilitiesKHR {
                current_extent: vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                },
                min_image_extent: vk::Extent2D {
                    width: 100,
                    height: 100,
                },
                max_image_extent: vk::Extent2D {
                    width: 2000,
                    height: 2000,
                },
                ..Default::default()
            },
        );
        assert_eq!(support.clamp_extent(3000, 3000).width, 2000);
        assert_eq!(support.clamp_extent(50, 50).width, 100);
        assert_eq!(support.clamp_extent(800, 600).width, 800);
    }

    #[test]
    fn test_image_count_is_min_plus_one_capped() {
        let capped = support_with(
            vec![],
            vec![],
            vk::SurfaceCapabilitiesKHR {
                min_image_count: 3,
                max_image_count: 3,
                ..Default::default()
            },
        );
        assert_eq!(capped.image_count(), 3);

        let unbounded = support_with(
            vec![],
            vec![],
            vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 0,
                ..Default::default()
            },
        );
        assert_eq!(unbounded.image_count(), 3);
    }
}
