//! Vulkan logical device, queues, and the GPU memory allocator.

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, info};

use crate::error::RhiError;
use crate::instance::Instance;
use crate::physical_device::{GpuInfo, QueueFamilies};

/// Required device extensions.
const DEVICE_EXTENSIONS: &[&std::ffi::CStr] =
    &[ash::khr::swapchain::NAME, ash::khr::dynamic_rendering::NAME];

/// Vulkan logical device wrapper.
///
/// Owns the device handle, its queues, and the gpu-allocator instance.
/// Shared across the renderer behind an `Arc`; the allocator sits behind a
/// `Mutex` so buffers and images can be created from any thread.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    /// ManuallyDrop so Drop can free the allocator before destroying the
    /// device it allocates from.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    queue_families: QueueFamilies,
}

impl Device {
    /// Creates a logical device on the selected GPU.
    ///
    /// Enables the swapchain and dynamic rendering extensions, the
    /// Vulkan 1.2 features needed for buffer device addresses and
    /// descriptor indexing, and the Vulkan 1.3 features for dynamic
    /// rendering and synchronization2. Also initializes gpu-allocator.
    pub fn new(instance: &Instance, gpu: &GpuInfo) -> Result<Arc<Self>, RhiError> {
        let queue_families = gpu.queue_families;
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .distinct()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s): {:?}",
            queue_create_infos.len(),
            queue_families
        );

        let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default()
            .descriptor_indexing(true)
            .buffer_device_address(true)
            .runtime_descriptor_array(true)
            .descriptor_binding_partially_bound(true);

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true)
            .maintenance4(true);

        let features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            .fill_mode_non_solid(true);

        let extension_names: Vec<*const i8> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features)
            .push_next(&mut features_1_2)
            .push_next(&mut features_1_3);

        let device = unsafe {
            instance
                .handle()
                .create_device(gpu.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            DEVICE_EXTENSIONS.len()
        );

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

        // buffer_device_address must match the 1.2 feature above or the
        // allocator hands out memory the shaders cannot address.
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: gpu.device,
            debug_settings: Default::default(),
            buffer_device_address: true,
            allocation_sizes: Default::default(),
        })?;

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            physical_device: gpu.device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            present_queue,
            queue_families,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn queue_families(&self) -> QueueFamilies {
        self.queue_families
    }

    /// The GPU memory allocator, behind a Mutex for thread-safe access.
    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    /// Blocks until all queues are idle.
    pub fn wait_idle(&self) -> Result<(), RhiError> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits a recorded command buffer to `queue` using synchronization2.
    ///
    /// `wait` stalls the listed stages until the semaphore signals; `signal`
    /// fires the semaphore once the listed stages complete. `fence` (if not
    /// null) signals when the whole submission retires.
    pub fn submit_commands(
        &self,
        queue: vk::Queue,
        command_buffer: vk::CommandBuffer,
        wait: Option<(vk::Semaphore, vk::PipelineStageFlags2)>,
        signal: Option<(vk::Semaphore, vk::PipelineStageFlags2)>,
        fence: vk::Fence,
    ) -> Result<(), RhiError> {
        let cmd_info = [vk::CommandBufferSubmitInfo::default().command_buffer(command_buffer)];

        let wait_infos: Vec<vk::SemaphoreSubmitInfo> = wait
            .map(|(semaphore, stage)| {
                vk::SemaphoreSubmitInfo::default()
                    .semaphore(semaphore)
                    .stage_mask(stage)
            })
            .into_iter()
            .collect();

        let signal_infos: Vec<vk::SemaphoreSubmitInfo> = signal
            .map(|(semaphore, stage)| {
                vk::SemaphoreSubmitInfo::default()
                    .semaphore(semaphore)
                    .stage_mask(stage)
            })
            .into_iter()
            .collect();

        let submit_info = vk::SubmitInfo2::default()
            .command_buffer_infos(&cmd_info)
            .wait_semaphore_infos(&wait_infos)
            .signal_semaphore_infos(&signal_infos);

        unsafe {
            self.device.queue_submit2(queue, &[submit_info], fence)?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // The allocator must release its memory before the device goes away.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device is Send+Sync, queue and physical device handles are
// plain Copy values, and the allocator is behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_extensions_defined() {
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::dynamic_rendering::NAME));
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
