//! Headless device setup shared by device-gated tests.

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::instance::Instance;
use crate::physical_device::{pick_queue_families, GpuInfo};

/// Field order keeps the device dropping before the instance.
pub struct TestGpu {
    pub device: Arc<Device>,
    _instance: Instance,
}

/// Builds a logical device without a surface, or `None` when no usable
/// Vulkan 1.3 implementation is present.
pub fn test_gpu() -> Option<TestGpu> {
    let instance = Instance::new(false).ok()?;
    let handle = instance.handle();
    let candidates = unsafe { handle.enumerate_physical_devices() }.ok()?;

    for candidate in candidates {
        let properties = unsafe { handle.get_physical_device_properties(candidate) };
        let version = (
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
        );
        if version < (1, 3) {
            continue;
        }

        let families = unsafe { handle.get_physical_device_queue_family_properties(candidate) };
        // No surface here; present support is irrelevant for these tests.
        let Some(queue_families) = pick_queue_families(&families, |_| true) else {
            continue;
        };
        let memory_properties = unsafe { handle.get_physical_device_memory_properties(candidate) };

        let gpu = GpuInfo {
            device: candidate,
            properties,
            memory_properties,
            queue_families,
        };
        if let Ok(device) = Device::new(&instance, &gpu) {
            return Some(TestGpu {
                device,
                _instance: instance,
            });
        }
    }
    None
}
