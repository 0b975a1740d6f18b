//! GPU enumeration and selection.
//!
//! Every enumerated GPU is probed against the renderer's requirements
//! (Vulkan 1.3, sampler anisotropy, graphics and present queues); the
//! survivors are ranked by device tier with VRAM as the tie-breaker.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;

/// Queue families the renderer runs on.
///
/// Present may share the graphics family, and usually does. Uploads and
/// background compute are submitted on the graphics queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// True when a single family handles both graphics and present.
    #[inline]
    pub fn shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Family indices with duplicates removed, for queue creation.
    pub fn distinct(&self) -> Vec<u32> {
        if self.shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// A GPU that passed the suitability probe.
#[derive(Clone)]
pub struct GpuInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilies,
}

impl GpuInfo {
    /// Device name as reported by the driver.
    pub fn name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "discrete",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "integrated",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "virtual",
            vk::PhysicalDeviceType::CPU => "software",
            _ => "other",
        }
    }

    /// Total DEVICE_LOCAL heap size in bytes.
    pub fn vram_bytes(&self) -> u64 {
        let heaps = &self.memory_properties.memory_heaps
            [..self.memory_properties.memory_heap_count as usize];
        heaps
            .iter()
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for GpuInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuInfo")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("vram_mb", &(self.vram_bytes() / (1024 * 1024)))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects the best available GPU for rendering.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] when nothing passes the probe.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<GpuInfo, RhiError> {
    let candidates = unsafe { instance.enumerate_physical_devices()? };
    debug!("Probing {} GPU(s)", candidates.len());

    let best = candidates
        .into_iter()
        .filter_map(|device| probe_gpu(instance, device, surface, surface_loader))
        .max_by_key(|gpu| (device_tier(&gpu.properties), gpu.vram_bytes()));

    match best {
        Some(gpu) => {
            info!(
                "Selected GPU '{}' ({}, {} MiB VRAM, Vulkan {}.{})",
                gpu.name(),
                gpu.kind(),
                gpu.vram_bytes() / (1024 * 1024),
                vk::api_version_major(gpu.properties.api_version),
                vk::api_version_minor(gpu.properties.api_version),
            );
            Ok(gpu)
        }
        None => {
            warn!("No GPU meets the renderer's requirements");
            Err(RhiError::NoSuitableGpu)
        }
    }
}

/// Checks one GPU against the renderer's requirements.
fn probe_gpu(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<GpuInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let name = unsafe {
        CStr::from_ptr(properties.device_name.as_ptr())
            .to_str()
            .unwrap_or("Unknown")
    };

    // Dynamic rendering, sync2, and buffer device address want 1.3.
    let (major, minor) = (
        vk::api_version_major(properties.api_version),
        vk::api_version_minor(properties.api_version),
    );
    if (major, minor) < (1, 3) {
        debug!("'{name}' skipped: Vulkan {major}.{minor} < 1.3");
        return None;
    }

    let features = unsafe { instance.get_physical_device_features(device) };
    if features.sampler_anisotropy == vk::FALSE {
        debug!("'{name}' skipped: no sampler anisotropy");
        return None;
    }

    let family_properties =
        unsafe { instance.get_physical_device_queue_family_properties(device) };
    let Some(queue_families) = pick_queue_families(&family_properties, |index| unsafe {
        surface_loader
            .get_physical_device_surface_support(device, index, surface)
            .unwrap_or(false)
    }) else {
        debug!("'{name}' skipped: no graphics + present queue families");
        return None;
    };

    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    Some(GpuInfo {
        device,
        properties,
        memory_properties,
        queue_families,
    })
}

/// Picks graphics and present families from the advertised properties.
///
/// A family that can do both wins outright; otherwise the first graphics
/// family is paired with the first presenting family.
pub fn pick_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
) -> Option<QueueFamilies> {
    let mut graphics = None;
    let mut present = None;

    for (index, family) in families.iter().enumerate() {
        if family.queue_count == 0 {
            continue;
        }
        let index = index as u32;
        let can_draw = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let can_present = supports_present(index);

        if can_draw && can_present {
            return Some(QueueFamilies {
                graphics: index,
                present: index,
            });
        }
        if can_draw && graphics.is_none() {
            graphics = Some(index);
        }
        if can_present && present.is_none() {
            present = Some(index);
        }
    }

    Some(QueueFamilies {
        graphics: graphics?,
        present: present?,
    })
}

/// Coarse desirability ranking; VRAM breaks ties within a tier.
fn device_tier(properties: &vk::PhysicalDeviceProperties) -> u32 {
    match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(queue_count: u32, flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count,
            ..Default::default()
        }
    }

    #[test]
    fn test_combined_family_wins_over_earlier_split() {
        // Family 0 draws but cannot present, family 1 presents but cannot
        // draw, family 2 does both.
        let families = [
            family(1, vk::QueueFlags::GRAPHICS),
            family(1, vk::QueueFlags::TRANSFER),
            family(1, vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let picked = pick_queue_families(&families, |i| i != 0).unwrap();
        assert_eq!(picked.graphics, 2);
        assert_eq!(picked.present, 2);
        assert!(picked.shared());
    }

    #[test]
    fn test_split_families_pair_up() {
        let families = [
            family(1, vk::QueueFlags::GRAPHICS),
            family(1, vk::QueueFlags::TRANSFER),
        ];
        let picked = pick_queue_families(&families, |i| i == 1).unwrap();
        assert_eq!(picked.graphics, 0);
        assert_eq!(picked.present, 1);
        assert!(!picked.shared());
    }

    #[test]
    fn test_empty_family_is_skipped() {
        let families = [
            family(0, vk::QueueFlags::GRAPHICS),
            family(1, vk::QueueFlags::GRAPHICS),
        ];
        let picked = pick_queue_families(&families, |_| true).unwrap();
        assert_eq!(picked.graphics, 1);
    }

    #[test]
    fn test_no_present_support_rejects_device() {
        let families = [family(1, vk::QueueFlags::GRAPHICS)];
        assert!(pick_queue_families(&families, |_| false).is_none());
    }

    #[test]
    fn test_no_graphics_rejects_device() {
        let families = [family(1, vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)];
        assert!(pick_queue_families(&families, |_| true).is_none());
    }

    #[test]
    fn test_distinct_deduplicates_shared_family() {
        let shared = QueueFamilies {
            graphics: 0,
            present: 0,
        };
        assert_eq!(shared.distinct(), vec![0]);

        let split = QueueFamilies {
            graphics: 0,
            present: 2,
        };
        assert_eq!(split.distinct(), vec![0, 2]);
    }

    #[test]
    fn test_discrete_outranks_integrated_regardless_of_vram() {
        let discrete = vk::PhysicalDeviceProperties {
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            ..Default::default()
        };
        let integrated = vk::PhysicalDeviceProperties {
            device_type: vk::PhysicalDeviceType::INTEGRATED_GPU,
            ..Default::default()
        };
        // Tier compares first in the (tier, vram) key, so a small discrete
        // card still beats a large integrated one.
        assert!((device_tier(&discrete), 1u64) > (device_tier(&integrated), u64::MAX));
    }
}
