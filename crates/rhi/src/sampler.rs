//! Owned sampler collections.

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::RhiResult;

/// A set of samplers destroyed together.
///
/// Sampler handles created mid-load are owned here from the moment they
/// exist, so an error bailing out of a load cannot strand them.
pub struct SamplerPool {
    device: Arc<Device>,
    samplers: Vec<vk::Sampler>,
}

impl SamplerPool {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            samplers: Vec::new(),
        }
    }

    /// Creates a sampler owned by this pool and returns its handle.
    pub fn create(&mut self, info: &vk::SamplerCreateInfo) -> RhiResult<vk::Sampler> {
        let sampler = unsafe { self.device.handle().create_sampler(info, None)? };
        self.samplers.push(sampler);
        Ok(sampler)
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<vk::Sampler> {
        self.samplers.get(index).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }
}

impl Drop for SamplerPool {
    fn drop(&mut self) {
        for sampler in self.samplers.drain(..) {
            unsafe { self.device.handle().destroy_sampler(sampler, None) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_gpu;

    #[test]
    fn test_pool_owns_samplers_from_creation() {
        let Some(gpu) = test_gpu() else {
            eprintln!("Skipping test: Vulkan not available");
            return;
        };

        let mut pool = SamplerPool::new(gpu.device.clone());
        assert!(pool.is_empty());

        let linear = pool
            .create(
                &vk::SamplerCreateInfo::default()
                    .mag_filter(vk::Filter::LINEAR)
                    .min_filter(vk::Filter::LINEAR),
            )
            .unwrap();
        let nearest = pool
            .create(
                &vk::SamplerCreateInfo::default()
                    .mag_filter(vk::Filter::NEAREST)
                    .min_filter(vk::Filter::NEAREST),
            )
            .unwrap();

        assert_ne!(linear, vk::Sampler::null());
        assert_ne!(nearest, vk::Sampler::null());
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(0), Some(linear));
        assert_eq!(pool.get(1), Some(nearest));
        assert_eq!(pool.get(2), None);

        drop(pool);
    }
}
