//! Descriptor set layouts, a growable pool allocator, and set writes.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Builder for descriptor set layouts.
#[derive(Default)]
pub struct DescriptorLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl DescriptorLayoutBuilder<'_> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single-descriptor binding at `binding`.
    pub fn add_binding(mut self, binding: u32, descriptor_type: vk::DescriptorType) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1),
        );
        self
    }

    /// Builds the layout with `stages` applied to every binding.
    pub fn build(
        mut self,
        device: &Device,
        stages: vk::ShaderStageFlags,
    ) -> RhiResult<vk::DescriptorSetLayout> {
        for binding in &mut self.bindings {
            binding.stage_flags |= stages;
        }

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };
        Ok(layout)
    }
}

/// Descriptor counts per set, as a multiplier over the pool's set capacity.
///
/// A ratio of 3.0 for STORAGE_BUFFER in a 10-set pool reserves 30 storage
/// buffer descriptors.
#[derive(Clone, Copy, Debug)]
pub struct PoolSizeRatio {
    pub descriptor_type: vk::DescriptorType,
    pub ratio: f32,
}

impl PoolSizeRatio {
    pub fn new(descriptor_type: vk::DescriptorType, ratio: f32) -> Self {
        Self {
            descriptor_type,
            ratio,
        }
    }
}

/// Hard cap on sets per pool; growth stops here.
const MAX_SETS_PER_POOL: u32 = 4092;

/// Next pool capacity after one holding `current` sets.
fn next_pool_size(current: u32) -> u32 {
    ((current as f32 * 1.5) as u32).min(MAX_SETS_PER_POOL)
}

/// A descriptor allocator that grows by creating new pools on demand.
///
/// Pools are held in two lists: `ready_pools` can still serve allocations,
/// `full_pools` have rejected one. `clear_pools` resets everything and
/// moves all pools back to ready, which is how per-frame descriptors are
/// recycled wholesale instead of freed one by one.
pub struct DescriptorAllocatorGrowable {
    device: Arc<Device>,
    ratios: Vec<PoolSizeRatio>,
    ready_pools: Vec<vk::DescriptorPool>,
    full_pools: Vec<vk::DescriptorPool>,
    sets_per_pool: u32,
}

impl DescriptorAllocatorGrowable {
    /// Creates the allocator with one initial pool of `initial_sets` sets.
    pub fn new(
        device: Arc<Device>,
        initial_sets: u32,
        ratios: &[PoolSizeRatio],
    ) -> RhiResult<Self> {
        if ratios.is_empty() {
            return Err(RhiError::DescriptorError(
                "at least one pool size ratio is required".to_string(),
            ));
        }

        let pool = create_pool(&device, initial_sets, ratios)?;

        Ok(Self {
            device,
            ratios: ratios.to_vec(),
            ready_pools: vec![pool],
            full_pools: Vec::new(),
            sets_per_pool: next_pool_size(initial_sets),
        })
    }

    /// Allocates one descriptor set with the given layout.
    ///
    /// On pool exhaustion the current pool is retired to the full list, a
    /// bigger pool is created, and the allocation is retried exactly once.
    /// A second failure is a real error, not exhaustion.
    pub fn allocate(&mut self, layout: vk::DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        let pool = self.get_pool()?;
        let layouts = [layout];

        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        match unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => {
                self.ready_pools.push(pool);
                Ok(sets[0])
            }
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
                self.full_pools.push(pool);

                let retry_pool = self.get_pool()?;
                let alloc_info = vk::DescriptorSetAllocateInfo::default()
                    .descriptor_pool(retry_pool)
                    .set_layouts(&layouts);

                let sets = unsafe {
                    self.device
                        .handle()
                        .allocate_descriptor_sets(&alloc_info)
                        .map_err(|e| {
                            RhiError::DescriptorError(format!(
                                "allocation failed from a fresh pool: {e:?}"
                            ))
                        })?
                };
                self.ready_pools.push(retry_pool);
                Ok(sets[0])
            }
            Err(e) => Err(RhiError::VulkanError(e)),
        }
    }

    /// Resets every pool and returns them all to the ready list.
    ///
    /// Invalidates every set handed out so far; callers must not touch
    /// sets allocated before the clear.
    pub fn clear_pools(&mut self) -> RhiResult<()> {
        for &pool in self.ready_pools.iter().chain(self.full_pools.iter()) {
            unsafe {
                self.device
                    .handle()
                    .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())?;
            }
        }
        let full = std::mem::take(&mut self.full_pools);
        self.ready_pools.extend(full);
        Ok(())
    }

    /// Takes a pool that can serve allocations, growing if none remain.
    fn get_pool(&mut self) -> RhiResult<vk::DescriptorPool> {
        if let Some(pool) = self.ready_pools.pop() {
            return Ok(pool);
        }

        let pool = create_pool(&self.device, self.sets_per_pool, &self.ratios)?;
        debug!(
            "Descriptor pool grown to {} sets per pool",
            self.sets_per_pool
        );
        self.sets_per_pool = next_pool_size(self.sets_per_pool);
        Ok(pool)
    }
}

impl Drop for DescriptorAllocatorGrowable {
    fn drop(&mut self) {
        for &pool in self.ready_pools.iter().chain(self.full_pools.iter()) {
            unsafe {
                self.device.handle().destroy_descriptor_pool(pool, None);
            }
        }
    }
}

fn create_pool(
    device: &Device,
    set_count: u32,
    ratios: &[PoolSizeRatio],
) -> RhiResult<vk::DescriptorPool> {
    let pool_sizes: Vec<vk::DescriptorPoolSize> = ratios
        .iter()
        .map(|ratio| vk::DescriptorPoolSize {
            ty: ratio.descriptor_type,
            descriptor_count: (ratio.ratio * set_count as f32) as u32,
        })
        .collect();

    let create_info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(set_count)
        .pool_sizes(&pool_sizes);

    let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };
    Ok(pool)
}

/// Accumulates descriptor writes and flushes them in one update call.
///
/// Buffer and image infos are boxed per write so the pointers stored in
/// the write structs stay stable while more writes are appended.
#[derive(Default)]
pub struct DescriptorWriter {
    buffer_infos: Vec<Box<vk::DescriptorBufferInfo>>,
    image_infos: Vec<Box<vk::DescriptorImageInfo>>,
    writes: Vec<vk::WriteDescriptorSet<'static>>,
}

impl DescriptorWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_buffer(
        &mut self,
        binding: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
        descriptor_type: vk::DescriptorType,
    ) -> &mut Self {
        let info = Box::new(
            vk::DescriptorBufferInfo::default()
                .buffer(buffer)
                .offset(offset)
                .range(range),
        );

        let write = vk::WriteDescriptorSet {
            dst_binding: binding,
            descriptor_count: 1,
            descriptor_type,
            p_buffer_info: &*info,
            ..Default::default()
        };

        self.buffer_infos.push(info);
        self.writes.push(write);
        self
    }

    pub fn write_image(
        &mut self,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
        descriptor_type: vk::DescriptorType,
    ) -> &mut Self {
        let info = Box::new(
            vk::DescriptorImageInfo::default()
                .image_view(view)
                .sampler(sampler)
                .image_layout(layout),
        );

        let write = vk::WriteDescriptorSet {
            dst_binding: binding,
            descriptor_count: 1,
            descriptor_type,
            p_image_info: &*info,
            ..Default::default()
        };

        self.image_infos.push(info);
        self.writes.push(write);
        self
    }

    pub fn clear(&mut self) {
        self.buffer_infos.clear();
        self.image_infos.clear();
        self.writes.clear();
    }

    /// Applies every accumulated write to `set`.
    pub fn update_set(&mut self, device: &Device, set: vk::DescriptorSet) {
        for write in &mut self.writes {
            write.dst_set = set;
        }
        unsafe {
            device.handle().update_descriptor_sets(&self.writes, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_growth_is_one_and_a_half() {
        assert_eq!(next_pool_size(10), 15);
        assert_eq!(next_pool_size(15), 22);
        assert_eq!(next_pool_size(1000), 1500);
    }

    #[test]
    fn test_pool_growth_caps_at_limit() {
        assert_eq!(next_pool_size(4000), 4092);
        assert_eq!(next_pool_size(4092), 4092);
        assert_eq!(next_pool_size(u32::MAX / 2), 4092);
    }

    #[test]
    fn test_growth_sequence_from_initial_pool() {
        let mut size = 1000;
        let mut sizes = Vec::new();
        for _ in 0..5 {
            size = next_pool_size(size);
            sizes.push(size);
        }
        assert_eq!(sizes, vec![1500, 2250, 3375, 4092, 4092]);
    }

    #[test]
    fn test_pool_size_ratio_scales_with_set_count() {
        let ratio = PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 3.0);
        let descriptor_count = (ratio.ratio * 10.0) as u32;
        assert_eq!(descriptor_count, 30);
    }
}
