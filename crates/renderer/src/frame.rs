//! Per-frame resource slots and the frame ring.
//!
//! Each slot owns everything one in-flight frame needs: a command buffer,
//! the semaphore its swapchain acquire signals, the fence that marks its
//! GPU work complete, a deletion queue for resources retired during the
//! frame, and a growable descriptor allocator for its transient sets.
//!
//! A slot is recycled only after its fence has signaled, so flushing the
//! deletion queue and resetting the descriptor pools there is safe by
//! construction.

use std::sync::Arc;

use tracing::{debug, info};

use ember_rhi::command::{CommandBuffer, CommandPool};
use ember_rhi::deletion::{DeletionQueue, Release};
use ember_rhi::descriptor::{DescriptorAllocatorGrowable, PoolSizeRatio};
use ember_rhi::device::Device;
use ember_rhi::sync::{Fence, GPU_TIMEOUT_NS, Semaphore};
use ember_rhi::{RhiResult, vk};

use crate::FRAME_OVERLAP;

/// Initial per-frame descriptor pool capacity, in sets.
const FRAME_DESCRIPTOR_SETS: u32 = 1000;

/// Resources owned by one in-flight frame.
pub struct FrameSlot {
    device: Arc<Device>,
    _command_pool: CommandPool,
    command_buffer: CommandBuffer,
    swapchain_semaphore: Semaphore,
    render_fence: Fence,
    deletion_queue: DeletionQueue<Release>,
    descriptors: DescriptorAllocatorGrowable,
}

impl FrameSlot {
    fn new(device: Arc<Device>) -> RhiResult<Self> {
        let graphics_family = device.queue_families().graphics;

        let command_pool = CommandPool::new(Arc::clone(&device), graphics_family)?;
        let command_buffer = command_pool.allocate_one()?;
        let swapchain_semaphore = Semaphore::new(Arc::clone(&device))?;
        // Signaled so the first frame does not wait on work never submitted.
        let render_fence = Fence::new(Arc::clone(&device), true)?;

        let ratios = [
            PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 3.0),
            PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 3.0),
            PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 3.0),
            PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4.0),
        ];
        let descriptors =
            DescriptorAllocatorGrowable::new(Arc::clone(&device), FRAME_DESCRIPTOR_SETS, &ratios)?;

        Ok(Self {
            device,
            _command_pool: command_pool,
            command_buffer,
            swapchain_semaphore,
            render_fence,
            deletion_queue: DeletionQueue::new(),
            descriptors,
        })
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn swapchain_semaphore(&self) -> &Semaphore {
        &self.swapchain_semaphore
    }

    #[inline]
    pub fn render_fence(&self) -> &Fence {
        &self.render_fence
    }

    /// Queue for resources that must outlive this frame's GPU work.
    #[inline]
    pub fn deletion_queue(&mut self) -> &mut DeletionQueue<Release> {
        &mut self.deletion_queue
    }

    /// Transient descriptor allocator, reset wholesale each recycle.
    #[inline]
    pub fn descriptors(&mut self) -> &mut DescriptorAllocatorGrowable {
        &mut self.descriptors
    }

    /// Blocks until this slot's previous submission has retired, then
    /// frees everything that submission was still using.
    pub fn wait_and_recycle(&mut self) -> RhiResult<()> {
        self.render_fence.wait(GPU_TIMEOUT_NS)?;

        if !self.deletion_queue.is_empty() {
            debug!(
                "Flushing {} deferred deletions for recycled frame",
                self.deletion_queue.len()
            );
        }
        self.deletion_queue.release_all(&self.device);
        self.descriptors.clear_pools()?;
        Ok(())
    }
}

impl Drop for FrameSlot {
    fn drop(&mut self) {
        // The renderer waits for device idle before dropping frames, so
        // anything still queued here can be destroyed immediately.
        self.deletion_queue.release_all(&self.device);
    }
}

/// Slot index serving frame number `frame_number`.
#[inline]
fn slot_index(frame_number: u64) -> usize {
    (frame_number % FRAME_OVERLAP as u64) as usize
}

/// The ring of [`FRAME_OVERLAP`] frame slots.
///
/// While the GPU renders frame N, the CPU records frame N+1 into the
/// other slot; the fence in each slot keeps the CPU from lapping the GPU.
pub struct FrameRing {
    slots: Vec<FrameSlot>,
    frame_number: u64,
}

impl FrameRing {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let mut slots = Vec::with_capacity(FRAME_OVERLAP);
        for _ in 0..FRAME_OVERLAP {
            slots.push(FrameSlot::new(Arc::clone(&device))?);
        }

        info!("Frame ring created with {} slots", FRAME_OVERLAP);

        Ok(Self {
            slots,
            frame_number: 0,
        })
    }

    #[inline]
    pub fn current_mut(&mut self) -> &mut FrameSlot {
        &mut self.slots[slot_index(self.frame_number)]
    }

    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Moves to the next slot. Call after the current frame is submitted.
    #[inline]
    pub fn advance(&mut self) {
        self.frame_number += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_index_alternates() {
        let indices: Vec<usize> = (0..6).map(slot_index).collect();
        assert_eq!(indices, vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_overlap_is_double_buffered() {
        assert_eq!(FRAME_OVERLAP, 2);
    }

    #[test]
    fn test_slot_index_stays_in_bounds_for_large_frame_numbers() {
        assert!(slot_index(u64::MAX) < FRAME_OVERLAP);
        assert!(slot_index(u64::MAX - 1) < FRAME_OVERLAP);
    }
}
