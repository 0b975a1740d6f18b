//! Deferred destruction of GPU resources.
//!
//! Vulkan objects must outlive every queued command that references them.
//! Instead of tracking individual lifetimes, destruction is recorded into a
//! [`DeletionQueue`] and flushed at a point where the GPU is known to be done
//! with the work: either when the owning frame slot's fence has signaled, or
//! at shutdown after `wait_idle`.

use crate::device::Device;
use ash::vk;

/// An ordered queue of pending deletions, flushed in LIFO order.
///
/// LIFO matters: resources are created bottom-up (buffer before the view
/// that wraps it, layout before the pipeline built from it) and must be
/// destroyed top-down.
pub struct DeletionQueue<T> {
    entries: Vec<T>,
}

impl<T> DeletionQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record an entry for later deletion.
    pub fn push(&mut self, entry: T) {
        self.entries.push(entry);
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drain every entry in reverse insertion order, calling `f` on each.
    ///
    /// The queue is empty afterwards and may be reused; flushing an empty
    /// queue is a no-op.
    pub fn flush(&mut self, mut f: impl FnMut(T)) {
        while let Some(entry) = self.entries.pop() {
            f(entry);
        }
    }
}

impl<T> Default for DeletionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A raw Vulkan handle whose destruction has been deferred.
///
/// Handles are recorded by value; the wrapper types that owned them must
/// have been disarmed (e.g. via `into_raw`) so they do not double-free.
pub enum Release {
    Buffer(vk::Buffer, gpu_allocator::vulkan::Allocation),
    Image(vk::Image, gpu_allocator::vulkan::Allocation),
    ImageView(vk::ImageView),
    Sampler(vk::Sampler),
    Pipeline(vk::Pipeline),
    PipelineLayout(vk::PipelineLayout),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    CommandPool(vk::CommandPool),
    Fence(vk::Fence),
}

impl Release {
    /// Destroy the wrapped handle.
    ///
    /// The caller must guarantee the GPU has finished all work referencing
    /// the handle, which is what the deletion queue's flush points provide.
    pub fn destroy(self, device: &Device) {
        unsafe {
            match self {
                Release::Buffer(buffer, allocation) => {
                    // Free the memory before the buffer it backs.
                    if let Ok(mut allocator) = device.allocator().lock() {
                        let _ = allocator.free(allocation);
                    }
                    device.handle().destroy_buffer(buffer, None);
                }
                Release::Image(image, allocation) => {
                    if let Ok(mut allocator) = device.allocator().lock() {
                        let _ = allocator.free(allocation);
                    }
                    device.handle().destroy_image(image, None);
                }
                Release::ImageView(view) => {
                    device.handle().destroy_image_view(view, None);
                }
                Release::Sampler(sampler) => {
                    device.handle().destroy_sampler(sampler, None);
                }
                Release::Pipeline(pipeline) => {
                    device.handle().destroy_pipeline(pipeline, None);
                }
                Release::PipelineLayout(layout) => {
                    device.handle().destroy_pipeline_layout(layout, None);
                }
                Release::DescriptorSetLayout(layout) => {
                    device.handle().destroy_descriptor_set_layout(layout, None);
                }
                Release::CommandPool(pool) => {
                    device.handle().destroy_command_pool(pool, None);
                }
                Release::Fence(fence) => {
                    device.handle().destroy_fence(fence, None);
                }
            }
        }
    }
}

impl DeletionQueue<Release> {
    /// Flush every pending handle, destroying each in LIFO order.
    pub fn release_all(&mut self, device: &Device) {
        self.flush(|entry| entry.destroy(device));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_runs_in_reverse_insertion_order() {
        let mut queue = DeletionQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);

        let mut seen = Vec::new();
        queue.flush(|n| seen.push(n));

        assert_eq!(seen, vec![3, 2, 1]);
    }

    #[test]
    fn test_flush_empties_queue() {
        let mut queue = DeletionQueue::new();
        queue.push("a");
        queue.flush(|_| {});

        assert!(queue.is_empty());

        // Flushing again must be a no-op.
        let mut count = 0;
        queue.flush(|_| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_queue_is_reusable_after_flush() {
        let mut queue = DeletionQueue::new();
        queue.push(1);
        queue.flush(|_| {});

        queue.push(10);
        queue.push(20);

        let mut seen = Vec::new();
        queue.flush(|n| seen.push(n));
        assert_eq!(seen, vec![20, 10]);
    }

    #[test]
    fn test_interleaved_push_flush_cycles() {
        let mut queue = DeletionQueue::new();
        let mut seen = Vec::new();

        for cycle in 0..3 {
            queue.push(cycle * 2);
            queue.push(cycle * 2 + 1);
            queue.flush(|n| seen.push(n));
        }

        assert_eq!(seen, vec![1, 0, 3, 2, 5, 4]);
    }
}
