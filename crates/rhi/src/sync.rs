//! Fences and semaphores.
//!
//! Fences gate CPU-side reuse of per-frame resources; binary semaphores
//! order GPU work against swapchain acquire and present.

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::RhiError;

/// Upper bound for any single GPU wait.
///
/// One second is orders of magnitude past a healthy frame or upload. A
/// fence still unsignaled after this long means the device hung, and the
/// `TIMEOUT` result comes back as an error instead of blocking forever.
pub const GPU_TIMEOUT_NS: u64 = 1_000_000_000;

/// A fence for CPU-GPU synchronization.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence, optionally in the signaled state.
    ///
    /// Frame fences start signaled so the first frame does not block on
    /// work that was never submitted.
    pub fn new(device: Arc<Device>, signaled: bool) -> Result<Self, RhiError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence signals or `timeout_ns` elapses.
    ///
    /// Expiry surfaces as `Err` carrying `vk::Result::TIMEOUT`, so callers
    /// waiting with [`GPU_TIMEOUT_NS`] escalate a wedged device instead of
    /// spinning on it.
    pub fn wait(&self, timeout_ns: u64) -> Result<(), RhiError> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout_ns)?;
        }
        Ok(())
    }

    /// Returns the fence to the unsignaled state.
    pub fn reset(&self) -> Result<(), RhiError> {
        unsafe {
            self.device.handle().reset_fences(&[self.fence])?;
        }
        Ok(())
    }

    /// Non-blocking signal check.
    pub fn is_signaled(&self) -> Result<bool, RhiError> {
        let status = unsafe { self.device.handle().get_fence_status(self.fence)? };
        Ok(status)
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// A binary semaphore for GPU-GPU synchronization.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> Result<Self, RhiError> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_gpu;

    #[test]
    fn test_sync_primitives_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Fence>();
        assert_send_sync::<Semaphore>();
    }

    #[test]
    fn test_fence_signals_after_submission_retires() {
        let Some(gpu) = test_gpu() else {
            eprintln!("Skipping test: Vulkan not available");
            return;
        };
        let fence = Fence::new(gpu.device.clone(), false).unwrap();
        assert!(!fence.is_signaled().unwrap());

        // An empty submission still signals the fence once it retires.
        unsafe {
            gpu.device
                .handle()
                .queue_submit2(gpu.device.graphics_queue(), &[], fence.handle())
                .unwrap();
        }

        fence.wait(GPU_TIMEOUT_NS).unwrap();
        assert!(fence.is_signaled().unwrap());

        fence.reset().unwrap();
        assert!(!fence.is_signaled().unwrap());
    }

    #[test]
    fn test_wait_on_unsignaled_fence_times_out_as_error() {
        let Some(gpu) = test_gpu() else {
            eprintln!("Skipping test: Vulkan not available");
            return;
        };
        let fence = Fence::new(gpu.device.clone(), false).unwrap();

        // Nothing will ever signal this fence; a bounded wait must come
        // back as TIMEOUT rather than hanging.
        match fence.wait(1_000_000) {
            Err(RhiError::VulkanError(vk::Result::TIMEOUT)) => {}
            other => panic!("Expected TIMEOUT, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_fence_created_signaled() {
        let Some(gpu) = test_gpu() else {
            eprintln!("Skipping test: Vulkan not available");
            return;
        };
        let fence = Fence::new(gpu.device.clone(), true).unwrap();
        assert!(fence.is_signaled().unwrap());
        fence.wait(GPU_TIMEOUT_NS).unwrap();
    }
}
