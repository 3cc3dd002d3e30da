//! Vulkan synchronization primitives
//!
//! Semaphores order queue operations on the GPU, fences let the host block
//! until submitted work has retired.

use ash::{vk, Device};
use crate::vulkan::{VulkanResult, VulkanError};

/// GPU-GPU synchronization primitive with automatic resource management
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            device.create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe {
            device.create_fence(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, fence })
    }

    /// Wait for fence with a timeout in nanoseconds
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe {
            self.device.wait_for_fences(&[self.fence], true, timeout)
                .map_err(VulkanError::Api)
        }
    }

    /// Block until the fence is signaled, retrying on timeout
    pub fn wait_signaled(&self) -> VulkanResult<()> {
        retry_on_timeout(|| unsafe {
            self.device.wait_for_fences(&[self.fence], true, u64::MAX)
        })
    }

    /// Reset fence
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device.reset_fences(&[self.fence])
                .map_err(VulkanError::Api)
        }
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Repeat `wait` for as long as it reports `TIMEOUT`
pub(crate) fn retry_on_timeout(mut wait: impl FnMut() -> ash::prelude::VkResult<()>) -> VulkanResult<()> {
    loop {
        match wait() {
            Err(vk::Result::TIMEOUT) => continue,
            other => return other.map_err(VulkanError::Api),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_until_success() {
        let mut calls = 0;
        let result = retry_on_timeout(|| {
            calls += 1;
            if calls < 3 {
                Err(vk::Result::TIMEOUT)
            } else {
                Ok(())
            }
        });
        assert!(result.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_retry_stops_on_error() {
        let mut calls = 0;
        let result = retry_on_timeout(|| {
            calls += 1;
            Err(vk::Result::ERROR_DEVICE_LOST)
        });
        assert!(matches!(result, Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))));
        assert_eq!(calls, 1);
    }
}
