//! Semaphores and fences pacing the frame loop
//!
//! The image-available semaphore orders acquisition before rendering, the
//! render-finished semaphore orders rendering before presentation, and the
//! in-flight fence lets the CPU wait for the previous frame's submission.

use ash::{vk, Device};

use super::context::{VulkanError, VulkanResult};

/// Binary semaphore wrapper with RAII cleanup
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore =
            unsafe { device.create_semaphore(&create_info, None) }.map_err(VulkanError::Api)?;

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
    /// Create a fence, optionally already signaled
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self { device, fence })
    }

    /// Block until signaled, without a timeout
    pub fn wait(&self) -> VulkanResult<()> {
        unsafe { self.device.wait_for_fences(&[self.fence], true, u64::MAX) }.map_err(VulkanError::Api)
    }

    /// Return to the unsignaled state
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]) }.map_err(VulkanError::Api)
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

/// Synchronization objects for the single frame in flight
pub struct FrameSync {
    /// Signaled when the acquired image can be rendered to
    pub image_available: Semaphore,
    /// Signaled when rendering has finished
    pub render_finished: Semaphore,
    /// Signaled when the frame's submission completes; created signaled
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create the frame synchronization objects
    pub fn new(device: &Device) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device.clone(), true)?,
        })
    }
}
