//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! ### GPU-GPU Synchronization (Semaphores)
//! ```text
//! Acquire: signal image_available ->
//! Submit:                             wait image_available, signal render_finished ->
//! Present:                                                                          wait render_finished
//! ```
//!
//! ### CPU-GPU Synchronization (Fences)
//! Each frame slot owns one fence, created signaled so the first wait on a
//! fresh slot returns immediately. The fence is reset only once the slot is
//! certain to submit; an abandoned frame leaves it signaled.
//!
//! Both wrappers are [`Managed`] objects: destroying them twice is a no-op
//! and using them afterwards is an error.

use std::rc::Rc;

use ash::vk;

use crate::render::backends::vulkan::device_api::DeviceApi;
use crate::render::backends::vulkan::error::VulkanResult;
use crate::render::backends::vulkan::resources::managed::Managed;

/// Binary semaphore
pub type Semaphore<D> = Managed<D, vk::Semaphore>;

/// CPU-visible completion fence
pub type Fence<D> = Managed<D, vk::Fence>;

impl<D: DeviceApi> Semaphore<D> {
    /// Create a new semaphore
    pub fn create(device: Rc<D>) -> VulkanResult<Self> {
        let semaphore = device.create_semaphore()?;
        Ok(Self::new(device, semaphore))
    }
}

impl<D: DeviceApi> Fence<D> {
    /// Create a new fence
    pub fn create(device: Rc<D>, signaled: bool) -> VulkanResult<Self> {
        let fence = device.create_fence(signaled)?;
        Ok(Self::new(device, fence))
    }

    /// Block until the fence is signaled
    pub fn wait(&self) -> VulkanResult<()> {
        let fence = self.handle()?;
        self.device().wait_for_fence(fence)
    }

    /// Reset the fence to the unsignaled state
    pub fn reset(&self) -> VulkanResult<()> {
        let fence = self.handle()?;
        self.device().reset_fence(fence)
    }
}
